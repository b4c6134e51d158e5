use crate::PrismBackendType;
#[cfg(feature = "vulkan-loader")]
use ash::vk;

pub type PrismResult<T> = Result<T, PrismError>;

/// A failure reported by a native graphics API, wrapped so that callers can inspect it without
/// depending on the native bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrismNativeError {
    pub backend: Option<PrismBackendType>,
    /// The native entry point that failed, i.e. "CreateCommittedResource"
    pub operation: &'static str,
    /// HRESULT or VkResult value, 0 when the native layer does not provide one
    pub code: i64,
    pub message: String,
}

impl PrismNativeError {
    pub fn new(
        backend: Option<PrismBackendType>,
        operation: &'static str,
        code: i64,
        message: impl Into<String>,
    ) -> Self {
        PrismNativeError {
            backend,
            operation,
            code,
            message: message.into(),
        }
    }
}

impl core::fmt::Display for PrismNativeError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match self.backend {
            Some(backend) => write!(
                fmt,
                "{:?} {} failed (code {:#x}): {}",
                backend, self.operation, self.code, self.message
            ),
            None => write!(
                fmt,
                "{} failed (code {:#x}): {}",
                self.operation, self.code, self.message
            ),
        }
    }
}

impl std::error::Error for PrismNativeError {}

/// Generic error that contains all the different kinds of errors that may occur when using the API
#[derive(Debug, Clone, PartialEq)]
pub enum PrismError {
    StringError(String),
    /// The requested backend can't run on this machine
    UnsupportedBackend(PrismBackendType),
    /// Automatic selection found no backend that can run on this machine
    UnsupportedPlatform,
    /// No adapter met the backend's minimum requirements, even after software fallbacks
    NoCompatibleAdapter(String),
    /// A descriptor field is out of range. The device that rejected it is unaffected.
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    NativeError(PrismNativeError),
    /// The device was destroyed before the call was made
    DeviceDestroyed,
}

impl PrismError {
    pub fn invalid_argument(
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        PrismError::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Returns the descriptor field that was rejected, if this is an `InvalidArgument` error
    pub fn invalid_field(&self) -> Option<&'static str> {
        match self {
            PrismError::InvalidArgument { field, .. } => Some(*field),
            _ => None,
        }
    }
}

impl std::error::Error for PrismError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            PrismError::NativeError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl core::fmt::Display for PrismError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            PrismError::StringError(ref e) => e.fmt(fmt),
            PrismError::UnsupportedBackend(backend) => {
                write!(fmt, "Backend {:?} is not supported on this machine", backend)
            }
            PrismError::UnsupportedPlatform => {
                write!(fmt, "No supported graphics backend found for this platform")
            }
            PrismError::NoCompatibleAdapter(ref e) => write!(fmt, "No compatible adapter: {}", e),
            PrismError::InvalidArgument {
                field,
                ref message,
            } => write!(fmt, "Invalid argument '{}': {}", field, message),
            PrismError::NativeError(ref e) => e.fmt(fmt),
            PrismError::DeviceDestroyed => write!(fmt, "The device has already been destroyed"),
        }
    }
}

impl From<&str> for PrismError {
    fn from(str: &str) -> Self {
        PrismError::StringError(str.to_string())
    }
}

impl From<String> for PrismError {
    fn from(string: String) -> Self {
        PrismError::StringError(string)
    }
}

impl From<PrismNativeError> for PrismError {
    fn from(error: PrismNativeError) -> Self {
        PrismError::NativeError(error)
    }
}

#[cfg(feature = "vulkan-loader")]
impl From<vk::Result> for PrismError {
    fn from(result: vk::Result) -> Self {
        PrismError::NativeError(PrismNativeError::new(
            Some(PrismBackendType::Vulkan),
            "vulkan",
            result.as_raw() as i64,
            format!("{:?}", result),
        ))
    }
}

#[cfg(feature = "vulkan-loader")]
impl From<ash::LoadingError> for PrismError {
    fn from(error: ash::LoadingError) -> Self {
        PrismError::NativeError(PrismNativeError::new(
            Some(PrismBackendType::Vulkan),
            "vkGetInstanceProcAddr",
            0,
            error.to_string(),
        ))
    }
}

#[cfg(feature = "vulkan-loader")]
impl From<gpu_allocator::AllocationError> for PrismError {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        PrismError::NativeError(PrismNativeError::new(
            Some(PrismBackendType::Vulkan),
            "vkAllocateMemory",
            0,
            error.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_names_field() {
        let error = PrismError::invalid_argument("width", "must be at least 1");
        assert_eq!(error.invalid_field(), Some("width"));
        assert_eq!(
            error.to_string(),
            "Invalid argument 'width': must be at least 1"
        );
    }

    #[test]
    fn test_native_error_is_source() {
        use std::error::Error;
        let native = PrismNativeError::new(
            Some(PrismBackendType::Dx12),
            "CreateCommittedResource",
            0x8007000e,
            "out of memory",
        );
        let error: PrismError = native.clone().into();
        assert!(error.source().is_some());
        assert_eq!(error, PrismError::NativeError(native));
    }
}
