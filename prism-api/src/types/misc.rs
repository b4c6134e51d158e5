#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// One of the native graphics APIs a device can be created on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismBackendType {
    Dx11,
    Dx12,
    Vulkan,
}

impl PrismBackendType {
    pub const ALL: [PrismBackendType; 3] = [
        PrismBackendType::Dx11,
        PrismBackendType::Dx12,
        PrismBackendType::Vulkan,
    ];
}

/// Controls if validation is enabled or not. The requirements/behaviors of validation is
/// API-specific. Failing to enable validation is never fatal, the device is created without it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismValidationMode {
    /// Do not enable validation
    Disabled,

    /// Enable the native debug layer, reporting errors and warnings
    Enabled,

    /// Same as `Enabled`, but also reports informational messages
    Verbose,

    /// Enable GPU-assisted validation in addition to the debug layer. This is very slow. On
    /// backends that don't support it this behaves like `Enabled`.
    Gpu,
}

impl PrismValidationMode {
    pub fn is_enabled(self) -> bool {
        self != PrismValidationMode::Disabled
    }
}

impl Default for PrismValidationMode {
    fn default() -> Self {
        PrismValidationMode::Disabled
    }
}

/// Hint for which adapter to pick when more than one is suitable
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismPowerPreference {
    /// Prefer a discrete GPU
    HighPerformance,
    /// Prefer an integrated GPU
    LowPower,
    /// Use the adapters in the order the native API reports them
    NoPreference,
}

impl Default for PrismPowerPreference {
    fn default() -> Self {
        PrismPowerPreference::HighPerformance
    }
}

/// The class of hardware an adapter represents
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismAdapterType {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    /// Software rasterizers like WARP or lavapipe
    Cpu,
    Unknown,
}

impl Default for PrismAdapterType {
    fn default() -> Self {
        PrismAdapterType::Unknown
    }
}

/// GPU vendor, decoded from the PCI vendor id
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismVendor {
    Amd,
    Nvidia,
    Intel,
    Arm,
    Qualcomm,
    ImgTec,
    Microsoft,
    Apple,
    Mesa,
    Broadcom,
    Unknown,
}

impl PrismVendor {
    pub fn from_vendor_id(vendor_id: u32) -> Self {
        match vendor_id {
            0x1002 | 0x1022 => PrismVendor::Amd,
            0x10DE => PrismVendor::Nvidia,
            0x8086 => PrismVendor::Intel,
            0x13B5 => PrismVendor::Arm,
            0x5143 => PrismVendor::Qualcomm,
            0x1010 => PrismVendor::ImgTec,
            0x1414 => PrismVendor::Microsoft,
            0x106B => PrismVendor::Apple,
            0x10005 => PrismVendor::Mesa,
            0x14E4 => PrismVendor::Broadcom,
            _ => PrismVendor::Unknown,
        }
    }
}

/// Number of MSAA samples to use. 1xMSAA and 4xMSAA are most broadly supported
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismSampleCount {
    SampleCount1,
    SampleCount2,
    SampleCount4,
    SampleCount8,
    SampleCount16,
}

impl PrismSampleCount {
    pub fn as_u32(self) -> u32 {
        match self {
            PrismSampleCount::SampleCount1 => 1,
            PrismSampleCount::SampleCount2 => 2,
            PrismSampleCount::SampleCount4 => 4,
            PrismSampleCount::SampleCount8 => 8,
            PrismSampleCount::SampleCount16 => 16,
        }
    }
}

impl Default for PrismSampleCount {
    fn default() -> Self {
        PrismSampleCount::SampleCount1
    }
}

/// How the CPU may access a resource's memory
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismCpuAccess {
    /// GPU only
    None,
    /// The GPU writes, the CPU reads back (staging/readback)
    Read,
    /// The CPU writes, the GPU reads (dynamic/upload)
    Write,
}

impl Default for PrismCpuAccess {
    fn default() -> Self {
        PrismCpuAccess::None
    }
}

/// Used to indicate which type of queue to use. Only the vulkan backend exposes separate queues.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrismQueueType {
    /// Graphics queues generally supports all operations and are a safe default choice
    Graphics,

    /// Compute queues can be used for compute-based work.
    Compute,

    /// Transfer queues are generally limited to basic operations like copying data from buffers
    /// to images.
    Transfer,
}

/// Opaque identifier of a native object, owned by the native layer that issued it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrismNativeHandle(pub u64);

bitflags::bitflags! {
    /// Indicates how a buffer will be used. Multiple flags are allowed.
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct PrismBufferUsage: u32 {
        const VERTEX = 1<<0;
        const INDEX = 1<<1;
        /// Similar to DX constant buffers and vulkan UNIFORM_BUFFER
        const CONSTANT = 1<<2;
        /// Similar to DX SRV and vulkan STORAGE_BUFFER read access
        const SHADER_READ = 1<<3;
        /// Similar to DX UAV and vulkan STORAGE_BUFFER write access
        const SHADER_WRITE = 1<<4;
        const INDIRECT = 1<<5;
        const SHADER_READ_WRITE = Self::SHADER_READ.bits | Self::SHADER_WRITE.bits;
    }
}

impl Default for PrismBufferUsage {
    fn default() -> Self {
        PrismBufferUsage::SHADER_READ_WRITE
    }
}

bitflags::bitflags! {
    /// Indicates how a texture will be used. Multiple flags are allowed.
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct PrismTextureUsage: u32 {
        /// Similar to DX SRV and vulkan SAMPLED image usage
        const SHADER_READ = 1<<0;
        /// Similar to DX UAV and vulkan STORAGE image usage
        const SHADER_WRITE = 1<<1;
        /// Color attachment, or depth/stencil attachment for depth formats
        const RENDER_TARGET = 1<<2;
        const SHADER_READ_WRITE = Self::SHADER_READ.bits | Self::SHADER_WRITE.bits;
    }
}

impl Default for PrismTextureUsage {
    fn default() -> Self {
        PrismTextureUsage::SHADER_READ
    }
}

bitflags::bitflags! {
    /// Requests that a resource can be shared with other processes or adapters. Backends ignore
    /// flags they cannot express.
    #[derive(Default)]
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct PrismSharedResourceFlags: u32 {
        const SHARED = 1<<0;
        /// Shared through an NT handle, with a keyed mutex on D3D11
        const SHARED_NT_HANDLE = 1<<1;
        const CROSS_ADAPTER = 1<<2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_id() {
        assert_eq!(PrismVendor::from_vendor_id(0x10DE), PrismVendor::Nvidia);
        assert_eq!(PrismVendor::from_vendor_id(0x1002), PrismVendor::Amd);
        assert_eq!(PrismVendor::from_vendor_id(0x8086), PrismVendor::Intel);
        assert_eq!(PrismVendor::from_vendor_id(0xFFFF), PrismVendor::Unknown);
    }

    #[test]
    fn test_buffer_usage_default_is_read_write() {
        let usage = PrismBufferUsage::default();
        assert!(usage.contains(PrismBufferUsage::SHADER_READ));
        assert!(usage.contains(PrismBufferUsage::SHADER_WRITE));
        assert!(!usage.intersects(PrismBufferUsage::VERTEX | PrismBufferUsage::CONSTANT));
    }
}
