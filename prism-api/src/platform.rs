//! Queries about the machine the process runs on, used to decide which backends to try

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrismOsFamily {
    Windows,
    Linux,
    Android,
    MacOs,
    Ios,
    Unknown,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrismCpuArchitecture {
    X86,
    X86_64,
    Arm,
    Aarch64,
    Wasm32,
    Unknown,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrismPlatformInfo {
    pub os_family: PrismOsFamily,
    pub cpu_architecture: PrismCpuArchitecture,
    pub is_64_bit: bool,
}

impl PrismPlatformInfo {
    /// Describes the platform this binary was compiled for
    pub fn current() -> Self {
        let os_family = if cfg!(target_os = "windows") {
            PrismOsFamily::Windows
        } else if cfg!(target_os = "android") {
            PrismOsFamily::Android
        } else if cfg!(target_os = "linux") {
            PrismOsFamily::Linux
        } else if cfg!(target_os = "macos") {
            PrismOsFamily::MacOs
        } else if cfg!(target_os = "ios") {
            PrismOsFamily::Ios
        } else {
            PrismOsFamily::Unknown
        };

        let cpu_architecture = if cfg!(target_arch = "x86") {
            PrismCpuArchitecture::X86
        } else if cfg!(target_arch = "x86_64") {
            PrismCpuArchitecture::X86_64
        } else if cfg!(target_arch = "arm") {
            PrismCpuArchitecture::Arm
        } else if cfg!(target_arch = "aarch64") {
            PrismCpuArchitecture::Aarch64
        } else if cfg!(target_arch = "wasm32") {
            PrismCpuArchitecture::Wasm32
        } else {
            PrismCpuArchitecture::Unknown
        };

        PrismPlatformInfo {
            os_family,
            cpu_architecture,
            is_64_bit: cfg!(target_pointer_width = "64"),
        }
    }

    /// A platform with the given OS and the architecture of the current binary. Useful for
    /// simulating other platforms.
    pub fn with_os_family(os_family: PrismOsFamily) -> Self {
        PrismPlatformInfo {
            os_family,
            ..Self::current()
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os_family == PrismOsFamily::Windows
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self.os_family, PrismOsFamily::Android | PrismOsFamily::Ios)
    }

    pub fn is_arm(&self) -> bool {
        matches!(
            self.cpu_architecture,
            PrismCpuArchitecture::Arm | PrismCpuArchitecture::Aarch64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        let platform = PrismPlatformInfo::current();
        assert_eq!(platform.is_64_bit, std::mem::size_of::<usize>() == 8);

        #[cfg(target_os = "linux")]
        assert_eq!(platform.os_family, PrismOsFamily::Linux);
        #[cfg(target_os = "windows")]
        assert!(platform.is_windows());
        #[cfg(target_arch = "x86_64")]
        assert_eq!(platform.cpu_architecture, PrismCpuArchitecture::X86_64);
    }

    #[test]
    fn test_with_os_family() {
        let platform = PrismPlatformInfo::with_os_family(PrismOsFamily::Android);
        assert!(platform.is_mobile());
        assert!(!platform.is_windows());
    }
}
