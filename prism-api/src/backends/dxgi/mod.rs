//! Adapter enumeration shared by the D3D11 and D3D12 backends. Each backend applies its own
//! filtering on top of the adapter lists produced here.

use crate::{PrismAdapterType, PrismFormat, PrismPowerPreference, PrismResult};

bitflags::bitflags! {
    /// Matches DXGI_ADAPTER_FLAG
    pub struct DxgiAdapterFlags: u32 {
        const REMOTE = 0x1;
        /// Microsoft Basic Render Driver / WARP
        const SOFTWARE = 0x2;
    }
}

/// Matches DXGI_GPU_PREFERENCE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DxgiGpuPreference {
    Unspecified,
    MinimumPower,
    HighPerformance,
}

impl From<PrismPowerPreference> for DxgiGpuPreference {
    fn from(preference: PrismPowerPreference) -> Self {
        match preference {
            PrismPowerPreference::HighPerformance => DxgiGpuPreference::HighPerformance,
            PrismPowerPreference::LowPower => DxgiGpuPreference::MinimumPower,
            PrismPowerPreference::NoPreference => DxgiGpuPreference::Unspecified,
        }
    }
}

/// Matches the fields of DXGI_ADAPTER_DESC1 that are used for selection and reporting
#[derive(Clone, Debug, PartialEq)]
pub struct DxgiAdapterDesc {
    pub description: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub sub_sys_id: u32,
    pub revision: u32,
    pub dedicated_video_memory: u64,
    pub dedicated_system_memory: u64,
    pub shared_system_memory: u64,
    pub flags: DxgiAdapterFlags,
}

impl DxgiAdapterDesc {
    pub fn is_software(&self) -> bool {
        self.flags.contains(DxgiAdapterFlags::SOFTWARE)
    }
}

/// An adapter returned by a `DxgiFactory`. `index` identifies the adapter to the native layer
/// that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct DxgiAdapter {
    pub index: u32,
    pub desc: DxgiAdapterDesc,
    /// User-mode driver version from CheckInterfaceSupport, if the adapter reports one
    pub umd_version: Option<u64>,
}

impl DxgiAdapter {
    pub fn log_info(&self) {
        log::debug!("Found adapter {:?}", self.desc.description);
        log::debug!(
            "  Vendor Id: {:#x} Device Id: {:#x} SubSysId: {:#x} Revision: {}",
            self.desc.vendor_id,
            self.desc.device_id,
            self.desc.sub_sys_id,
            self.desc.revision
        );
        log::debug!(
            "  Dedicated VMem: {} Dedicated System Mem: {} Shared System Mem: {} Flags: {:?}",
            self.desc.dedicated_video_memory,
            self.desc.dedicated_system_memory,
            self.desc.shared_system_memory,
            self.desc.flags
        );
    }

    /// DXGI does not report integrated vs. discrete, only whether the adapter is a software one
    pub fn adapter_type(&self) -> PrismAdapterType {
        if self.desc.is_software() {
            PrismAdapterType::Cpu
        } else {
            PrismAdapterType::Unknown
        }
    }

    /// Formats the UMD version the way the driver control panel shows it, i.e. "31.0.101.4502"
    pub fn driver_version_string(&self) -> Option<String> {
        self.umd_version.map(|version| {
            format!(
                "{}.{}.{}.{}",
                (version >> 48) & 0xFFFF,
                (version >> 32) & 0xFFFF,
                (version >> 16) & 0xFFFF,
                version & 0xFFFF
            )
        })
    }
}

/// A DXGI_FORMAT value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DxgiFormat(pub u32);

impl DxgiFormat {
    pub const UNKNOWN: DxgiFormat = DxgiFormat(0);
    pub const R32G32B32A32_FLOAT: DxgiFormat = DxgiFormat(2);
    pub const R16G16B16A16_FLOAT: DxgiFormat = DxgiFormat(10);
    pub const R32G32_FLOAT: DxgiFormat = DxgiFormat(16);
    pub const R32G8X24_TYPELESS: DxgiFormat = DxgiFormat(19);
    pub const D32_FLOAT_S8X24_UINT: DxgiFormat = DxgiFormat(20);
    pub const R10G10B10A2_UNORM: DxgiFormat = DxgiFormat(24);
    pub const R11G11B10_FLOAT: DxgiFormat = DxgiFormat(26);
    pub const R8G8B8A8_UNORM: DxgiFormat = DxgiFormat(28);
    pub const R8G8B8A8_UNORM_SRGB: DxgiFormat = DxgiFormat(29);
    pub const R32_TYPELESS: DxgiFormat = DxgiFormat(39);
    pub const D32_FLOAT: DxgiFormat = DxgiFormat(40);
    pub const R32_FLOAT: DxgiFormat = DxgiFormat(41);
    pub const R32_UINT: DxgiFormat = DxgiFormat(42);
    pub const R24G8_TYPELESS: DxgiFormat = DxgiFormat(44);
    pub const D24_UNORM_S8_UINT: DxgiFormat = DxgiFormat(45);
    pub const R8G8_UNORM: DxgiFormat = DxgiFormat(49);
    pub const R16_TYPELESS: DxgiFormat = DxgiFormat(53);
    pub const R16_FLOAT: DxgiFormat = DxgiFormat(54);
    pub const D16_UNORM: DxgiFormat = DxgiFormat(55);
    pub const R8_UNORM: DxgiFormat = DxgiFormat(61);
    pub const BC1_UNORM: DxgiFormat = DxgiFormat(71);
    pub const BC3_UNORM: DxgiFormat = DxgiFormat(77);
    pub const B8G8R8A8_UNORM: DxgiFormat = DxgiFormat(87);
    pub const B8G8R8A8_UNORM_SRGB: DxgiFormat = DxgiFormat(91);
    pub const BC7_UNORM: DxgiFormat = DxgiFormat(98);
}

impl From<PrismFormat> for DxgiFormat {
    fn from(format: PrismFormat) -> Self {
        match format {
            PrismFormat::R8Unorm => DxgiFormat::R8_UNORM,
            PrismFormat::Rg8Unorm => DxgiFormat::R8G8_UNORM,
            PrismFormat::Rgba8Unorm => DxgiFormat::R8G8B8A8_UNORM,
            PrismFormat::Rgba8UnormSrgb => DxgiFormat::R8G8B8A8_UNORM_SRGB,
            PrismFormat::Bgra8Unorm => DxgiFormat::B8G8R8A8_UNORM,
            PrismFormat::Bgra8UnormSrgb => DxgiFormat::B8G8R8A8_UNORM_SRGB,
            PrismFormat::Rgb10A2Unorm => DxgiFormat::R10G10B10A2_UNORM,
            PrismFormat::Rg11B10Float => DxgiFormat::R11G11B10_FLOAT,
            PrismFormat::R16Float => DxgiFormat::R16_FLOAT,
            PrismFormat::Rgba16Float => DxgiFormat::R16G16B16A16_FLOAT,
            PrismFormat::R32Uint => DxgiFormat::R32_UINT,
            PrismFormat::R32Float => DxgiFormat::R32_FLOAT,
            PrismFormat::Rg32Float => DxgiFormat::R32G32_FLOAT,
            PrismFormat::Rgba32Float => DxgiFormat::R32G32B32A32_FLOAT,
            PrismFormat::Depth16Unorm => DxgiFormat::D16_UNORM,
            PrismFormat::Depth32Float => DxgiFormat::D32_FLOAT,
            PrismFormat::Depth24UnormStencil8 => DxgiFormat::D24_UNORM_S8_UINT,
            PrismFormat::Depth32FloatStencil8 => DxgiFormat::D32_FLOAT_S8X24_UINT,
            PrismFormat::Bc1RgbaUnorm => DxgiFormat::BC1_UNORM,
            PrismFormat::Bc3RgbaUnorm => DxgiFormat::BC3_UNORM,
            PrismFormat::Bc7RgbaUnorm => DxgiFormat::BC7_UNORM,
        }
    }
}

/// The format a texture is created with. Depth formats that are both read and written by shaders
/// use the typeless family so that depth and color views can both be created.
pub(crate) fn dxgi_resource_format(
    format: PrismFormat,
    typeless: bool,
) -> DxgiFormat {
    if !typeless {
        return format.into();
    }

    match format {
        PrismFormat::Depth16Unorm => DxgiFormat::R16_TYPELESS,
        PrismFormat::Depth32Float => DxgiFormat::R32_TYPELESS,
        PrismFormat::Depth24UnormStencil8 => DxgiFormat::R24G8_TYPELESS,
        PrismFormat::Depth32FloatStencil8 => DxgiFormat::R32G8X24_TYPELESS,
        _ => format.into(),
    }
}

/// Native DXGI factory (IDXGIFactory4 and optionally IDXGIFactory6)
pub trait DxgiFactory: Send + Sync {
    /// EnumAdapters1, in the order the OS reports them
    fn enum_adapters(&self) -> PrismResult<Vec<DxgiAdapter>>;

    /// EnumAdapterByGpuPreference. Returns `None` if the factory does not support IDXGIFactory6.
    fn enum_adapters_by_gpu_preference(
        &self,
        preference: DxgiGpuPreference,
    ) -> Option<PrismResult<Vec<DxgiAdapter>>>;

    /// EnumWarpAdapter
    fn enum_warp_adapter(&self) -> PrismResult<DxgiAdapter>;
}

/// Lists adapters in power preference order when the factory supports it, otherwise in the order
/// the OS reports them
pub(crate) fn adapters_in_preference_order(
    factory: &dyn DxgiFactory,
    power_preference: PrismPowerPreference,
) -> PrismResult<Vec<DxgiAdapter>> {
    if let Some(adapters) = factory.enum_adapters_by_gpu_preference(power_preference.into()) {
        match adapters {
            Ok(adapters) => return Ok(adapters),
            Err(e) => log::warn!(
                "EnumAdapterByGpuPreference failed ({}), falling back to default adapter order",
                e
            ),
        }
    }

    factory.enum_adapters()
}

#[cfg(all(windows, feature = "d3d-runtime"))]
mod windows_native;
#[cfg(all(windows, feature = "d3d-runtime"))]
pub use windows_native::*;

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(umd_version: Option<u64>) -> DxgiAdapter {
        DxgiAdapter {
            index: 0,
            desc: DxgiAdapterDesc {
                description: "Test Adapter".to_string(),
                vendor_id: 0x10DE,
                device_id: 0x2204,
                sub_sys_id: 0,
                revision: 0,
                dedicated_video_memory: 0,
                dedicated_system_memory: 0,
                shared_system_memory: 0,
                flags: DxgiAdapterFlags::empty(),
            },
            umd_version,
        }
    }

    #[test]
    fn test_driver_version_string() {
        let version = (31u64 << 48) | (0u64 << 32) | (101u64 << 16) | 4502;
        assert_eq!(
            adapter(Some(version)).driver_version_string().as_deref(),
            Some("31.0.101.4502")
        );
        assert_eq!(adapter(None).driver_version_string(), None);
    }

    #[test]
    fn test_typeless_depth_formats() {
        assert_eq!(
            dxgi_resource_format(PrismFormat::Depth32Float, true),
            DxgiFormat::R32_TYPELESS
        );
        assert_eq!(
            dxgi_resource_format(PrismFormat::Depth32Float, false),
            DxgiFormat::D32_FLOAT
        );
        assert_eq!(
            dxgi_resource_format(PrismFormat::Depth24UnormStencil8, true),
            DxgiFormat::R24G8_TYPELESS
        );
        assert_eq!(
            dxgi_resource_format(PrismFormat::Rgba8Unorm, true),
            DxgiFormat::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_adapter_type() {
        let mut software = adapter(None);
        software.desc.flags = DxgiAdapterFlags::SOFTWARE;
        assert_eq!(software.adapter_type(), PrismAdapterType::Cpu);
        assert_eq!(adapter(None).adapter_type(), PrismAdapterType::Unknown);
    }
}
