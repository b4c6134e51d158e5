use crate::dx11::Dx11FeatureLevel;
use crate::dx12::{Dx12Architecture, Dx12FeatureLevel, Dx12Options5, DX12_RAYTRACING_TIER_1_0};
use crate::dxgi::{DxgiAdapter, DxgiAdapterDesc, DxgiAdapterFlags, DxgiFactory, DxgiGpuPreference};
use crate::{PrismBackendType, PrismNativeError, PrismResult};
use std::sync::Arc;

/// DXGI_ERROR_NOT_FOUND
pub(crate) const DXGI_ERROR_NOT_FOUND: i64 = 0x887A0002;
/// DXGI_ERROR_UNSUPPORTED
pub(crate) const DXGI_ERROR_UNSUPPORTED: i64 = 0x887A0004;
/// DXGI_ERROR_SDK_COMPONENT_MISSING
pub(crate) const DXGI_ERROR_SDK_COMPONENT_MISSING: i64 = 0x887A002D;
pub(crate) const E_NOINTERFACE: i64 = 0x80004002;
pub(crate) const E_INVALIDARG: i64 = 0x80070057;
pub(crate) const E_OUTOFMEMORY: i64 = 0x8007000E;

const GIGABYTE: u64 = 1024 * 1024 * 1024;

/// A simulated DXGI adapter and what each D3D runtime reports for it
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceAdapter {
    pub desc: DxgiAdapterDesc,
    pub umd_version: Option<u64>,
    /// Highest D3D11 feature level, `None` if D3D11CreateDevice fails on this adapter
    pub dx11_feature_level: Option<Dx11FeatureLevel>,
    pub dx11_bgra_support: bool,
    /// Highest D3D12 feature level, `None` if D3D12CreateDevice fails on this adapter
    pub dx12_feature_level: Option<Dx12FeatureLevel>,
    pub architecture: Dx12Architecture,
    pub options5: Dx12Options5,
    /// Resources larger than this fail to allocate with E_OUTOFMEMORY
    pub max_allocation_size: u64,
}

impl ReferenceAdapter {
    pub fn discrete(
        description: &str,
        vendor_id: u32,
    ) -> Self {
        ReferenceAdapter {
            desc: DxgiAdapterDesc {
                description: description.to_string(),
                vendor_id,
                device_id: 0x2484,
                sub_sys_id: 0,
                revision: 0xa1,
                dedicated_video_memory: 8 * GIGABYTE,
                dedicated_system_memory: 0,
                shared_system_memory: 16 * GIGABYTE,
                flags: DxgiAdapterFlags::empty(),
            },
            // 31.0.15.3598
            umd_version: Some((31 << 48) | (15 << 16) | 3598),
            dx11_feature_level: Some(Dx11FeatureLevel::Level11_1),
            dx11_bgra_support: true,
            dx12_feature_level: Some(Dx12FeatureLevel::Level12_2),
            architecture: Dx12Architecture::default(),
            options5: Dx12Options5 {
                render_pass_tier: 1,
                raytracing_tier: DX12_RAYTRACING_TIER_1_0,
            },
            max_allocation_size: 4 * GIGABYTE,
        }
    }

    pub fn integrated(
        description: &str,
        vendor_id: u32,
    ) -> Self {
        let mut adapter = ReferenceAdapter::discrete(description, vendor_id);
        adapter.desc.device_id = 0x9a49;
        adapter.desc.dedicated_video_memory = 128 * 1024 * 1024;
        adapter.dx12_feature_level = Some(Dx12FeatureLevel::Level12_1);
        adapter.architecture = Dx12Architecture {
            uma: true,
            cache_coherent_uma: true,
        };
        adapter.options5 = Dx12Options5::default();
        adapter.max_allocation_size = 2 * GIGABYTE;
        adapter
    }

    /// The Microsoft Basic Render Driver
    pub fn warp() -> Self {
        ReferenceAdapter {
            desc: DxgiAdapterDesc {
                description: "Microsoft Basic Render Driver".to_string(),
                vendor_id: 0x1414,
                device_id: 0x8c,
                sub_sys_id: 0,
                revision: 0,
                dedicated_video_memory: 0,
                dedicated_system_memory: 0,
                shared_system_memory: 8 * GIGABYTE,
                flags: DxgiAdapterFlags::SOFTWARE,
            },
            umd_version: None,
            dx11_feature_level: Some(Dx11FeatureLevel::Level11_1),
            dx11_bgra_support: true,
            dx12_feature_level: Some(Dx12FeatureLevel::Level12_1),
            architecture: Dx12Architecture {
                uma: true,
                cache_coherent_uma: true,
            },
            options5: Dx12Options5::default(),
            max_allocation_size: GIGABYTE,
        }
    }

    fn to_dxgi_adapter(
        &self,
        index: u32,
    ) -> DxgiAdapter {
        DxgiAdapter {
            index,
            desc: self.desc.clone(),
            umd_version: self.umd_version,
        }
    }
}

/// The adapters a simulated machine exposes through DXGI
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceDxgiConfig {
    /// Adapters in the order EnumAdapters1 reports them. A real machine lists the Basic Render
    /// Driver last.
    pub adapters: Vec<ReferenceAdapter>,
    /// Returned by EnumWarpAdapter. `None` fails with DXGI_ERROR_NOT_FOUND.
    pub warp_adapter: Option<ReferenceAdapter>,
    /// Whether the factory implements IDXGIFactory6
    pub supports_gpu_preference: bool,
}

impl Default for ReferenceDxgiConfig {
    fn default() -> Self {
        ReferenceDxgiConfig {
            adapters: vec![
                ReferenceAdapter::discrete("Reference Discrete Adapter", 0x10de),
                ReferenceAdapter::warp(),
            ],
            warp_adapter: Some(ReferenceAdapter::warp()),
            supports_gpu_preference: true,
        }
    }
}

impl ReferenceDxgiConfig {
    /// A machine with no usable GPU, only the Basic Render Driver
    pub fn software_only() -> Self {
        ReferenceDxgiConfig {
            adapters: vec![ReferenceAdapter::warp()],
            ..Default::default()
        }
    }

    /// The WARP adapter is given the index after the last enumerated adapter
    fn warp_index(&self) -> u32 {
        self.adapters.len() as u32
    }

    pub(crate) fn find_adapter(
        &self,
        adapter: &DxgiAdapter,
    ) -> Option<&ReferenceAdapter> {
        if adapter.index == self.warp_index() {
            return self.warp_adapter.as_ref();
        }

        self.adapters.get(adapter.index as usize)
    }

    pub(crate) fn warp_dxgi_adapter(&self) -> Option<DxgiAdapter> {
        self.warp_adapter
            .as_ref()
            .map(|adapter| adapter.to_dxgi_adapter(self.warp_index()))
    }
}

pub struct ReferenceDxgiFactory {
    config: Arc<ReferenceDxgiConfig>,
    backend: PrismBackendType,
}

impl ReferenceDxgiFactory {
    pub(crate) fn new(
        config: Arc<ReferenceDxgiConfig>,
        backend: PrismBackendType,
    ) -> Self {
        ReferenceDxgiFactory { config, backend }
    }
}

impl DxgiFactory for ReferenceDxgiFactory {
    fn enum_adapters(&self) -> PrismResult<Vec<DxgiAdapter>> {
        Ok(self
            .config
            .adapters
            .iter()
            .enumerate()
            .map(|(index, adapter)| adapter.to_dxgi_adapter(index as u32))
            .collect())
    }

    fn enum_adapters_by_gpu_preference(
        &self,
        preference: DxgiGpuPreference,
    ) -> Option<PrismResult<Vec<DxgiAdapter>>> {
        if !self.config.supports_gpu_preference {
            return None;
        }

        let mut adapters = match self.enum_adapters() {
            Ok(adapters) => adapters,
            Err(e) => return Some(Err(e)),
        };

        // Software adapters are always listed last, the sort is stable
        match preference {
            DxgiGpuPreference::Unspecified => {}
            DxgiGpuPreference::HighPerformance => adapters.sort_by_key(|adapter| {
                (
                    adapter.desc.is_software(),
                    std::cmp::Reverse(adapter.desc.dedicated_video_memory),
                )
            }),
            DxgiGpuPreference::MinimumPower => adapters.sort_by_key(|adapter| {
                (
                    adapter.desc.is_software(),
                    adapter.desc.dedicated_video_memory,
                )
            }),
        }

        Some(Ok(adapters))
    }

    fn enum_warp_adapter(&self) -> PrismResult<DxgiAdapter> {
        self.config.warp_dxgi_adapter().ok_or_else(|| {
            PrismNativeError::new(
                Some(self.backend),
                "EnumWarpAdapter",
                DXGI_ERROR_NOT_FOUND,
                "WARP is not installed",
            )
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(adapters: &[DxgiAdapter]) -> Vec<&str> {
        adapters
            .iter()
            .map(|adapter| adapter.desc.description.as_str())
            .collect()
    }

    #[test]
    fn test_gpu_preference_order() {
        let config = ReferenceDxgiConfig {
            adapters: vec![
                ReferenceAdapter::integrated("integrated", 0x8086),
                ReferenceAdapter::warp(),
                ReferenceAdapter::discrete("discrete", 0x1002),
            ],
            ..Default::default()
        };
        let factory = ReferenceDxgiFactory::new(Arc::new(config), PrismBackendType::Dx12);

        let high = factory
            .enum_adapters_by_gpu_preference(DxgiGpuPreference::HighPerformance)
            .unwrap()
            .unwrap();
        assert_eq!(
            names(&high),
            vec!["discrete", "integrated", "Microsoft Basic Render Driver"]
        );
        // Indices still refer to EnumAdapters1 order
        assert_eq!(high[0].index, 2);

        let low = factory
            .enum_adapters_by_gpu_preference(DxgiGpuPreference::MinimumPower)
            .unwrap()
            .unwrap();
        assert_eq!(
            names(&low),
            vec!["integrated", "discrete", "Microsoft Basic Render Driver"]
        );
    }

    #[test]
    fn test_warp_adapter() {
        let config = Arc::new(ReferenceDxgiConfig {
            supports_gpu_preference: false,
            ..Default::default()
        });
        let factory = ReferenceDxgiFactory::new(config.clone(), PrismBackendType::Dx11);
        assert!(factory
            .enum_adapters_by_gpu_preference(DxgiGpuPreference::HighPerformance)
            .is_none());

        let warp = factory.enum_warp_adapter().unwrap();
        assert_eq!(warp.index, 2);
        assert!(warp.desc.is_software());
        assert_eq!(config.find_adapter(&warp), config.warp_adapter.as_ref());

        let config = ReferenceDxgiConfig {
            warp_adapter: None,
            ..Default::default()
        };
        let factory = ReferenceDxgiFactory::new(Arc::new(config), PrismBackendType::Dx11);
        assert!(factory.enum_warp_adapter().is_err());
    }
}
