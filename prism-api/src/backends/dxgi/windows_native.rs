//! `DxgiFactory` over dxgi.dll, through the `windows` crate

use super::*;
use crate::{PrismBackendType, PrismError, PrismNativeError};
use windows::core::Interface;
use windows::Win32::Foundation::LUID;
use windows::Win32::Graphics::Dxgi as dxgi;

/// `DxgiAdapter::index` of the adapter returned by EnumWarpAdapter. Other adapters use their
/// EnumAdapters1 index, whichever order they were listed in.
pub const DXGI_WARP_ADAPTER_INDEX: u32 = u32::MAX;

/// Wraps a failed HRESULT with the entry point that returned it
pub(crate) fn windows_error(
    backend: Option<PrismBackendType>,
    operation: &'static str,
) -> impl FnOnce(windows::core::Error) -> PrismError {
    move |error| {
        PrismNativeError::new(
            backend,
            operation,
            error.code().0 as u32 as i64,
            error.message().to_string(),
        )
        .into()
    }
}

pub(crate) fn wchar_to_string(s: &[u16]) -> String {
    let wchar = s.split(|&v| v == 0).next().unwrap_or_default();
    String::from_utf16_lossy(wchar)
}

fn same_luid(
    a: &LUID,
    b: &LUID,
) -> bool {
    a.LowPart == b.LowPart && a.HighPart == b.HighPart
}

type NativeAdapter = (dxgi::IDXGIAdapter1, dxgi::DXGI_ADAPTER_DESC1);

/// IDXGIFactory4, plus IDXGIFactory6 when the OS has it
pub struct WindowsDxgiFactory {
    factory: dxgi::IDXGIFactory4,
    // None before Windows 10 1803
    factory6: Option<dxgi::IDXGIFactory6>,
}

// DXGI factories are free threaded
unsafe impl Send for WindowsDxgiFactory {}
unsafe impl Sync for WindowsDxgiFactory {}

impl WindowsDxgiFactory {
    pub fn new(debug: bool) -> PrismResult<Self> {
        let flags = if debug {
            dxgi::DXGI_CREATE_FACTORY_DEBUG
        } else {
            0
        };

        let factory: dxgi::IDXGIFactory4 = unsafe { dxgi::CreateDXGIFactory2(flags) }
            .map_err(windows_error(None, "CreateDXGIFactory2"))?;
        let factory6 = factory.cast::<dxgi::IDXGIFactory6>().ok();

        Ok(WindowsDxgiFactory { factory, factory6 })
    }

    /// The native adapter behind an adapter listed by any `WindowsDxgiFactory`
    pub fn native_adapter(
        &self,
        adapter: &DxgiAdapter,
    ) -> PrismResult<dxgi::IDXGIAdapter1> {
        if adapter.index == DXGI_WARP_ADAPTER_INDEX {
            unsafe { self.factory.EnumWarpAdapter() }
                .map_err(windows_error(None, "EnumWarpAdapter"))
        } else {
            unsafe { self.factory.EnumAdapters1(adapter.index) }
                .map_err(windows_error(None, "EnumAdapters1"))
        }
    }

    fn adapter_desc(adapter: &dxgi::IDXGIAdapter1) -> PrismResult<dxgi::DXGI_ADAPTER_DESC1> {
        let mut desc = Default::default();
        unsafe { adapter.GetDesc1(&mut desc) }.map_err(windows_error(None, "GetDesc1"))?;
        Ok(desc)
    }

    fn to_dxgi_adapter(
        index: u32,
        adapter: &dxgi::IDXGIAdapter1,
        desc: &dxgi::DXGI_ADAPTER_DESC1,
    ) -> DxgiAdapter {
        // Fails on drivers that don't report a UMD version
        let umd_version =
            unsafe { adapter.CheckInterfaceSupport(&<dxgi::IDXGIDevice as Interface>::IID) }
                .ok()
                .map(|version| version as u64);

        DxgiAdapter {
            index,
            desc: DxgiAdapterDesc {
                description: wchar_to_string(&desc.Description),
                vendor_id: desc.VendorId,
                device_id: desc.DeviceId,
                sub_sys_id: desc.SubSysId,
                revision: desc.Revision,
                dedicated_video_memory: desc.DedicatedVideoMemory as u64,
                dedicated_system_memory: desc.DedicatedSystemMemory as u64,
                shared_system_memory: desc.SharedSystemMemory as u64,
                flags: DxgiAdapterFlags::from_bits_truncate(desc.Flags as u32),
            },
            umd_version,
        }
    }

    /// EnumAdapters1 until it runs out of adapters
    fn native_adapters(&self) -> PrismResult<Vec<NativeAdapter>> {
        let mut adapters = Vec::default();
        for index in 0.. {
            // Returns DXGI_ERROR_NOT_FOUND if we run out of adapters to check
            let adapter = match unsafe { self.factory.EnumAdapters1(index) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == dxgi::DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(windows_error(None, "EnumAdapters1")(e)),
            };

            let desc = Self::adapter_desc(&adapter)?;
            adapters.push((adapter, desc));
        }

        Ok(adapters)
    }

    fn adapters_by_gpu_preference(
        &self,
        factory6: &dxgi::IDXGIFactory6,
        preference: DxgiGpuPreference,
    ) -> PrismResult<Vec<DxgiAdapter>> {
        let gpu_preference = match preference {
            DxgiGpuPreference::Unspecified => dxgi::DXGI_GPU_PREFERENCE_UNSPECIFIED,
            DxgiGpuPreference::MinimumPower => dxgi::DXGI_GPU_PREFERENCE_MINIMUM_POWER,
            DxgiGpuPreference::HighPerformance => dxgi::DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
        };

        // Adapters keep their EnumAdapters1 index so that `native_adapter` can find them
        let by_index = self.native_adapters()?;

        let mut adapters = Vec::default();
        for i in 0.. {
            let adapter: dxgi::IDXGIAdapter1 =
                match unsafe { factory6.EnumAdapterByGpuPreference(i, gpu_preference) } {
                    Ok(adapter) => adapter,
                    Err(e) if e.code() == dxgi::DXGI_ERROR_NOT_FOUND => break,
                    Err(e) => return Err(windows_error(None, "EnumAdapterByGpuPreference")(e)),
                };

            let desc = Self::adapter_desc(&adapter)?;
            match by_index
                .iter()
                .position(|(_, indexed)| same_luid(&indexed.AdapterLuid, &desc.AdapterLuid))
            {
                Some(index) => adapters.push(Self::to_dxgi_adapter(index as u32, &adapter, &desc)),
                None => log::debug!(
                    "Adapter {:?} was not listed by EnumAdapters1, skipping it",
                    wchar_to_string(&desc.Description)
                ),
            }
        }

        Ok(adapters)
    }
}

impl DxgiFactory for WindowsDxgiFactory {
    fn enum_adapters(&self) -> PrismResult<Vec<DxgiAdapter>> {
        Ok(self
            .native_adapters()?
            .iter()
            .enumerate()
            .map(|(index, (adapter, desc))| Self::to_dxgi_adapter(index as u32, adapter, desc))
            .collect())
    }

    fn enum_adapters_by_gpu_preference(
        &self,
        preference: DxgiGpuPreference,
    ) -> Option<PrismResult<Vec<DxgiAdapter>>> {
        let factory6 = self.factory6.as_ref()?;
        Some(self.adapters_by_gpu_preference(factory6, preference))
    }

    fn enum_warp_adapter(&self) -> PrismResult<DxgiAdapter> {
        let adapter: dxgi::IDXGIAdapter1 = unsafe { self.factory.EnumWarpAdapter() }
            .map_err(windows_error(None, "EnumWarpAdapter"))?;
        let desc = Self::adapter_desc(&adapter)?;
        Ok(Self::to_dxgi_adapter(
            DXGI_WARP_ADAPTER_INDEX,
            &adapter,
            &desc,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wchar_to_string_stops_at_nul() {
        let mut description = [0u16; 16];
        for (dst, src) in description.iter_mut().zip("WARP".encode_utf16()) {
            *dst = src;
        }
        assert_eq!(wchar_to_string(&description), "WARP");
        assert_eq!(wchar_to_string(&[]), "");
    }

    #[test]
    fn test_adapters_resolve_to_native_adapters() {
        let factory = WindowsDxgiFactory::new(false).unwrap();

        // WARP ships with every Windows install
        let warp = factory.enum_warp_adapter().unwrap();
        assert_eq!(warp.index, DXGI_WARP_ADAPTER_INDEX);
        assert!(warp.desc.is_software());

        let mut adapters = factory.enum_adapters().unwrap();
        adapters.push(warp);
        for adapter in adapters {
            let native = factory.native_adapter(&adapter).unwrap();
            let desc = WindowsDxgiFactory::adapter_desc(&native).unwrap();
            assert_eq!(wchar_to_string(&desc.Description), adapter.desc.description);
            assert_eq!(desc.DeviceId, adapter.desc.device_id);
        }

        if let Some(by_preference) =
            factory.enum_adapters_by_gpu_preference(DxgiGpuPreference::HighPerformance)
        {
            let by_index = factory.enum_adapters().unwrap();
            for adapter in by_preference.unwrap() {
                assert_eq!(by_index[adapter.index as usize].desc, adapter.desc);
            }
        }
    }
}
