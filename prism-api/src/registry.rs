use crate::dx11::{is_dx11_supported, Dx11Native};
use crate::dx12::{is_dx12_supported, Dx12Native};
use crate::dxgi::DxgiFactory;
use crate::vulkan::{is_vulkan_supported, PrismVkInstance, VkNative};
use crate::{
    PrismBackendType, PrismError, PrismLogValidationSink, PrismPlatformInfo, PrismResult,
    PrismValidationMode, PrismValidationSink,
};
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;

const DEFAULT_APPLICATION_NAME: &str = "prism";

static GLOBAL_REGISTRY: Lazy<PrismBackendRegistry> = Lazy::new(PrismBackendRegistry::new_default);

/// Process-scoped state shared by devices: the native entry points for each backend, the native
/// factories created from them and the result of each backend's support check. Factories and
/// support results are created on first use and never change afterwards.
pub struct PrismBackendRegistry {
    platform: PrismPlatformInfo,
    application_name: String,
    validation_sink: Arc<dyn PrismValidationSink>,

    dx11_native: Option<Arc<dyn Dx11Native>>,
    dx12_native: Option<Arc<dyn Dx12Native>>,
    vulkan_native: Option<Arc<dyn VkNative>>,

    dx11_supported: OnceCell<bool>,
    dx12_supported: OnceCell<bool>,
    vulkan_supported: OnceCell<bool>,

    // The debug flag each factory was created with is kept to report mismatches
    dx11_dxgi_factory: OnceCell<(bool, Arc<dyn DxgiFactory>)>,
    dx12_dxgi_factory: OnceCell<(bool, Arc<dyn DxgiFactory>)>,
    vulkan_instance: OnceCell<Arc<PrismVkInstance>>,
}

impl std::fmt::Debug for PrismBackendRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismBackendRegistry")
            .field("platform", &self.platform)
            .field("dx11_native", &self.dx11_native.is_some())
            .field("dx12_native", &self.dx12_native.is_some())
            .field("vulkan_native", &self.vulkan_native.is_some())
            .field("dx11_supported", &self.dx11_supported.get())
            .field("dx12_supported", &self.dx12_supported.get())
            .field("vulkan_supported", &self.vulkan_supported.get())
            .finish()
    }
}

impl PrismBackendRegistry {
    pub fn builder() -> PrismBackendRegistryBuilder {
        PrismBackendRegistryBuilder::default()
    }

    /// The registry used by `PrismDevice::new`. It only has the natives compiled into this
    /// crate: the system Vulkan loader with the `vulkan-loader` feature, and the system D3D11 and
    /// D3D12 runtimes with the `d3d-runtime` feature on windows.
    pub fn global() -> &'static PrismBackendRegistry {
        &GLOBAL_REGISTRY
    }

    fn new_default() -> Self {
        #[allow(unused_mut)]
        let mut builder = PrismBackendRegistry::builder();

        #[cfg(feature = "vulkan-loader")]
        {
            match crate::vulkan::AshVkNative::new() {
                Ok(native) => builder = builder.vulkan_native(Arc::new(native)),
                Err(e) => log::debug!("Vulkan loader not available: {}", e),
            }
        }

        #[cfg(all(windows, feature = "d3d-runtime"))]
        {
            builder = builder
                .dx11_native(Arc::new(crate::dx11::WindowsDx11Native::new()))
                .dx12_native(Arc::new(crate::dx12::WindowsDx12Native::new()));
        }

        builder.build()
    }

    pub fn platform(&self) -> &PrismPlatformInfo {
        &self.platform
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn validation_sink(&self) -> Arc<dyn PrismValidationSink> {
        self.validation_sink.clone()
    }

    pub fn dx11_native(&self) -> Option<&Arc<dyn Dx11Native>> {
        self.dx11_native.as_ref()
    }

    pub fn dx12_native(&self) -> Option<&Arc<dyn Dx12Native>> {
        self.dx12_native.as_ref()
    }

    pub fn vulkan_native(&self) -> Option<&Arc<dyn VkNative>> {
        self.vulkan_native.as_ref()
    }

    /// Whether the backend can run on this machine. Evaluated on the first call for each backend,
    /// later calls return the same answer.
    pub fn is_backend_supported(
        &self,
        backend: PrismBackendType,
    ) -> bool {
        let (cell, check): (&OnceCell<bool>, fn(&PrismBackendRegistry) -> bool) = match backend {
            PrismBackendType::Dx11 => (&self.dx11_supported, is_dx11_supported),
            PrismBackendType::Dx12 => (&self.dx12_supported, is_dx12_supported),
            PrismBackendType::Vulkan => (&self.vulkan_supported, is_vulkan_supported),
        };

        *cell.get_or_init(|| {
            profiling::scope!("PrismBackendRegistry::is_backend_supported");
            let supported = check(self);
            log::debug!("Backend {:?} supported: {}", backend, supported);
            supported
        })
    }

    fn dxgi_factory(
        cell: &OnceCell<(bool, Arc<dyn DxgiFactory>)>,
        backend: PrismBackendType,
        debug: bool,
        create: impl FnOnce(bool) -> PrismResult<Arc<dyn DxgiFactory>>,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        let (created_debug, factory) =
            cell.get_or_try_init(|| create(debug).map(|factory| (debug, factory)))?;

        if *created_debug != debug {
            log::debug!(
                "Reusing the {:?} DXGI factory, created with debug={}, requested debug={}",
                backend,
                created_debug,
                debug
            );
        }

        Ok(factory.clone())
    }

    /// The DXGI factory shared by all D3D11 devices. The first call creates it.
    pub fn dx11_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        let native = self
            .dx11_native
            .as_ref()
            .ok_or(PrismError::UnsupportedBackend(PrismBackendType::Dx11))?;

        Self::dxgi_factory(&self.dx11_dxgi_factory, PrismBackendType::Dx11, debug, |debug| {
            native.create_dxgi_factory(debug)
        })
    }

    /// The DXGI factory shared by all D3D12 devices. The first call creates it.
    pub fn dx12_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        let native = self
            .dx12_native
            .as_ref()
            .ok_or(PrismError::UnsupportedBackend(PrismBackendType::Dx12))?;

        Self::dxgi_factory(&self.dx12_dxgi_factory, PrismBackendType::Dx12, debug, |debug| {
            native.create_dxgi_factory(debug)
        })
    }

    /// The Vulkan instance shared by all Vulkan devices. The first call creates it with the given
    /// validation mode, later devices get the same instance whatever mode they request.
    pub fn vulkan_instance(
        &self,
        validation_mode: PrismValidationMode,
    ) -> PrismResult<Arc<PrismVkInstance>> {
        let native = self
            .vulkan_native
            .as_ref()
            .ok_or(PrismError::UnsupportedBackend(PrismBackendType::Vulkan))?;

        self.vulkan_instance
            .get_or_try_init(|| {
                PrismVkInstance::new(&**native, &self.application_name, validation_mode)
                    .map(Arc::new)
            })
            .map(|instance| instance.clone())
    }
}

/// Configures the natives and sinks of a `PrismBackendRegistry`. A backend without a native is
/// never supported.
pub struct PrismBackendRegistryBuilder {
    platform: PrismPlatformInfo,
    application_name: String,
    validation_sink: Arc<dyn PrismValidationSink>,
    dx11_native: Option<Arc<dyn Dx11Native>>,
    dx12_native: Option<Arc<dyn Dx12Native>>,
    vulkan_native: Option<Arc<dyn VkNative>>,
}

impl Default for PrismBackendRegistryBuilder {
    fn default() -> Self {
        PrismBackendRegistryBuilder {
            platform: PrismPlatformInfo::current(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            validation_sink: Arc::new(PrismLogValidationSink),
            dx11_native: None,
            dx12_native: None,
            vulkan_native: None,
        }
    }
}

impl PrismBackendRegistryBuilder {
    /// Overrides the detected platform
    pub fn platform(
        mut self,
        platform: PrismPlatformInfo,
    ) -> Self {
        self.platform = platform;
        self
    }

    /// Passed to the Vulkan instance
    pub fn application_name(
        mut self,
        application_name: impl Into<String>,
    ) -> Self {
        self.application_name = application_name.into();
        self
    }

    pub fn validation_sink(
        mut self,
        validation_sink: Arc<dyn PrismValidationSink>,
    ) -> Self {
        self.validation_sink = validation_sink;
        self
    }

    pub fn dx11_native(
        mut self,
        native: Arc<dyn Dx11Native>,
    ) -> Self {
        self.dx11_native = Some(native);
        self
    }

    pub fn dx12_native(
        mut self,
        native: Arc<dyn Dx12Native>,
    ) -> Self {
        self.dx12_native = Some(native);
        self
    }

    pub fn vulkan_native(
        mut self,
        native: Arc<dyn VkNative>,
    ) -> Self {
        self.vulkan_native = Some(native);
        self
    }

    pub fn build(self) -> PrismBackendRegistry {
        PrismBackendRegistry {
            platform: self.platform,
            application_name: self.application_name,
            validation_sink: self.validation_sink,
            dx11_native: self.dx11_native,
            dx12_native: self.dx12_native,
            vulkan_native: self.vulkan_native,
            dx11_supported: OnceCell::new(),
            dx12_supported: OnceCell::new(),
            vulkan_supported: OnceCell::new(),
            dx11_dxgi_factory: OnceCell::new(),
            dx12_dxgi_factory: OnceCell::new(),
            vulkan_instance: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dx11::Dx11FeatureLevel;
    use crate::dx12::Dx12FeatureLevel;
    use crate::reference::*;
    use crate::vulkan::{vk_make_api_version, VkPhysicalDeviceType};
    use crate::PrismOsFamily;

    fn windows() -> PrismPlatformInfo {
        PrismPlatformInfo::with_os_family(PrismOsFamily::Windows)
    }

    fn linux() -> PrismPlatformInfo {
        PrismPlatformInfo::with_os_family(PrismOsFamily::Linux)
    }

    #[test]
    fn test_support_check_is_idempotent() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());
        for backend in PrismBackendType::ALL.iter() {
            let first = registry.is_backend_supported(*backend);
            assert!(first);
            assert_eq!(registry.is_backend_supported(*backend), first);
        }

        // The temporary instance is released once the check completes
        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Instance), 0);
        assert_eq!(driver.vulkan.created_instances().len(), 1);
    }

    #[test]
    fn test_d3d_is_windows_only() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(linux());
        assert!(!registry.is_backend_supported(PrismBackendType::Dx11));
        assert!(!registry.is_backend_supported(PrismBackendType::Dx12));
        assert!(registry.is_backend_supported(PrismBackendType::Vulkan));
    }

    #[test]
    fn test_missing_natives_are_unsupported() {
        let registry = PrismBackendRegistry::builder().platform(windows()).build();
        for backend in PrismBackendType::ALL.iter() {
            assert!(!registry.is_backend_supported(*backend));
        }

        assert_eq!(
            registry.dx12_dxgi_factory(false).err(),
            Some(PrismError::UnsupportedBackend(PrismBackendType::Dx12))
        );
        assert!(registry.vulkan_instance(PrismValidationMode::Disabled).is_err());
    }

    #[test]
    fn test_default_registry_installs_compiled_natives() {
        let registry = PrismBackendRegistry::new_default();
        let d3d_runtime = cfg!(all(windows, feature = "d3d-runtime"));
        assert_eq!(registry.dx11_native().is_some(), d3d_runtime);
        assert_eq!(registry.dx12_native().is_some(), d3d_runtime);
        if !cfg!(feature = "vulkan-loader") {
            assert!(registry.vulkan_native().is_none());
        }
    }

    #[test]
    fn test_software_adapters_are_not_supported() {
        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig::software_only(),
            ReferenceVkConfig {
                physical_devices: vec![reference_physical_device(
                    "llvmpipe",
                    VkPhysicalDeviceType::Cpu,
                )],
                ..Default::default()
            },
        );
        let registry = driver.registry(windows());
        for backend in PrismBackendType::ALL.iter() {
            assert!(!registry.is_backend_supported(*backend));
        }
    }

    #[test]
    fn test_d3d11_and_d3d12_filter_adapters_differently() {
        // D3D12 only needs the adapter to create a device at 11_0. D3D11 also needs BGRA support
        // through the D3D11 runtime.
        let mut adapter = ReferenceAdapter::discrete("no bgra", 0x8086);
        adapter.dx11_bgra_support = false;
        let mut old_adapter = ReferenceAdapter::discrete("d3d11 10_1 only", 0x1002);
        old_adapter.dx11_feature_level = Some(Dx11FeatureLevel::Level10_1);
        old_adapter.dx12_feature_level = Some(Dx12FeatureLevel::Level11_0);

        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig {
                adapters: vec![adapter, old_adapter, ReferenceAdapter::warp()],
                ..Default::default()
            },
            ReferenceVkConfig::default(),
        );
        let registry = driver.registry(windows());
        assert!(registry.is_backend_supported(PrismBackendType::Dx12));
        assert!(!registry.is_backend_supported(PrismBackendType::Dx11));
    }

    #[test]
    fn test_dx12_requires_os_support() {
        let tracker = Arc::new(ReferenceObjectTracker::default());
        let dxgi = Arc::new(ReferenceDxgiConfig::default());
        let registry = PrismBackendRegistry::builder()
            .platform(windows())
            .dx11_native(Arc::new(ReferenceDx11Native::new(dxgi.clone(), tracker.clone())))
            .dx12_native(Arc::new(
                ReferenceDx12Native::new(dxgi, tracker).with_os_requirements(false),
            ))
            .build();
        assert!(!registry.is_backend_supported(PrismBackendType::Dx12));
        assert!(registry.is_backend_supported(PrismBackendType::Dx11));
    }

    #[test]
    fn test_old_vulkan_loader_is_unsupported() {
        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig::default(),
            ReferenceVkConfig {
                instance_version: vk_make_api_version(1, 0, 0),
                ..Default::default()
            },
        );
        let registry = driver.registry(linux());
        assert!(!registry.is_backend_supported(PrismBackendType::Vulkan));
        assert!(driver.vulkan.created_instances().is_empty());
    }

    #[test]
    fn test_first_vulkan_instance_wins() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(linux());
        let first = registry
            .vulkan_instance(PrismValidationMode::Enabled)
            .unwrap();
        let second = registry
            .vulkan_instance(PrismValidationMode::Disabled)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.validation_enabled());
        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Instance), 1);

        std::mem::drop((first, second));
        std::mem::drop(registry);
        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Instance), 0);
    }

    #[test]
    fn test_dxgi_factory_is_reused() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());
        let first = registry.dx12_dxgi_factory(true).unwrap();
        let second = registry.dx12_dxgi_factory(false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
