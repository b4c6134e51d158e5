//! A software driver for all three backends. It implements the native traits over simulated
//! adapters and physical devices so that device selection, creation and resource allocation can
//! run on machines without the native runtimes, such as CI. It records every native object it
//! hands out so that leaks and double releases can be detected.

mod tracker;
pub use tracker::*;

mod dxgi;
pub use dxgi::*;

mod dx11;
pub use dx11::*;

mod dx12;
pub use dx12::*;

mod vulkan;
pub use vulkan::*;

use crate::{PrismBackendRegistry, PrismPlatformInfo, PrismValidationSink};
use std::sync::Arc;

/// The reference natives for one simulated machine, sharing a single object tracker
pub struct ReferenceDriver {
    pub tracker: Arc<ReferenceObjectTracker>,
    pub dx11: Arc<ReferenceDx11Native>,
    pub dx12: Arc<ReferenceDx12Native>,
    pub vulkan: Arc<ReferenceVkNative>,
}

impl Default for ReferenceDriver {
    fn default() -> Self {
        ReferenceDriver::new(ReferenceDxgiConfig::default(), ReferenceVkConfig::default())
    }
}

impl ReferenceDriver {
    pub fn new(
        dxgi: ReferenceDxgiConfig,
        vulkan: ReferenceVkConfig,
    ) -> Self {
        let tracker = Arc::new(ReferenceObjectTracker::default());
        let dxgi = Arc::new(dxgi);
        ReferenceDriver {
            dx11: Arc::new(ReferenceDx11Native::new(dxgi.clone(), tracker.clone())),
            dx12: Arc::new(ReferenceDx12Native::new(dxgi, tracker.clone())),
            vulkan: Arc::new(ReferenceVkNative::new(vulkan, tracker.clone())),
            tracker,
        }
    }

    /// A registry for the given platform with all three natives installed. Support checks still
    /// apply, so the D3D backends are only reported on Windows.
    pub fn registry(
        &self,
        platform: PrismPlatformInfo,
    ) -> PrismBackendRegistry {
        PrismBackendRegistry::builder()
            .platform(platform)
            .application_name("prism reference driver")
            .dx11_native(self.dx11.clone())
            .dx12_native(self.dx12.clone())
            .vulkan_native(self.vulkan.clone())
            .build()
    }

    pub fn registry_with_sink(
        &self,
        platform: PrismPlatformInfo,
        validation_sink: Arc<dyn PrismValidationSink>,
    ) -> PrismBackendRegistry {
        PrismBackendRegistry::builder()
            .platform(platform)
            .application_name("prism reference driver")
            .dx11_native(self.dx11.clone())
            .dx12_native(self.dx12.clone())
            .vulkan_native(self.vulkan.clone())
            .validation_sink(validation_sink)
            .build()
    }

    /// Number of native devices, instances and resources that have not been released
    pub fn live_object_count(&self) -> usize {
        [
            ReferenceObjectKind::Instance,
            ReferenceObjectKind::Device,
            ReferenceObjectKind::Buffer,
            ReferenceObjectKind::Texture,
        ]
        .iter()
        .map(|kind| self.tracker.live_count(*kind))
        .sum()
    }
}
