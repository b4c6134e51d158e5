use super::dxgi::*;
use super::{ReferenceObjectKind, ReferenceObjectTracker};
use crate::dx12::*;
use crate::dxgi::{DxgiAdapter, DxgiFactory};
use crate::{PrismBackendType, PrismNativeError, PrismNativeHandle, PrismResult, PrismValidationSeverity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn dx12_error(
    operation: &'static str,
    code: i64,
    message: impl Into<String>,
) -> PrismNativeError {
    PrismNativeError::new(Some(PrismBackendType::Dx12), operation, code, message)
}

#[derive(Default)]
struct DebugLayerState {
    enabled: AtomicBool,
    gpu_based_validation: AtomicBool,
    synchronized_queue_validation: AtomicBool,
}

/// Software implementation of the D3D12 runtime over a simulated set of DXGI adapters
pub struct ReferenceDx12Native {
    dxgi: Arc<ReferenceDxgiConfig>,
    tracker: Arc<ReferenceObjectTracker>,
    meets_os_requirements: bool,
    graphics_tools_installed: bool,
    debug_layer: Arc<DebugLayerState>,
    pending_messages: Arc<Mutex<Vec<Dx12Message>>>,
}

impl ReferenceDx12Native {
    pub fn new(
        dxgi: Arc<ReferenceDxgiConfig>,
        tracker: Arc<ReferenceObjectTracker>,
    ) -> Self {
        ReferenceDx12Native {
            dxgi,
            tracker,
            meets_os_requirements: true,
            graphics_tools_installed: true,
            debug_layer: Default::default(),
            pending_messages: Default::default(),
        }
    }

    /// Simulates a Windows build that predates D3D12
    pub fn with_os_requirements(
        mut self,
        meets_os_requirements: bool,
    ) -> Self {
        self.meets_os_requirements = meets_os_requirements;
        self
    }

    /// Without the graphics tools D3D12GetDebugInterface fails
    pub fn with_graphics_tools(
        mut self,
        graphics_tools_installed: bool,
    ) -> Self {
        self.graphics_tools_installed = graphics_tools_installed;
        self
    }

    pub fn is_debug_layer_enabled(&self) -> bool {
        self.debug_layer.enabled.load(Ordering::Acquire)
    }

    pub fn is_gpu_based_validation_enabled(&self) -> bool {
        self.debug_layer.gpu_based_validation.load(Ordering::Acquire)
            && self
                .debug_layer
                .synchronized_queue_validation
                .load(Ordering::Acquire)
    }

    /// Queues a message as if the debug layer had reported it
    pub fn inject_message(
        &self,
        message: Dx12Message,
    ) {
        self.pending_messages.lock().unwrap().push(message);
    }
}

struct ReferenceDx12Debug {
    state: Arc<DebugLayerState>,
}

impl Dx12Debug for ReferenceDx12Debug {
    fn enable_debug_layer(&self) {
        self.state.enabled.store(true, Ordering::Release);
    }

    fn set_enable_gpu_based_validation(
        &self,
        enable: bool,
    ) -> bool {
        self.state
            .gpu_based_validation
            .store(enable, Ordering::Release);
        true
    }

    fn set_enable_synchronized_command_queue_validation(
        &self,
        enable: bool,
    ) -> bool {
        self.state
            .synchronized_queue_validation
            .store(enable, Ordering::Release);
        true
    }
}

impl Dx12Native for ReferenceDx12Native {
    fn meets_os_requirements(&self) -> bool {
        self.meets_os_requirements
    }

    fn create_dxgi_factory(
        &self,
        _debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        Ok(Arc::new(ReferenceDxgiFactory::new(
            self.dxgi.clone(),
            PrismBackendType::Dx12,
        )))
    }

    fn get_debug_interface(&self) -> PrismResult<Box<dyn Dx12Debug>> {
        if !self.graphics_tools_installed {
            return Err(dx12_error(
                "D3D12GetDebugInterface",
                E_NOINTERFACE,
                "the graphics tools are not installed",
            )
            .into());
        }

        Ok(Box::new(ReferenceDx12Debug {
            state: self.debug_layer.clone(),
        }))
    }

    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx12FeatureLevel,
    ) -> bool {
        self.dxgi
            .find_adapter(adapter)
            .and_then(|adapter| adapter.dx12_feature_level)
            .map_or(false, |max| max >= feature_level)
    }

    fn create_device(
        &self,
        adapter: &DxgiAdapter,
        minimum_feature_level: Dx12FeatureLevel,
    ) -> PrismResult<Box<dyn Dx12NativeDevice>> {
        let reference_adapter = self
            .dxgi
            .find_adapter(adapter)
            .ok_or_else(|| dx12_error("D3D12CreateDevice", E_INVALIDARG, "unknown adapter"))?;

        let max_feature_level = reference_adapter
            .dx12_feature_level
            .filter(|max| *max >= minimum_feature_level)
            .ok_or_else(|| {
                dx12_error(
                    "D3D12CreateDevice",
                    DXGI_ERROR_UNSUPPORTED,
                    format!(
                        "feature level {} is not supported",
                        minimum_feature_level.as_str()
                    ),
                )
            })?;

        let handle = self
            .tracker
            .create(ReferenceObjectKind::Device, None, 0);

        Ok(Box::new(ReferenceDx12Device {
            handle,
            tracker: self.tracker.clone(),
            adapter: reference_adapter.clone(),
            max_feature_level,
            debug: self.is_debug_layer_enabled(),
            shader_patch_mode: Mutex::new(Dx12ShaderPatchMode::None),
            upload_resources: Default::default(),
            pending_messages: self.pending_messages.clone(),
        }))
    }
}

pub struct ReferenceDx12Device {
    handle: PrismNativeHandle,
    tracker: Arc<ReferenceObjectTracker>,
    adapter: ReferenceAdapter,
    max_feature_level: Dx12FeatureLevel,
    debug: bool,
    shader_patch_mode: Mutex<Dx12ShaderPatchMode>,
    // Resources that can be mapped for writing
    upload_resources: Mutex<fnv::FnvHashSet<u64>>,
    pending_messages: Arc<Mutex<Vec<Dx12Message>>>,
}

impl ReferenceDx12Device {
    pub fn shader_patch_mode(&self) -> Dx12ShaderPatchMode {
        *self.shader_patch_mode.lock().unwrap()
    }

    fn no_info_queue(operation: &'static str) -> PrismNativeError {
        dx12_error(operation, E_NOINTERFACE, "the debug layer is not active")
    }
}

impl Dx12NativeDevice for ReferenceDx12Device {
    fn max_feature_level(&self) -> Dx12FeatureLevel {
        self.max_feature_level
    }

    fn configure_info_queue(
        &self,
        _break_on_severity: &[PrismValidationSeverity],
        _deny_list: &[Dx12MessageId],
        _break_on_id: &[Dx12MessageId],
    ) -> PrismResult<()> {
        if !self.debug {
            return Err(Self::no_info_queue("QueryInterface(ID3D12InfoQueue)").into());
        }

        Ok(())
    }

    fn configure_gpu_based_validation(
        &self,
        default_shader_patch_mode: Dx12ShaderPatchMode,
    ) -> PrismResult<()> {
        if !self.debug {
            return Err(Self::no_info_queue("QueryInterface(ID3D12DebugDevice1)").into());
        }

        *self.shader_patch_mode.lock().unwrap() = default_shader_patch_mode;
        Ok(())
    }

    fn take_messages(&self) -> Vec<Dx12Message> {
        if !self.debug {
            return Vec::default();
        }

        std::mem::take(&mut *self.pending_messages.lock().unwrap())
    }

    fn check_architecture(&self) -> PrismResult<Dx12Architecture> {
        Ok(self.adapter.architecture)
    }

    fn check_options5(&self) -> PrismResult<Dx12Options5> {
        Ok(self.adapter.options5)
    }

    fn create_committed_resource(
        &self,
        heap_properties: &Dx12HeapProperties,
        _heap_flags: Dx12HeapFlags,
        desc: &Dx12ResourceDesc,
        _initial_state: Dx12ResourceStates,
    ) -> PrismResult<PrismNativeHandle> {
        if desc.width == 0 || desc.height == 0 || desc.depth_or_array_size == 0 {
            return Err(dx12_error(
                "CreateCommittedResource",
                E_INVALIDARG,
                "zero sized resource",
            )
            .into());
        }

        let (kind, size) = match desc.dimension {
            Dx12ResourceDimension::Buffer => (ReferenceObjectKind::Buffer, desc.width),
            _ => (
                ReferenceObjectKind::Texture,
                desc.width
                    * desc.height as u64
                    * desc.depth_or_array_size as u64
                    * desc.sample_count.max(1) as u64
                    * 4,
            ),
        };

        if size > self.adapter.max_allocation_size {
            return Err(dx12_error(
                "CreateCommittedResource",
                E_OUTOFMEMORY,
                format!("{} bytes exceeds the adapter's allocation limit", size),
            )
            .into());
        }

        let resource = self.tracker.create(kind, Some(self.handle), size);
        let mappable = heap_properties.heap_type == Dx12HeapType::Upload
            || heap_properties.cpu_page_property == Dx12CpuPageProperty::WriteCombine;
        if kind == ReferenceObjectKind::Buffer && mappable {
            self.upload_resources.lock().unwrap().insert(resource.0);
        }

        Ok(resource)
    }

    fn set_device_name(
        &self,
        name: &str,
    ) {
        self.tracker.set_name(self.handle, name);
    }

    fn set_resource_name(
        &self,
        resource: PrismNativeHandle,
        name: &str,
    ) {
        self.tracker.set_name(resource, name);
    }

    fn write_resource_data(
        &self,
        resource: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()> {
        if !self.upload_resources.lock().unwrap().contains(&resource.0) {
            return Err(dx12_error(
                "Map",
                E_INVALIDARG,
                "the resource is not in a CPU writable heap",
            )
            .into());
        }

        self.tracker.write(resource, offset, data)
    }

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    ) {
        self.upload_resources.lock().unwrap().remove(&resource.0);
        self.tracker.release(resource);
    }

    fn wait_idle(&self) -> PrismResult<()> {
        // The fence is signaled as soon as it is queued
        Ok(())
    }

    fn release(&self) -> u32 {
        let outstanding = self.tracker.live_children(self.handle) as u32;
        self.tracker.release(self.handle);
        outstanding
    }
}
