//! `Dx12Native` over d3d12.dll, through the `windows` crate

use super::native::*;
use crate::dxgi::{windows_error, DxgiAdapter, DxgiFactory, WindowsDxgiFactory};
use crate::{
    PrismBackendType, PrismError, PrismNativeError, PrismNativeHandle, PrismResult,
    PrismValidationSeverity,
};
use fnv::FnvHashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D as d3d;
use windows::Win32::Graphics::Direct3D12 as d3d12;
use windows::Win32::Graphics::Dxgi as dxgi;
use windows::Win32::Graphics::Dxgi::Common as dxgi_common;

fn dx12_error(operation: &'static str) -> impl FnOnce(windows::core::Error) -> PrismError {
    windows_error(Some(PrismBackendType::Dx12), operation)
}

fn native_error(
    operation: &'static str,
    message: impl Into<String>,
) -> PrismError {
    PrismNativeError::new(Some(PrismBackendType::Dx12), operation, 0, message).into()
}

const ALL_FEATURE_LEVELS: [Dx12FeatureLevel; 5] = [
    Dx12FeatureLevel::Level11_0,
    Dx12FeatureLevel::Level11_1,
    Dx12FeatureLevel::Level12_0,
    Dx12FeatureLevel::Level12_1,
    Dx12FeatureLevel::Level12_2,
];

fn d3d_feature_level(feature_level: Dx12FeatureLevel) -> d3d::D3D_FEATURE_LEVEL {
    match feature_level {
        Dx12FeatureLevel::Level11_0 => d3d::D3D_FEATURE_LEVEL_11_0,
        Dx12FeatureLevel::Level11_1 => d3d::D3D_FEATURE_LEVEL_11_1,
        Dx12FeatureLevel::Level12_0 => d3d::D3D_FEATURE_LEVEL_12_0,
        Dx12FeatureLevel::Level12_1 => d3d::D3D_FEATURE_LEVEL_12_1,
        Dx12FeatureLevel::Level12_2 => d3d::D3D_FEATURE_LEVEL_12_2,
    }
}

fn dx12_feature_level(feature_level: d3d::D3D_FEATURE_LEVEL) -> Option<Dx12FeatureLevel> {
    ALL_FEATURE_LEVELS
        .iter()
        .copied()
        .find(|level| d3d_feature_level(*level) == feature_level)
}

fn d3d12_severity(severity: PrismValidationSeverity) -> d3d12::D3D12_MESSAGE_SEVERITY {
    match severity {
        PrismValidationSeverity::Corruption => d3d12::D3D12_MESSAGE_SEVERITY_CORRUPTION,
        PrismValidationSeverity::Error => d3d12::D3D12_MESSAGE_SEVERITY_ERROR,
        PrismValidationSeverity::Warning => d3d12::D3D12_MESSAGE_SEVERITY_WARNING,
        PrismValidationSeverity::Info => d3d12::D3D12_MESSAGE_SEVERITY_INFO,
        PrismValidationSeverity::Message => d3d12::D3D12_MESSAGE_SEVERITY_MESSAGE,
    }
}

fn validation_severity(severity: d3d12::D3D12_MESSAGE_SEVERITY) -> PrismValidationSeverity {
    [
        PrismValidationSeverity::Corruption,
        PrismValidationSeverity::Error,
        PrismValidationSeverity::Warning,
        PrismValidationSeverity::Info,
    ]
    .iter()
    .copied()
    .find(|candidate| d3d12_severity(*candidate) == severity)
    .unwrap_or(PrismValidationSeverity::Message)
}

const NAMED_MESSAGE_IDS: [(Dx12MessageId, d3d12::D3D12_MESSAGE_ID); 7] = [
    (
        Dx12MessageId::ClearRenderTargetViewMismatchingClearValue,
        d3d12::D3D12_MESSAGE_ID_CLEARRENDERTARGETVIEW_MISMATCHINGCLEARVALUE,
    ),
    (
        Dx12MessageId::ClearDepthStencilViewMismatchingClearValue,
        d3d12::D3D12_MESSAGE_ID_CLEARDEPTHSTENCILVIEW_MISMATCHINGCLEARVALUE,
    ),
    (
        Dx12MessageId::MapInvalidNullRange,
        d3d12::D3D12_MESSAGE_ID_MAP_INVALID_NULLRANGE,
    ),
    (
        Dx12MessageId::UnmapInvalidNullRange,
        d3d12::D3D12_MESSAGE_ID_UNMAP_INVALID_NULLRANGE,
    ),
    (
        Dx12MessageId::ExecuteCommandListsWrongSwapChainBufferReference,
        d3d12::D3D12_MESSAGE_ID_EXECUTECOMMANDLISTS_WRONGSWAPCHAINBUFFERREFERENCE,
    ),
    (
        Dx12MessageId::ResourceBarrierMismatchingCommandListType,
        d3d12::D3D12_MESSAGE_ID_RESOURCE_BARRIER_MISMATCHING_COMMAND_LIST_TYPE,
    ),
    (
        Dx12MessageId::DeviceRemovalProcessAtFault,
        d3d12::D3D12_MESSAGE_ID_DEVICE_REMOVAL_PROCESS_AT_FAULT,
    ),
];

fn d3d12_message_id(id: Dx12MessageId) -> d3d12::D3D12_MESSAGE_ID {
    match id {
        Dx12MessageId::Other(id) => d3d12::D3D12_MESSAGE_ID(id as _),
        named => NAMED_MESSAGE_IDS
            .iter()
            .find(|(candidate, _)| *candidate == named)
            .map(|(_, native)| *native)
            .unwrap_or(d3d12::D3D12_MESSAGE_ID(0)),
    }
}

fn dx12_message_id(id: d3d12::D3D12_MESSAGE_ID) -> Dx12MessageId {
    NAMED_MESSAGE_IDS
        .iter()
        .find(|(_, native)| *native == id)
        .map(|(named, _)| *named)
        .unwrap_or(Dx12MessageId::Other(id.0 as i32))
}

fn d3d12_shader_patch_mode(
    mode: Dx12ShaderPatchMode
) -> d3d12::D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE {
    match mode {
        Dx12ShaderPatchMode::None => d3d12::D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE_NONE,
        Dx12ShaderPatchMode::StateTrackingOnly => {
            d3d12::D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE_STATE_TRACKING_ONLY
        }
        Dx12ShaderPatchMode::UnguardedValidation => {
            d3d12::D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE_UNGUARDED_VALIDATION
        }
        Dx12ShaderPatchMode::GuardedValidation => {
            d3d12::D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE_GUARDED_VALIDATION
        }
    }
}

fn d3d12_heap_properties(heap_properties: &Dx12HeapProperties) -> d3d12::D3D12_HEAP_PROPERTIES {
    d3d12::D3D12_HEAP_PROPERTIES {
        Type: match heap_properties.heap_type {
            Dx12HeapType::Default => d3d12::D3D12_HEAP_TYPE_DEFAULT,
            Dx12HeapType::Upload => d3d12::D3D12_HEAP_TYPE_UPLOAD,
            Dx12HeapType::Readback => d3d12::D3D12_HEAP_TYPE_READBACK,
            Dx12HeapType::Custom => d3d12::D3D12_HEAP_TYPE_CUSTOM,
        },
        CPUPageProperty: match heap_properties.cpu_page_property {
            Dx12CpuPageProperty::Unknown => d3d12::D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
            Dx12CpuPageProperty::NotAvailable => d3d12::D3D12_CPU_PAGE_PROPERTY_NOT_AVAILABLE,
            Dx12CpuPageProperty::WriteCombine => d3d12::D3D12_CPU_PAGE_PROPERTY_WRITE_COMBINE,
            Dx12CpuPageProperty::WriteBack => d3d12::D3D12_CPU_PAGE_PROPERTY_WRITE_BACK,
        },
        MemoryPoolPreference: match heap_properties.memory_pool {
            Dx12MemoryPool::Unknown => d3d12::D3D12_MEMORY_POOL_UNKNOWN,
            Dx12MemoryPool::L0 => d3d12::D3D12_MEMORY_POOL_L0,
            Dx12MemoryPool::L1 => d3d12::D3D12_MEMORY_POOL_L1,
        },
        CreationNodeMask: 0,
        VisibleNodeMask: 0,
    }
}

fn d3d12_resource_desc(desc: &Dx12ResourceDesc) -> d3d12::D3D12_RESOURCE_DESC {
    d3d12::D3D12_RESOURCE_DESC {
        Dimension: match desc.dimension {
            Dx12ResourceDimension::Buffer => d3d12::D3D12_RESOURCE_DIMENSION_BUFFER,
            Dx12ResourceDimension::Texture1D => d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE1D,
            Dx12ResourceDimension::Texture2D => d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Dx12ResourceDimension::Texture3D => d3d12::D3D12_RESOURCE_DIMENSION_TEXTURE3D,
        },
        Alignment: desc.alignment,
        Width: desc.width,
        Height: desc.height,
        DepthOrArraySize: desc.depth_or_array_size,
        MipLevels: desc.mip_levels,
        Format: dxgi_common::DXGI_FORMAT(desc.format.0 as _),
        SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
            Count: desc.sample_count,
            Quality: desc.sample_quality,
        },
        Layout: match desc.layout {
            Dx12TextureLayout::Unknown => d3d12::D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Dx12TextureLayout::RowMajor => d3d12::D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        },
        Flags: d3d12::D3D12_RESOURCE_FLAGS(desc.flags.bits() as _),
    }
}

fn set_name(
    object: &d3d12::ID3D12Object,
    name: &str,
) {
    let utf16: Vec<_> = name.encode_utf16().chain(std::iter::once(0)).collect();
    if let Err(e) = unsafe { object.SetName(windows::core::PCWSTR::from_raw(utf16.as_ptr())) } {
        log::debug!("SetName failed: {:?}", e);
    }
}

/// The system D3D12 runtime
#[derive(Default)]
pub struct WindowsDx12Native;

impl WindowsDx12Native {
    pub fn new() -> Self {
        WindowsDx12Native
    }

    fn native_adapter(adapter: &DxgiAdapter) -> PrismResult<dxgi::IDXGIAdapter1> {
        WindowsDxgiFactory::new(false)?.native_adapter(adapter)
    }
}

impl Dx12Native for WindowsDx12Native {
    fn meets_os_requirements(&self) -> bool {
        // d3d12.dll is linked at load time, so the process would not have started without it
        true
    }

    fn create_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        Ok(Arc::new(WindowsDxgiFactory::new(debug)?))
    }

    fn get_debug_interface(&self) -> PrismResult<Box<dyn Dx12Debug>> {
        let mut debug: Option<d3d12::ID3D12Debug> = None;
        unsafe { d3d12::D3D12GetDebugInterface(&mut debug) }
            .map_err(dx12_error("D3D12GetDebugInterface"))?;
        let debug = debug
            .ok_or_else(|| native_error("D3D12GetDebugInterface", "no interface was returned"))?;
        let debug1 = debug.cast::<d3d12::ID3D12Debug1>().ok();
        Ok(Box::new(WindowsDx12Debug { debug, debug1 }))
    }

    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx12FeatureLevel,
    ) -> bool {
        let adapter = match Self::native_adapter(adapter) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::debug!("Could not find adapter {:?}: {}", adapter.desc.description, e);
                return false;
            }
        };

        // A null device pointer only tests for support
        unsafe {
            d3d12::D3D12CreateDevice(
                &adapter,
                d3d_feature_level(feature_level),
                std::ptr::null_mut::<Option<d3d12::ID3D12Device>>(),
            )
        }
        .is_ok()
    }

    fn create_device(
        &self,
        adapter: &DxgiAdapter,
        minimum_feature_level: Dx12FeatureLevel,
    ) -> PrismResult<Box<dyn Dx12NativeDevice>> {
        let native_adapter = Self::native_adapter(adapter)?;

        let mut device: Option<d3d12::ID3D12Device> = None;
        unsafe {
            d3d12::D3D12CreateDevice(
                &native_adapter,
                d3d_feature_level(minimum_feature_level),
                &mut device,
            )
        }
        .map_err(dx12_error("D3D12CreateDevice"))?;
        let device =
            device.ok_or_else(|| native_error("D3D12CreateDevice", "no device was returned"))?;

        let max_feature_level =
            WindowsDx12Device::query_max_feature_level(&device).unwrap_or(minimum_feature_level);

        let queue_desc = d3d12::D3D12_COMMAND_QUEUE_DESC {
            Type: d3d12::D3D12_COMMAND_LIST_TYPE_DIRECT,
            Priority: d3d12::D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: d3d12::D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };

        let (queue, fence, fence_event) = unsafe {
            let queue: d3d12::ID3D12CommandQueue = device
                .CreateCommandQueue(&queue_desc)
                .map_err(dx12_error("CreateCommandQueue"))?;
            let fence: d3d12::ID3D12Fence = device
                .CreateFence(0, d3d12::D3D12_FENCE_FLAGS::default())
                .map_err(dx12_error("CreateFence"))?;
            let fence_event =
                windows::Win32::System::Threading::CreateEventW(None, false, false, None)
                    .map_err(dx12_error("CreateEventW"))?;
            (queue, fence, fence_event)
        };

        // Only present when the debug layer is active
        let info_queue = device.cast::<d3d12::ID3D12InfoQueue>().ok();

        Ok(Box::new(WindowsDx12Device {
            inner: Mutex::new(Some(WindowsDx12DeviceInner {
                device,
                queue,
                fence,
                fence_event,
                info_queue,
            })),
            max_feature_level,
            next_fence_value: AtomicU64::new(1),
            next_resource: AtomicU64::new(1),
            resources: Mutex::new(FnvHashMap::default()),
        }))
    }
}

struct WindowsDx12Debug {
    debug: d3d12::ID3D12Debug,
    debug1: Option<d3d12::ID3D12Debug1>,
}

impl Dx12Debug for WindowsDx12Debug {
    fn enable_debug_layer(&self) {
        unsafe { self.debug.EnableDebugLayer() };
    }

    fn set_enable_gpu_based_validation(
        &self,
        enable: bool,
    ) -> bool {
        match &self.debug1 {
            Some(debug1) => {
                unsafe { debug1.SetEnableGPUBasedValidation(enable) };
                true
            }
            None => false,
        }
    }

    fn set_enable_synchronized_command_queue_validation(
        &self,
        enable: bool,
    ) -> bool {
        match &self.debug1 {
            Some(debug1) => {
                unsafe { debug1.SetEnableSynchronizedCommandQueueValidation(enable) };
                true
            }
            None => false,
        }
    }
}

struct WindowsDx12DeviceInner {
    device: d3d12::ID3D12Device,
    queue: d3d12::ID3D12CommandQueue,
    fence: d3d12::ID3D12Fence,
    fence_event: HANDLE,
    info_queue: Option<d3d12::ID3D12InfoQueue>,
}

impl Drop for WindowsDx12DeviceInner {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.fence_event) };
    }
}

struct WindowsDx12Device {
    // None after release()
    inner: Mutex<Option<WindowsDx12DeviceInner>>,
    max_feature_level: Dx12FeatureLevel,
    next_fence_value: AtomicU64,
    next_resource: AtomicU64,
    resources: Mutex<FnvHashMap<u64, d3d12::ID3D12Resource>>,
}

// D3D12 devices, queues and fences are free threaded
unsafe impl Send for WindowsDx12Device {}
unsafe impl Sync for WindowsDx12Device {}

impl WindowsDx12Device {
    fn query_max_feature_level(device: &d3d12::ID3D12Device) -> PrismResult<Dx12FeatureLevel> {
        let requested: Vec<_> = ALL_FEATURE_LEVELS
            .iter()
            .map(|level| d3d_feature_level(*level))
            .collect();
        let mut data = d3d12::D3D12_FEATURE_DATA_FEATURE_LEVELS {
            NumFeatureLevels: requested.len() as u32,
            pFeatureLevelsRequested: requested.as_ptr(),
            MaxSupportedFeatureLevel: d3d::D3D_FEATURE_LEVEL::default(),
        };
        Self::check_feature_support(device, d3d12::D3D12_FEATURE_FEATURE_LEVELS, &mut data)?;

        dx12_feature_level(data.MaxSupportedFeatureLevel).ok_or_else(|| {
            native_error(
                "CheckFeatureSupport",
                format!(
                    "unexpected feature level {:#x}",
                    data.MaxSupportedFeatureLevel.0
                ),
            )
        })
    }

    fn check_feature_support<T>(
        device: &d3d12::ID3D12Device,
        feature: d3d12::D3D12_FEATURE,
        data: &mut T,
    ) -> PrismResult<()> {
        unsafe {
            device.CheckFeatureSupport(
                feature,
                data as *mut T as *mut c_void,
                std::mem::size_of::<T>() as u32,
            )
        }
        .map_err(dx12_error("CheckFeatureSupport"))
    }

    fn with_device<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&WindowsDx12DeviceInner) -> PrismResult<T>,
    ) -> PrismResult<T> {
        let inner = self.inner.lock().unwrap();
        let inner = inner
            .as_ref()
            .ok_or_else(|| native_error(operation, "the device has been released"))?;
        f(inner)
    }

    fn resource(
        &self,
        resource: PrismNativeHandle,
    ) -> Option<d3d12::ID3D12Resource> {
        self.resources.lock().unwrap().get(&resource.0).cloned()
    }

    unsafe fn read_message(
        info_queue: &d3d12::ID3D12InfoQueue,
        index: u64,
    ) -> Option<Dx12Message> {
        let mut length = 0;
        info_queue.GetMessage(index, None, &mut length).ok()?;

        // D3D12_MESSAGE followed by its description, u64s keep it aligned
        let mut storage = vec![0u64; (length + 7) / 8];
        let message = storage.as_mut_ptr() as *mut d3d12::D3D12_MESSAGE;
        info_queue
            .GetMessage(index, Some(message), &mut length)
            .ok()?;

        let message = &*message;
        let description = if message.pDescription.is_null() {
            String::default()
        } else {
            let bytes = std::slice::from_raw_parts(
                message.pDescription as *const u8,
                message.DescriptionByteLength,
            );
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .to_string()
        };

        Some(Dx12Message {
            severity: validation_severity(message.Severity),
            id: dx12_message_id(message.ID),
            description,
        })
    }
}

impl Dx12NativeDevice for WindowsDx12Device {
    fn max_feature_level(&self) -> Dx12FeatureLevel {
        self.max_feature_level
    }

    fn configure_info_queue(
        &self,
        break_on_severity: &[PrismValidationSeverity],
        deny_list: &[Dx12MessageId],
        break_on_id: &[Dx12MessageId],
    ) -> PrismResult<()> {
        self.with_device("QueryInterface(ID3D12InfoQueue)", |inner| {
            let info_queue = inner.info_queue.as_ref().ok_or_else(|| {
                native_error(
                    "QueryInterface(ID3D12InfoQueue)",
                    "the debug layer is not active",
                )
            })?;

            unsafe {
                for severity in break_on_severity {
                    info_queue
                        .SetBreakOnSeverity(d3d12_severity(*severity), true)
                        .map_err(dx12_error("SetBreakOnSeverity"))?;
                }

                if !deny_list.is_empty() {
                    let mut ids: Vec<_> =
                        deny_list.iter().map(|id| d3d12_message_id(*id)).collect();
                    let mut filter = d3d12::D3D12_INFO_QUEUE_FILTER::default();
                    filter.DenyList.NumIDs = ids.len() as u32;
                    filter.DenyList.pIDList = ids.as_mut_ptr();
                    info_queue
                        .AddStorageFilterEntries(&filter)
                        .map_err(dx12_error("AddStorageFilterEntries"))?;
                }

                for id in break_on_id {
                    info_queue
                        .SetBreakOnID(d3d12_message_id(*id), true)
                        .map_err(dx12_error("SetBreakOnID"))?;
                }
            }

            Ok(())
        })
    }

    fn configure_gpu_based_validation(
        &self,
        default_shader_patch_mode: Dx12ShaderPatchMode,
    ) -> PrismResult<()> {
        self.with_device("SetDebugParameter", |inner| {
            // Only available if the debug layer was enabled before the device was created
            let debug_device = inner
                .device
                .cast::<d3d12::ID3D12DebugDevice1>()
                .map_err(dx12_error("QueryInterface(ID3D12DebugDevice1)"))?;
            let gbv_settings = d3d12::D3D12_DEBUG_DEVICE_GPU_BASED_VALIDATION_SETTINGS {
                MaxMessagesPerCommandList: 0,
                DefaultShaderPatchMode: d3d12_shader_patch_mode(default_shader_patch_mode),
                PipelineStateCreateFlags:
                    d3d12::D3D12_GPU_BASED_VALIDATION_PIPELINE_STATE_CREATE_FLAG_NONE,
            };
            unsafe {
                debug_device.SetDebugParameter(
                    d3d12::D3D12_DEBUG_DEVICE_PARAMETER_GPU_BASED_VALIDATION_SETTINGS,
                    &gbv_settings as *const d3d12::D3D12_DEBUG_DEVICE_GPU_BASED_VALIDATION_SETTINGS
                        as *const c_void,
                    std::mem::size_of::<d3d12::D3D12_DEBUG_DEVICE_GPU_BASED_VALIDATION_SETTINGS>()
                        as u32,
                )
            }
            .map_err(dx12_error("SetDebugParameter"))
        })
    }

    fn take_messages(&self) -> Vec<Dx12Message> {
        let inner = self.inner.lock().unwrap();
        let info_queue = match inner.as_ref().and_then(|inner| inner.info_queue.as_ref()) {
            Some(info_queue) => info_queue,
            None => return Vec::default(),
        };

        unsafe {
            let count = info_queue.GetNumStoredMessages();
            let messages = (0..count)
                .filter_map(|index| Self::read_message(info_queue, index))
                .collect();
            info_queue.ClearStoredMessages();
            messages
        }
    }

    fn check_architecture(&self) -> PrismResult<Dx12Architecture> {
        self.with_device("CheckFeatureSupport", |inner| {
            let mut data = d3d12::D3D12_FEATURE_DATA_ARCHITECTURE::default();
            Self::check_feature_support(
                &inner.device,
                d3d12::D3D12_FEATURE_ARCHITECTURE,
                &mut data,
            )?;
            Ok(Dx12Architecture {
                uma: data.UMA.as_bool(),
                cache_coherent_uma: data.CacheCoherentUMA.as_bool(),
            })
        })
    }

    fn check_options5(&self) -> PrismResult<Dx12Options5> {
        self.with_device("CheckFeatureSupport", |inner| {
            let mut data = d3d12::D3D12_FEATURE_DATA_D3D12_OPTIONS5::default();
            Self::check_feature_support(
                &inner.device,
                d3d12::D3D12_FEATURE_D3D12_OPTIONS5,
                &mut data,
            )?;
            Ok(Dx12Options5 {
                render_pass_tier: data.RenderPassesTier.0 as u32,
                raytracing_tier: data.RaytracingTier.0 as u32,
            })
        })
    }

    fn create_committed_resource(
        &self,
        heap_properties: &Dx12HeapProperties,
        heap_flags: Dx12HeapFlags,
        desc: &Dx12ResourceDesc,
        initial_state: Dx12ResourceStates,
    ) -> PrismResult<PrismNativeHandle> {
        let heap_properties = d3d12_heap_properties(heap_properties);
        let resource_desc = d3d12_resource_desc(desc);

        let resource = self.with_device("CreateCommittedResource", |inner| {
            let mut resource: Option<d3d12::ID3D12Resource> = None;
            unsafe {
                inner.device.CreateCommittedResource(
                    &heap_properties,
                    d3d12::D3D12_HEAP_FLAGS(heap_flags.bits() as _),
                    &resource_desc,
                    d3d12::D3D12_RESOURCE_STATES(initial_state.bits() as _),
                    None,
                    &mut resource,
                )
            }
            .map_err(dx12_error("CreateCommittedResource"))?;
            resource.ok_or_else(|| {
                native_error("CreateCommittedResource", "no resource was returned")
            })
        })?;

        let handle = self.next_resource.fetch_add(1, Ordering::Relaxed);
        self.resources.lock().unwrap().insert(handle, resource);
        Ok(PrismNativeHandle(handle))
    }

    fn set_device_name(
        &self,
        name: &str,
    ) {
        if let Some(inner) = self.inner.lock().unwrap().as_ref() {
            match inner.device.cast::<d3d12::ID3D12Object>() {
                Ok(object) => set_name(&object, name),
                Err(e) => log::debug!("QueryInterface(ID3D12Object) failed: {:?}", e),
            }
        }
    }

    fn set_resource_name(
        &self,
        resource: PrismNativeHandle,
        name: &str,
    ) {
        if let Some(resource) = self.resource(resource) {
            match resource.cast::<d3d12::ID3D12Object>() {
                Ok(object) => set_name(&object, name),
                Err(e) => log::debug!("QueryInterface(ID3D12Object) failed: {:?}", e),
            }
        }
    }

    fn write_resource_data(
        &self,
        resource: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()> {
        let resource = self
            .resource(resource)
            .ok_or_else(|| native_error("Map", format!("unknown resource {:?}", resource)))?;

        let width = unsafe { resource.GetDesc() }.Width;
        if offset + data.len() as u64 > width {
            return Err(native_error(
                "Map",
                format!(
                    "writing {} bytes at offset {} overflows a {} byte resource",
                    data.len(),
                    offset,
                    width
                ),
            ));
        }

        unsafe {
            let mut mapped_ptr: *mut c_void = std::ptr::null_mut();
            resource
                .Map(0, None, Some(&mut mapped_ptr))
                .map_err(dx12_error("Map"))?;
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped_ptr as *mut u8).add(offset as usize),
                data.len(),
            );
            resource.Unmap(0, None);
        }

        Ok(())
    }

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    ) {
        if self.resources.lock().unwrap().remove(&resource.0).is_none() {
            log::warn!("Releasing unknown D3D12 resource {:?}", resource);
        }
    }

    fn wait_idle(&self) -> PrismResult<()> {
        self.with_device("Signal", |inner| {
            let fence_value = self.next_fence_value.fetch_add(1, Ordering::Relaxed);
            unsafe {
                inner
                    .queue
                    .Signal(&inner.fence, fence_value)
                    .map_err(dx12_error("Signal"))?;

                if inner.fence.GetCompletedValue() < fence_value {
                    inner
                        .fence
                        .SetEventOnCompletion(fence_value, inner.fence_event)
                        .map_err(dx12_error("SetEventOnCompletion"))?;
                    windows::Win32::System::Threading::WaitForSingleObject(
                        inner.fence_event,
                        u32::MAX,
                    );
                }
            }

            Ok(())
        })
    }

    fn release(&self) -> u32 {
        // Dropping the device, queue and fence releases them
        self.inner.lock().unwrap().take();

        let mut resources = self.resources.lock().unwrap();
        let outstanding = resources.len() as u32;
        resources.clear();
        outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_map_both_ways() {
        for (named, native) in NAMED_MESSAGE_IDS.iter() {
            assert_eq!(d3d12_message_id(*named), *native);
            assert_eq!(dx12_message_id(*native), *named);
        }
        assert_eq!(
            dx12_message_id(d3d12::D3D12_MESSAGE_ID(3)),
            Dx12MessageId::Other(3)
        );
    }

    #[test]
    fn test_feature_levels_map_both_ways() {
        for level in ALL_FEATURE_LEVELS.iter() {
            assert_eq!(dx12_feature_level(d3d_feature_level(*level)), Some(*level));
        }
        assert_eq!(dx12_feature_level(d3d::D3D_FEATURE_LEVEL_10_0), None);
    }

    #[test]
    fn test_warp_device_resources() {
        let native = WindowsDx12Native::new();
        let warp = native
            .create_dxgi_factory(false)
            .unwrap()
            .enum_warp_adapter()
            .unwrap();
        assert!(native.is_feature_level_supported(&warp, Dx12FeatureLevel::Level11_0));

        let device = native
            .create_device(&warp, Dx12FeatureLevel::Level11_0)
            .unwrap();
        assert!(device.max_feature_level() >= Dx12FeatureLevel::Level11_0);
        device.check_architecture().unwrap();
        device.check_options5().unwrap();
        device.set_device_name("prism test device");

        let buffer = device
            .create_committed_resource(
                &Dx12HeapProperties::new(Dx12HeapType::Upload),
                Dx12HeapFlags::empty(),
                &Dx12ResourceDesc {
                    dimension: Dx12ResourceDimension::Buffer,
                    alignment: 0,
                    width: 256,
                    height: 1,
                    depth_or_array_size: 1,
                    mip_levels: 1,
                    format: crate::dxgi::DxgiFormat::UNKNOWN,
                    sample_count: 1,
                    sample_quality: 0,
                    layout: Dx12TextureLayout::RowMajor,
                    flags: Dx12ResourceFlags::empty(),
                },
                Dx12ResourceStates::GENERIC_READ,
            )
            .unwrap();
        device.set_resource_name(buffer, "constants");
        device.write_resource_data(buffer, 16, &[1, 2, 3, 4]).unwrap();
        assert!(device.write_resource_data(buffer, 254, &[1, 2, 3, 4]).is_err());

        device.wait_idle().unwrap();
        device.release_resource(buffer);
        assert_eq!(device.release(), 0);
        assert!(device.wait_idle().is_err());
    }
}
