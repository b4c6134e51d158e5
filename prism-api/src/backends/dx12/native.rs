//! The D3D12 entry points the backend calls. Values mirror the native enums and flags so that an
//! implementation over the real API is a direct translation.

use crate::dxgi::{DxgiAdapter, DxgiFactory, DxgiFormat};
use crate::{PrismNativeHandle, PrismResult, PrismValidationSeverity};
use std::sync::Arc;

/// Matches D3D_FEATURE_LEVEL. Ordered from lowest to highest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dx12FeatureLevel {
    Level11_0,
    Level11_1,
    Level12_0,
    Level12_1,
    Level12_2,
}

impl Dx12FeatureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Dx12FeatureLevel::Level11_0 => "11_0",
            Dx12FeatureLevel::Level11_1 => "11_1",
            Dx12FeatureLevel::Level12_0 => "12_0",
            Dx12FeatureLevel::Level12_1 => "12_1",
            Dx12FeatureLevel::Level12_2 => "12_2",
        }
    }
}

/// Matches D3D12_HEAP_TYPE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12HeapType {
    Default,
    Upload,
    Readback,
    Custom,
}

/// Matches D3D12_CPU_PAGE_PROPERTY
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12CpuPageProperty {
    Unknown,
    NotAvailable,
    WriteCombine,
    WriteBack,
}

/// Matches D3D12_MEMORY_POOL
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12MemoryPool {
    Unknown,
    L0,
    L1,
}

/// Matches D3D12_HEAP_PROPERTIES for a single-node adapter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dx12HeapProperties {
    pub heap_type: Dx12HeapType,
    pub cpu_page_property: Dx12CpuPageProperty,
    pub memory_pool: Dx12MemoryPool,
}

impl Dx12HeapProperties {
    pub fn new(heap_type: Dx12HeapType) -> Self {
        Dx12HeapProperties {
            heap_type,
            cpu_page_property: Dx12CpuPageProperty::Unknown,
            memory_pool: Dx12MemoryPool::Unknown,
        }
    }

    pub fn custom(
        cpu_page_property: Dx12CpuPageProperty,
        memory_pool: Dx12MemoryPool,
    ) -> Self {
        Dx12HeapProperties {
            heap_type: Dx12HeapType::Custom,
            cpu_page_property,
            memory_pool,
        }
    }
}

bitflags::bitflags! {
    /// Matches D3D12_HEAP_FLAGS
    pub struct Dx12HeapFlags: u32 {
        const SHARED = 0x1;
        const DENY_BUFFERS = 0x4;
        const ALLOW_DISPLAY = 0x8;
        const SHARED_CROSS_ADAPTER = 0x20;
    }
}

bitflags::bitflags! {
    /// Matches D3D12_RESOURCE_FLAGS
    pub struct Dx12ResourceFlags: u32 {
        const ALLOW_RENDER_TARGET = 0x1;
        const ALLOW_DEPTH_STENCIL = 0x2;
        const ALLOW_UNORDERED_ACCESS = 0x4;
        const DENY_SHADER_RESOURCE = 0x8;
        const ALLOW_CROSS_ADAPTER = 0x10;
        const ALLOW_SIMULTANEOUS_ACCESS = 0x20;
    }
}

bitflags::bitflags! {
    /// Matches D3D12_RESOURCE_STATES
    pub struct Dx12ResourceStates: u32 {
        const COMMON = 0x0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits
            | Self::INDEX_BUFFER.bits
            | Self::NON_PIXEL_SHADER_RESOURCE.bits
            | Self::PIXEL_SHADER_RESOURCE.bits
            | Self::INDIRECT_ARGUMENT.bits
            | Self::COPY_SOURCE.bits;
    }
}

/// Matches D3D12_RESOURCE_DIMENSION
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12ResourceDimension {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
}

/// Matches D3D12_TEXTURE_LAYOUT
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12TextureLayout {
    Unknown,
    RowMajor,
}

/// Matches D3D12_RESOURCE_DESC
#[derive(Clone, Debug, PartialEq)]
pub struct Dx12ResourceDesc {
    pub dimension: Dx12ResourceDimension,
    pub alignment: u64,
    pub width: u64,
    pub height: u32,
    pub depth_or_array_size: u16,
    pub mip_levels: u16,
    pub format: DxgiFormat,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub layout: Dx12TextureLayout,
    pub flags: Dx12ResourceFlags,
}

/// Matches D3D12_GPU_BASED_VALIDATION_SHADER_PATCH_MODE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12ShaderPatchMode {
    None,
    StateTrackingOnly,
    UnguardedValidation,
    GuardedValidation,
}

/// D3D12_MESSAGE_ID values the backend refers to by name
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx12MessageId {
    ClearRenderTargetViewMismatchingClearValue,
    ClearDepthStencilViewMismatchingClearValue,
    MapInvalidNullRange,
    UnmapInvalidNullRange,
    ExecuteCommandListsWrongSwapChainBufferReference,
    ResourceBarrierMismatchingCommandListType,
    DeviceRemovalProcessAtFault,
    Other(i32),
}

/// A message read from ID3D12InfoQueue
#[derive(Clone, Debug, PartialEq)]
pub struct Dx12Message {
    pub severity: PrismValidationSeverity,
    pub id: Dx12MessageId,
    pub description: String,
}

/// D3D12_FEATURE_DATA_ARCHITECTURE
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Dx12Architecture {
    pub uma: bool,
    pub cache_coherent_uma: bool,
}

/// The parts of D3D12_FEATURE_DATA_D3D12_OPTIONS5 the backend uses
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Dx12Options5 {
    /// D3D12_RENDER_PASS_TIER, 0 when render passes are emulated
    pub render_pass_tier: u32,
    /// D3D12_RAYTRACING_TIER, 10 for tier 1.0
    pub raytracing_tier: u32,
}

/// D3D12_RAYTRACING_TIER_1_0
pub const DX12_RAYTRACING_TIER_1_0: u32 = 10;

/// ID3D12Debug, ID3D12Debug1 and ID3D12Debug3
pub trait Dx12Debug {
    fn enable_debug_layer(&self);

    /// Returns false if ID3D12Debug1 is not available
    fn set_enable_gpu_based_validation(
        &self,
        enable: bool,
    ) -> bool;

    /// Returns false if ID3D12Debug1 is not available
    fn set_enable_synchronized_command_queue_validation(
        &self,
        enable: bool,
    ) -> bool;
}

/// Entry points of d3d12.dll and dxgi.dll
pub trait Dx12Native: Send + Sync {
    /// Whether the running OS build can host D3D12
    fn meets_os_requirements(&self) -> bool;

    /// CreateDXGIFactory2, with DXGI_CREATE_FACTORY_DEBUG if `debug` is set
    fn create_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>>;

    /// D3D12GetDebugInterface. Fails if the graphics tools are not installed.
    fn get_debug_interface(&self) -> PrismResult<Box<dyn Dx12Debug>>;

    /// Calls D3D12CreateDevice without creating a device to test if the adapter supports the
    /// feature level
    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx12FeatureLevel,
    ) -> bool;

    /// D3D12CreateDevice. The device also owns a direct queue and a fence used for `wait_idle`.
    fn create_device(
        &self,
        adapter: &DxgiAdapter,
        minimum_feature_level: Dx12FeatureLevel,
    ) -> PrismResult<Box<dyn Dx12NativeDevice>>;
}

/// ID3D12Device with the queue and fence used to wait for idle
pub trait Dx12NativeDevice: Send + Sync {
    /// Highest feature level supported by the device
    fn max_feature_level(&self) -> Dx12FeatureLevel;

    /// Configures ID3D12InfoQueue. Fails if the debug layer is not active.
    fn configure_info_queue(
        &self,
        break_on_severity: &[PrismValidationSeverity],
        deny_list: &[Dx12MessageId],
        break_on_id: &[Dx12MessageId],
    ) -> PrismResult<()>;

    /// ID3D12DebugDevice1::SetDebugParameter(GPU_BASED_VALIDATION_SETTINGS)
    fn configure_gpu_based_validation(
        &self,
        default_shader_patch_mode: Dx12ShaderPatchMode,
    ) -> PrismResult<()>;

    /// Drains the messages stored in the info queue
    fn take_messages(&self) -> Vec<Dx12Message>;

    /// CheckFeatureSupport(D3D12_FEATURE_ARCHITECTURE)
    fn check_architecture(&self) -> PrismResult<Dx12Architecture>;

    /// CheckFeatureSupport(D3D12_FEATURE_D3D12_OPTIONS5)
    fn check_options5(&self) -> PrismResult<Dx12Options5>;

    fn create_committed_resource(
        &self,
        heap_properties: &Dx12HeapProperties,
        heap_flags: Dx12HeapFlags,
        desc: &Dx12ResourceDesc,
        initial_state: Dx12ResourceStates,
    ) -> PrismResult<PrismNativeHandle>;

    /// ID3D12Object::SetName on the device
    fn set_device_name(
        &self,
        name: &str,
    );

    /// ID3D12Object::SetName on a resource
    fn set_resource_name(
        &self,
        resource: PrismNativeHandle,
        name: &str,
    );

    /// Map, copy and Unmap on a resource in an upload heap
    fn write_resource_data(
        &self,
        resource: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()>;

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    );

    /// Signals the fence on the direct queue and blocks until the GPU reaches it
    fn wait_idle(&self) -> PrismResult<()>;

    /// Releases the device, queue and fence. Returns the number of references still held on the
    /// device by other native objects.
    fn release(&self) -> u32;
}
