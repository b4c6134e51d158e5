//! The D3D11 entry points the backend calls. Values mirror the native enums and flags so that an
//! implementation over the real API is a direct translation.

use crate::dxgi::{DxgiAdapter, DxgiFactory, DxgiFormat};
use crate::{PrismNativeHandle, PrismResult, PrismTextureDimension, PrismValidationSeverity};
use std::sync::Arc;

/// Matches D3D_FEATURE_LEVEL. Ordered from lowest to highest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dx11FeatureLevel {
    Level10_0,
    Level10_1,
    Level11_0,
    Level11_1,
}

impl Dx11FeatureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Dx11FeatureLevel::Level10_0 => "10_0",
            Dx11FeatureLevel::Level10_1 => "10_1",
            Dx11FeatureLevel::Level11_0 => "11_0",
            Dx11FeatureLevel::Level11_1 => "11_1",
        }
    }
}

/// Feature levels passed to D3D11CreateDevice, highest first
pub const DX11_FEATURE_LEVELS: [Dx11FeatureLevel; 4] = [
    Dx11FeatureLevel::Level11_1,
    Dx11FeatureLevel::Level11_0,
    Dx11FeatureLevel::Level10_1,
    Dx11FeatureLevel::Level10_0,
];

/// Matches D3D_DRIVER_TYPE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx11DriverType {
    /// Use the given adapter (D3D_DRIVER_TYPE_UNKNOWN with an explicit adapter)
    Hardware,
    Warp,
}

bitflags::bitflags! {
    /// Matches D3D11_CREATE_DEVICE_FLAG
    pub struct Dx11CreateDeviceFlags: u32 {
        const SINGLETHREADED = 0x1;
        const DEBUG = 0x2;
        const BGRA_SUPPORT = 0x20;
    }
}

/// Matches D3D11_USAGE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx11Usage {
    Default,
    Immutable,
    Dynamic,
    Staging,
}

bitflags::bitflags! {
    /// Matches D3D11_BIND_FLAG
    pub struct Dx11BindFlags: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
        const UNORDERED_ACCESS = 0x80;
    }
}

bitflags::bitflags! {
    /// Matches D3D11_CPU_ACCESS_FLAG
    pub struct Dx11CpuAccessFlags: u32 {
        const WRITE = 0x10000;
        const READ = 0x20000;
    }
}

bitflags::bitflags! {
    /// Matches D3D11_RESOURCE_MISC_FLAG
    pub struct Dx11ResourceMiscFlags: u32 {
        const SHARED = 0x2;
        const TEXTURECUBE = 0x4;
        const DRAWINDIRECT_ARGS = 0x10;
        const BUFFER_ALLOW_RAW_VIEWS = 0x20;
        const BUFFER_STRUCTURED = 0x40;
        const SHARED_KEYEDMUTEX = 0x100;
        const SHARED_NTHANDLE = 0x800;
    }
}

/// Matches D3D11_BUFFER_DESC
#[derive(Clone, Debug, PartialEq)]
pub struct Dx11BufferDesc {
    pub byte_width: u32,
    pub usage: Dx11Usage,
    pub bind_flags: Dx11BindFlags,
    pub cpu_access_flags: Dx11CpuAccessFlags,
    pub misc_flags: Dx11ResourceMiscFlags,
    pub structure_byte_stride: u32,
}

/// Union of D3D11_TEXTURE1D_DESC, D3D11_TEXTURE2D_DESC and D3D11_TEXTURE3D_DESC, selected by
/// `dimension`
#[derive(Clone, Debug, PartialEq)]
pub struct Dx11TextureDesc {
    pub dimension: PrismTextureDimension,
    pub width: u32,
    pub height: u32,
    /// Only used by 3D textures
    pub depth: u32,
    pub mip_levels: u32,
    /// Not used by 3D textures
    pub array_size: u32,
    pub format: DxgiFormat,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub usage: Dx11Usage,
    pub bind_flags: Dx11BindFlags,
    pub cpu_access_flags: Dx11CpuAccessFlags,
    pub misc_flags: Dx11ResourceMiscFlags,
}

/// D3D11_MESSAGE_ID values the backend refers to by name
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dx11MessageId {
    SetPrivateDataChangingParams,
    Other(i32),
}

/// A message read from ID3D11InfoQueue
#[derive(Clone, Debug, PartialEq)]
pub struct Dx11Message {
    pub severity: PrismValidationSeverity,
    pub id: Dx11MessageId,
    pub description: String,
}

/// Result of D3D11CreateDevice
pub struct Dx11CreatedDevice {
    pub device: Box<dyn Dx11NativeDevice>,
    pub feature_level: Dx11FeatureLevel,
    /// The adapter the device was created on. For WARP devices this is the WARP adapter.
    pub adapter: DxgiAdapter,
}

/// Entry points of d3d11.dll and dxgi.dll
pub trait Dx11Native: Send + Sync {
    /// CreateDXGIFactory2, with DXGI_CREATE_FACTORY_DEBUG if `debug` is set
    fn create_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>>;

    /// Whether the D3D11 SDK layers are installed. D3D11CreateDevice fails with the DEBUG flag if
    /// they are not.
    fn sdk_layers_available(&self) -> bool;

    /// Calls D3D11CreateDevice without creating a device to test if the adapter supports the
    /// feature level
    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx11FeatureLevel,
        flags: Dx11CreateDeviceFlags,
    ) -> bool;

    /// D3D11CreateDevice. `adapter` must be set for `Dx11DriverType::Hardware` and is ignored for
    /// WARP.
    fn create_device(
        &self,
        adapter: Option<&DxgiAdapter>,
        driver_type: Dx11DriverType,
        flags: Dx11CreateDeviceFlags,
        feature_levels: &[Dx11FeatureLevel],
    ) -> PrismResult<Dx11CreatedDevice>;
}

/// ID3D11Device and its immediate context
pub trait Dx11NativeDevice: Send + Sync {
    /// Configures ID3D11InfoQueue. Fails if the debug layer is not active.
    fn configure_info_queue(
        &self,
        break_on_severity: &[PrismValidationSeverity],
        deny_list: &[Dx11MessageId],
    ) -> PrismResult<()>;

    /// Drains the messages stored in the info queue
    fn take_messages(&self) -> Vec<Dx11Message>;

    fn create_buffer(
        &self,
        desc: &Dx11BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismNativeHandle>;

    fn create_texture(
        &self,
        desc: &Dx11TextureDesc,
    ) -> PrismResult<PrismNativeHandle>;

    /// SetPrivateData(WKPDID_D3DDebugObjectName) on the device
    fn set_device_name(
        &self,
        name: &str,
    );

    /// SetPrivateData(WKPDID_D3DDebugObjectName) on a resource
    fn set_resource_name(
        &self,
        resource: PrismNativeHandle,
        name: &str,
    );

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    );

    /// Flushes the immediate context and blocks until the GPU has finished all submitted work
    fn wait_idle(&self) -> PrismResult<()>;

    /// Releases the device and immediate context. Returns the number of references still held on
    /// the device by other native objects.
    fn release(&self) -> u32;
}
