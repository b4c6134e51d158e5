//! `Dx11Native` over d3d11.dll, through the `windows` crate

use super::native::*;
use crate::dxgi::{windows_error, DxgiAdapter, DxgiFactory, WindowsDxgiFactory};
use crate::{
    PrismBackendType, PrismError, PrismNativeError, PrismNativeHandle, PrismResult,
    PrismTextureDimension, PrismValidationSeverity,
};
use fnv::FnvHashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use windows::core::Interface;
use windows::Win32::Foundation::{BOOL, HINSTANCE};
use windows::Win32::Graphics::Direct3D as d3d;
use windows::Win32::Graphics::Direct3D11 as d3d11;
use windows::Win32::Graphics::Dxgi as dxgi;
use windows::Win32::Graphics::Dxgi::Common as dxgi_common;

fn dx11_error(operation: &'static str) -> impl FnOnce(windows::core::Error) -> PrismError {
    windows_error(Some(PrismBackendType::Dx11), operation)
}

fn native_error(
    operation: &'static str,
    message: impl Into<String>,
) -> PrismError {
    PrismNativeError::new(Some(PrismBackendType::Dx11), operation, 0, message).into()
}

fn d3d_feature_level(feature_level: Dx11FeatureLevel) -> d3d::D3D_FEATURE_LEVEL {
    match feature_level {
        Dx11FeatureLevel::Level10_0 => d3d::D3D_FEATURE_LEVEL_10_0,
        Dx11FeatureLevel::Level10_1 => d3d::D3D_FEATURE_LEVEL_10_1,
        Dx11FeatureLevel::Level11_0 => d3d::D3D_FEATURE_LEVEL_11_0,
        Dx11FeatureLevel::Level11_1 => d3d::D3D_FEATURE_LEVEL_11_1,
    }
}

fn dx11_feature_level(feature_level: d3d::D3D_FEATURE_LEVEL) -> Option<Dx11FeatureLevel> {
    DX11_FEATURE_LEVELS
        .iter()
        .copied()
        .find(|level| d3d_feature_level(*level) == feature_level)
}

fn d3d11_usage(usage: Dx11Usage) -> d3d11::D3D11_USAGE {
    match usage {
        Dx11Usage::Default => d3d11::D3D11_USAGE_DEFAULT,
        Dx11Usage::Immutable => d3d11::D3D11_USAGE_IMMUTABLE,
        Dx11Usage::Dynamic => d3d11::D3D11_USAGE_DYNAMIC,
        Dx11Usage::Staging => d3d11::D3D11_USAGE_STAGING,
    }
}

fn d3d11_severity(severity: PrismValidationSeverity) -> d3d11::D3D11_MESSAGE_SEVERITY {
    match severity {
        PrismValidationSeverity::Corruption => d3d11::D3D11_MESSAGE_SEVERITY_CORRUPTION,
        PrismValidationSeverity::Error => d3d11::D3D11_MESSAGE_SEVERITY_ERROR,
        PrismValidationSeverity::Warning => d3d11::D3D11_MESSAGE_SEVERITY_WARNING,
        PrismValidationSeverity::Info => d3d11::D3D11_MESSAGE_SEVERITY_INFO,
        PrismValidationSeverity::Message => d3d11::D3D11_MESSAGE_SEVERITY_MESSAGE,
    }
}

fn validation_severity(severity: d3d11::D3D11_MESSAGE_SEVERITY) -> PrismValidationSeverity {
    [
        PrismValidationSeverity::Corruption,
        PrismValidationSeverity::Error,
        PrismValidationSeverity::Warning,
        PrismValidationSeverity::Info,
    ]
    .iter()
    .copied()
    .find(|candidate| d3d11_severity(*candidate) == severity)
    .unwrap_or(PrismValidationSeverity::Message)
}

fn d3d11_message_id(id: Dx11MessageId) -> d3d11::D3D11_MESSAGE_ID {
    match id {
        Dx11MessageId::SetPrivateDataChangingParams => {
            d3d11::D3D11_MESSAGE_ID_SETPRIVATEDATA_CHANGINGPARAMS
        }
        Dx11MessageId::Other(id) => d3d11::D3D11_MESSAGE_ID(id as _),
    }
}

fn dx11_message_id(id: d3d11::D3D11_MESSAGE_ID) -> Dx11MessageId {
    if id == d3d11::D3D11_MESSAGE_ID_SETPRIVATEDATA_CHANGINGPARAMS {
        Dx11MessageId::SetPrivateDataChangingParams
    } else {
        Dx11MessageId::Other(id.0 as i32)
    }
}

/// Calls D3D11CreateDevice. Leaving all the outputs `None` only tests whether the device could be
/// created.
unsafe fn create_device(
    adapter: Option<&dxgi::IDXGIAdapter>,
    driver_type: d3d::D3D_DRIVER_TYPE,
    flags: Dx11CreateDeviceFlags,
    feature_levels: Option<&[d3d::D3D_FEATURE_LEVEL]>,
    device: Option<*mut Option<d3d11::ID3D11Device>>,
    feature_level: Option<*mut d3d::D3D_FEATURE_LEVEL>,
    immediate_context: Option<*mut Option<d3d11::ID3D11DeviceContext>>,
) -> windows::core::Result<()> {
    d3d11::D3D11CreateDevice(
        adapter,
        driver_type,
        HINSTANCE::default(),
        d3d11::D3D11_CREATE_DEVICE_FLAG(flags.bits() as _),
        feature_levels,
        d3d11::D3D11_SDK_VERSION,
        device,
        feature_level,
        immediate_context,
    )
}

/// The system D3D11 runtime
#[derive(Default)]
pub struct WindowsDx11Native;

impl WindowsDx11Native {
    pub fn new() -> Self {
        WindowsDx11Native
    }

    fn native_adapter(adapter: &DxgiAdapter) -> PrismResult<dxgi::IDXGIAdapter> {
        WindowsDxgiFactory::new(false)?
            .native_adapter(adapter)?
            .cast::<dxgi::IDXGIAdapter>()
            .map_err(dx11_error("QueryInterface(IDXGIAdapter)"))
    }
}

impl Dx11Native for WindowsDx11Native {
    fn create_dxgi_factory(
        &self,
        debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        Ok(Arc::new(WindowsDxgiFactory::new(debug)?))
    }

    fn sdk_layers_available(&self) -> bool {
        // A null device is enough to see if the debug layer loads
        unsafe {
            create_device(
                None,
                d3d::D3D_DRIVER_TYPE_NULL,
                Dx11CreateDeviceFlags::DEBUG,
                None,
                None,
                None,
                None,
            )
        }
        .is_ok()
    }

    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx11FeatureLevel,
        flags: Dx11CreateDeviceFlags,
    ) -> bool {
        let adapter = match Self::native_adapter(adapter) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::debug!("Could not find adapter {:?}: {}", adapter.desc.description, e);
                return false;
            }
        };

        unsafe {
            create_device(
                Some(&adapter),
                d3d::D3D_DRIVER_TYPE_UNKNOWN,
                flags,
                Some(&[d3d_feature_level(feature_level)]),
                None,
                None,
                None,
            )
        }
        .is_ok()
    }

    fn create_device(
        &self,
        adapter: Option<&DxgiAdapter>,
        driver_type: Dx11DriverType,
        flags: Dx11CreateDeviceFlags,
        feature_levels: &[Dx11FeatureLevel],
    ) -> PrismResult<Dx11CreatedDevice> {
        let (native_adapter, d3d_driver_type, adapter) = match driver_type {
            Dx11DriverType::Hardware => {
                let adapter = adapter.ok_or_else(|| {
                    native_error("D3D11CreateDevice", "hardware devices need an adapter")
                })?;
                (
                    Some(Self::native_adapter(adapter)?),
                    d3d::D3D_DRIVER_TYPE_UNKNOWN,
                    adapter.clone(),
                )
            }
            Dx11DriverType::Warp => (
                None,
                d3d::D3D_DRIVER_TYPE_WARP,
                WindowsDxgiFactory::new(false)?.enum_warp_adapter()?,
            ),
        };

        let d3d_feature_levels: Vec<_> = feature_levels
            .iter()
            .map(|level| d3d_feature_level(*level))
            .collect();

        let mut device = None;
        let mut immediate_context = None;
        let mut feature_level = d3d::D3D_FEATURE_LEVEL::default();
        unsafe {
            create_device(
                native_adapter.as_ref(),
                d3d_driver_type,
                flags,
                Some(&d3d_feature_levels),
                Some(&mut device),
                Some(&mut feature_level),
                Some(&mut immediate_context),
            )
        }
        .map_err(dx11_error("D3D11CreateDevice"))?;

        let device: d3d11::ID3D11Device =
            device.ok_or_else(|| native_error("D3D11CreateDevice", "no device was returned"))?;
        let immediate_context = immediate_context
            .ok_or_else(|| native_error("D3D11CreateDevice", "no context was returned"))?;
        let feature_level = dx11_feature_level(feature_level).ok_or_else(|| {
            native_error(
                "D3D11CreateDevice",
                format!("unexpected feature level {:#x}", feature_level.0),
            )
        })?;

        // Only present when the debug layer is active
        let info_queue = device.cast::<d3d11::ID3D11InfoQueue>().ok();

        Ok(Dx11CreatedDevice {
            device: Box::new(WindowsDx11Device {
                device,
                immediate_context: Mutex::new(Some(immediate_context)),
                info_queue,
                next_resource: AtomicU64::new(1),
                resources: Mutex::new(FnvHashMap::default()),
            }),
            feature_level,
            adapter,
        })
    }
}

struct WindowsDx11Device {
    device: d3d11::ID3D11Device,
    // The immediate context is not thread safe
    immediate_context: Mutex<Option<d3d11::ID3D11DeviceContext>>,
    info_queue: Option<d3d11::ID3D11InfoQueue>,
    next_resource: AtomicU64,
    resources: Mutex<FnvHashMap<u64, d3d11::ID3D11Resource>>,
}

// ID3D11Device is free threaded and the immediate context is behind a mutex
unsafe impl Send for WindowsDx11Device {}
unsafe impl Sync for WindowsDx11Device {}

impl WindowsDx11Device {
    fn insert_resource(
        &self,
        resource: d3d11::ID3D11Resource,
    ) -> PrismNativeHandle {
        let handle = self.next_resource.fetch_add(1, Ordering::Relaxed);
        self.resources.lock().unwrap().insert(handle, resource);
        PrismNativeHandle(handle)
    }

    fn info_queue(&self) -> PrismResult<&d3d11::ID3D11InfoQueue> {
        self.info_queue.as_ref().ok_or_else(|| {
            native_error(
                "QueryInterface(ID3D11InfoQueue)",
                "the debug layer is not active",
            )
        })
    }

    unsafe fn read_message(
        info_queue: &d3d11::ID3D11InfoQueue,
        index: u64,
    ) -> Option<Dx11Message> {
        let mut length = 0;
        info_queue.GetMessage(index, None, &mut length).ok()?;

        // D3D11_MESSAGE followed by its description, u64s keep it aligned
        let mut storage = vec![0u64; (length + 7) / 8];
        let message = storage.as_mut_ptr() as *mut d3d11::D3D11_MESSAGE;
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

        Some(Dx11Message {
            severity: validation_severity(message.Severity),
            id: dx11_message_id(message.ID),
            description,
        })
    }

    fn set_name(
        object: &d3d11::ID3D11DeviceChild,
        name: &str,
    ) {
        let result = unsafe {
            object.SetPrivateData(
                &d3d::WKPDID_D3DDebugObjectName,
                name.len() as u32,
                Some(name.as_ptr() as *const c_void),
            )
        };

        if let Err(e) = result {
            log::debug!("SetPrivateData(WKPDID_D3DDebugObjectName) failed: {:?}", e);
        }
    }
}

impl Dx11NativeDevice for WindowsDx11Device {
    fn configure_info_queue(
        &self,
        break_on_severity: &[PrismValidationSeverity],
        deny_list: &[Dx11MessageId],
    ) -> PrismResult<()> {
        let info_queue = self.info_queue()?;

        unsafe {
            for severity in break_on_severity {
                info_queue
                    .SetBreakOnSeverity(d3d11_severity(*severity), true)
                    .map_err(dx11_error("SetBreakOnSeverity"))?;
            }

            if !deny_list.is_empty() {
                let mut ids: Vec<_> = deny_list.iter().map(|id| d3d11_message_id(*id)).collect();
                let mut filter = d3d11::D3D11_INFO_QUEUE_FILTER::default();
                filter.DenyList.NumIDs = ids.len() as u32;
                filter.DenyList.pIDList = ids.as_mut_ptr();
                info_queue
                    .AddStorageFilterEntries(&filter)
                    .map_err(dx11_error("AddStorageFilterEntries"))?;
            }
        }

        Ok(())
    }

    fn take_messages(&self) -> Vec<Dx11Message> {
        let info_queue = match &self.info_queue {
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

    fn create_buffer(
        &self,
        desc: &Dx11BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismNativeHandle> {
        let buffer_desc = d3d11::D3D11_BUFFER_DESC {
            ByteWidth: desc.byte_width,
            Usage: d3d11_usage(desc.usage),
            BindFlags: d3d11::D3D11_BIND_FLAG(desc.bind_flags.bits() as _),
            CPUAccessFlags: d3d11::D3D11_CPU_ACCESS_FLAG(desc.cpu_access_flags.bits() as _),
            MiscFlags: d3d11::D3D11_RESOURCE_MISC_FLAG(desc.misc_flags.bits() as _),
            StructureByteStride: desc.structure_byte_stride,
        };

        // The runtime reads ByteWidth bytes of initial data
        let padded;
        let initial_data = match initial_data {
            Some(data) if data.len() < desc.byte_width as usize => {
                let mut copy = data.to_vec();
                copy.resize(desc.byte_width as usize, 0);
                padded = copy;
                Some(padded.as_slice())
            }
            other => other,
        };
        let subresource_data = initial_data.map(|data| d3d11::D3D11_SUBRESOURCE_DATA {
            pSysMem: data.as_ptr() as *const c_void,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        });

        let mut buffer: Option<d3d11::ID3D11Buffer> = None;
        unsafe {
            self.device.CreateBuffer(
                &buffer_desc,
                subresource_data
                    .as_ref()
                    .map(|data| data as *const d3d11::D3D11_SUBRESOURCE_DATA),
                Some(&mut buffer),
            )
        }
        .map_err(dx11_error("CreateBuffer"))?;

        let resource = buffer
            .ok_or_else(|| native_error("CreateBuffer", "no buffer was returned"))?
            .cast::<d3d11::ID3D11Resource>()
            .map_err(dx11_error("QueryInterface(ID3D11Resource)"))?;
        Ok(self.insert_resource(resource))
    }

    fn create_texture(
        &self,
        desc: &Dx11TextureDesc,
    ) -> PrismResult<PrismNativeHandle> {
        let format = dxgi_common::DXGI_FORMAT(desc.format.0 as _);
        let usage = d3d11_usage(desc.usage);
        let bind_flags = d3d11::D3D11_BIND_FLAG(desc.bind_flags.bits() as _);
        let cpu_access_flags = d3d11::D3D11_CPU_ACCESS_FLAG(desc.cpu_access_flags.bits() as _);
        let misc_flags = d3d11::D3D11_RESOURCE_MISC_FLAG(desc.misc_flags.bits() as _);

        let resource = unsafe {
            match desc.dimension {
                PrismTextureDimension::Dim1D => {
                    let texture_desc = d3d11::D3D11_TEXTURE1D_DESC {
                        Width: desc.width,
                        MipLevels: desc.mip_levels,
                        ArraySize: desc.array_size,
                        Format: format,
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: misc_flags,
                    };
                    let mut texture: Option<d3d11::ID3D11Texture1D> = None;
                    self.device
                        .CreateTexture1D(&texture_desc, None, Some(&mut texture))
                        .map_err(dx11_error("CreateTexture1D"))?;
                    texture.map(|texture| texture.cast::<d3d11::ID3D11Resource>())
                }
                PrismTextureDimension::Dim2D => {
                    let texture_desc = d3d11::D3D11_TEXTURE2D_DESC {
                        Width: desc.width,
                        Height: desc.height,
                        MipLevels: desc.mip_levels,
                        ArraySize: desc.array_size,
                        Format: format,
                        SampleDesc: dxgi_common::DXGI_SAMPLE_DESC {
                            Count: desc.sample_count,
                            Quality: desc.sample_quality,
                        },
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: misc_flags,
                    };
                    let mut texture: Option<d3d11::ID3D11Texture2D> = None;
                    self.device
                        .CreateTexture2D(&texture_desc, None, Some(&mut texture))
                        .map_err(dx11_error("CreateTexture2D"))?;
                    texture.map(|texture| texture.cast::<d3d11::ID3D11Resource>())
                }
                PrismTextureDimension::Dim3D => {
                    let texture_desc = d3d11::D3D11_TEXTURE3D_DESC {
                        Width: desc.width,
                        Height: desc.height,
                        Depth: desc.depth,
                        MipLevels: desc.mip_levels,
                        Format: format,
                        Usage: usage,
                        BindFlags: bind_flags,
                        CPUAccessFlags: cpu_access_flags,
                        MiscFlags: misc_flags,
                    };
                    let mut texture: Option<d3d11::ID3D11Texture3D> = None;
                    self.device
                        .CreateTexture3D(&texture_desc, None, Some(&mut texture))
                        .map_err(dx11_error("CreateTexture3D"))?;
                    texture.map(|texture| texture.cast::<d3d11::ID3D11Resource>())
                }
            }
        };

        let resource = resource
            .ok_or_else(|| native_error("CreateTexture", "no texture was returned"))?
            .map_err(dx11_error("QueryInterface(ID3D11Resource)"))?;
        Ok(self.insert_resource(resource))
    }

    fn set_device_name(
        &self,
        name: &str,
    ) {
        let result = unsafe {
            self.device.SetPrivateData(
                &d3d::WKPDID_D3DDebugObjectName,
                name.len() as u32,
                Some(name.as_ptr() as *const c_void),
            )
        };

        if let Err(e) = result {
            log::debug!("SetPrivateData(WKPDID_D3DDebugObjectName) failed: {:?}", e);
        }
    }

    fn set_resource_name(
        &self,
        resource: PrismNativeHandle,
        name: &str,
    ) {
        let resources = self.resources.lock().unwrap();
        if let Some(resource) = resources.get(&resource.0) {
            match resource.cast::<d3d11::ID3D11DeviceChild>() {
                Ok(device_child) => Self::set_name(&device_child, name),
                Err(e) => log::debug!("QueryInterface(ID3D11DeviceChild) failed: {:?}", e),
            }
        }
    }

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    ) {
        if self.resources.lock().unwrap().remove(&resource.0).is_none() {
            log::warn!("Releasing unknown D3D11 resource {:?}", resource);
        }
    }

    fn wait_idle(&self) -> PrismResult<()> {
        let immediate_context = self.immediate_context.lock().unwrap();
        let immediate_context = immediate_context
            .as_ref()
            .ok_or_else(|| native_error("Flush", "the device has been released"))?;

        let query_desc = d3d11::D3D11_QUERY_DESC {
            Query: d3d11::D3D11_QUERY_EVENT,
            ..Default::default()
        };

        unsafe {
            let mut query: Option<d3d11::ID3D11Query> = None;
            self.device
                .CreateQuery(&query_desc, Some(&mut query))
                .map_err(dx11_error("CreateQuery"))?;
            let query = query
                .ok_or_else(|| native_error("CreateQuery", "no query was returned"))?
                .cast::<d3d11::ID3D11Asynchronous>()
                .map_err(dx11_error("QueryInterface(ID3D11Asynchronous)"))?;

            immediate_context.End(&query);
            immediate_context.Flush();

            // The event query reports TRUE once the GPU has passed it
            let mut done = BOOL::default();
            while !done.as_bool() {
                immediate_context
                    .GetData(
                        &query,
                        Some(&mut done as *mut BOOL as *mut c_void),
                        std::mem::size_of::<BOOL>() as u32,
                        0,
                    )
                    .map_err(dx11_error("GetData"))?;
                if !done.as_bool() {
                    std::thread::yield_now();
                }
            }
        }

        Ok(())
    }

    fn release(&self) -> u32 {
        if let Some(immediate_context) = self.immediate_context.lock().unwrap().take() {
            unsafe { immediate_context.ClearState() };
        }

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
        let named = Dx11MessageId::SetPrivateDataChangingParams;
        assert_eq!(dx11_message_id(d3d11_message_id(named)), named);
        assert_eq!(
            dx11_message_id(d3d11::D3D11_MESSAGE_ID(7 as _)),
            Dx11MessageId::Other(7)
        );
        assert_eq!(
            validation_severity(d3d11::D3D11_MESSAGE_SEVERITY_MESSAGE),
            PrismValidationSeverity::Message
        );
    }

    #[test]
    fn test_warp_device_resources() {
        let native = WindowsDx11Native::new();
        let created = native
            .create_device(
                None,
                Dx11DriverType::Warp,
                Dx11CreateDeviceFlags::BGRA_SUPPORT,
                &DX11_FEATURE_LEVELS,
            )
            .unwrap();
        assert!(created.adapter.desc.is_software());
        assert!(created.feature_level >= Dx11FeatureLevel::Level10_0);

        let device = created.device;
        device.set_device_name("prism test device");

        let buffer = device
            .create_buffer(
                &Dx11BufferDesc {
                    byte_width: 256,
                    usage: Dx11Usage::Default,
                    bind_flags: Dx11BindFlags::CONSTANT_BUFFER,
                    cpu_access_flags: Dx11CpuAccessFlags::empty(),
                    misc_flags: Dx11ResourceMiscFlags::empty(),
                    structure_byte_stride: 0,
                },
                Some(&[1, 2, 3, 4]),
            )
            .unwrap();
        device.set_resource_name(buffer, "constants");

        let texture = device
            .create_texture(&Dx11TextureDesc {
                dimension: PrismTextureDimension::Dim2D,
                width: 64,
                height: 64,
                depth: 1,
                mip_levels: 1,
                array_size: 1,
                format: crate::dxgi::DxgiFormat::R8G8B8A8_UNORM,
                sample_count: 1,
                sample_quality: 0,
                usage: Dx11Usage::Default,
                bind_flags: Dx11BindFlags::SHADER_RESOURCE,
                cpu_access_flags: Dx11CpuAccessFlags::empty(),
                misc_flags: Dx11ResourceMiscFlags::empty(),
            })
            .unwrap();

        device.wait_idle().unwrap();
        device.release_resource(buffer);
        device.release_resource(texture);
        assert_eq!(device.release(), 0);
    }
}
