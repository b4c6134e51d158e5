use super::dxgi::*;
use super::{ReferenceObjectKind, ReferenceObjectTracker};
use crate::dx11::*;
use crate::dxgi::{DxgiAdapter, DxgiFactory};
use crate::{PrismBackendType, PrismNativeError, PrismNativeHandle, PrismResult, PrismValidationSeverity};
use std::sync::{Arc, Mutex};

fn dx11_error(
    operation: &'static str,
    code: i64,
    message: impl Into<String>,
) -> PrismNativeError {
    PrismNativeError::new(Some(PrismBackendType::Dx11), operation, code, message)
}

/// Software implementation of the D3D11 runtime over a simulated set of DXGI adapters
pub struct ReferenceDx11Native {
    dxgi: Arc<ReferenceDxgiConfig>,
    tracker: Arc<ReferenceObjectTracker>,
    sdk_layers_available: bool,
    pending_messages: Arc<Mutex<Vec<Dx11Message>>>,
}

impl ReferenceDx11Native {
    pub fn new(
        dxgi: Arc<ReferenceDxgiConfig>,
        tracker: Arc<ReferenceObjectTracker>,
    ) -> Self {
        ReferenceDx11Native {
            dxgi,
            tracker,
            sdk_layers_available: true,
            pending_messages: Default::default(),
        }
    }

    pub fn with_sdk_layers(
        mut self,
        sdk_layers_available: bool,
    ) -> Self {
        self.sdk_layers_available = sdk_layers_available;
        self
    }

    /// Queues a message as if the debug layer had reported it. Only devices created with the
    /// debug layer receive it.
    pub fn inject_message(
        &self,
        message: Dx11Message,
    ) {
        self.pending_messages.lock().unwrap().push(message);
    }
}

impl Dx11Native for ReferenceDx11Native {
    fn create_dxgi_factory(
        &self,
        _debug: bool,
    ) -> PrismResult<Arc<dyn DxgiFactory>> {
        Ok(Arc::new(ReferenceDxgiFactory::new(
            self.dxgi.clone(),
            PrismBackendType::Dx11,
        )))
    }

    fn sdk_layers_available(&self) -> bool {
        self.sdk_layers_available
    }

    fn is_feature_level_supported(
        &self,
        adapter: &DxgiAdapter,
        feature_level: Dx11FeatureLevel,
        flags: Dx11CreateDeviceFlags,
    ) -> bool {
        let adapter = match self.dxgi.find_adapter(adapter) {
            Some(adapter) => adapter,
            None => return false,
        };

        let bgra_ok =
            adapter.dx11_bgra_support || !flags.contains(Dx11CreateDeviceFlags::BGRA_SUPPORT);
        bgra_ok
            && adapter
                .dx11_feature_level
                .map_or(false, |max| max >= feature_level)
    }

    fn create_device(
        &self,
        adapter: Option<&DxgiAdapter>,
        driver_type: Dx11DriverType,
        flags: Dx11CreateDeviceFlags,
        feature_levels: &[Dx11FeatureLevel],
    ) -> PrismResult<Dx11CreatedDevice> {
        if flags.contains(Dx11CreateDeviceFlags::DEBUG) && !self.sdk_layers_available {
            return Err(dx11_error(
                "D3D11CreateDevice",
                DXGI_ERROR_SDK_COMPONENT_MISSING,
                "the SDK layers are not installed",
            )
            .into());
        }

        let dxgi_adapter = match driver_type {
            Dx11DriverType::Hardware => adapter.cloned(),
            Dx11DriverType::Warp => self.dxgi.warp_dxgi_adapter(),
        }
        .ok_or_else(|| dx11_error("D3D11CreateDevice", E_INVALIDARG, "no adapter"))?;

        let reference_adapter = self
            .dxgi
            .find_adapter(&dxgi_adapter)
            .ok_or_else(|| dx11_error("D3D11CreateDevice", E_INVALIDARG, "unknown adapter"))?;

        if flags.contains(Dx11CreateDeviceFlags::BGRA_SUPPORT) && !reference_adapter.dx11_bgra_support
        {
            return Err(dx11_error(
                "D3D11CreateDevice",
                DXGI_ERROR_UNSUPPORTED,
                "BGRA is not supported",
            )
            .into());
        }

        // The first requested level the adapter supports
        let feature_level = feature_levels
            .iter()
            .copied()
            .find(|level| {
                reference_adapter
                    .dx11_feature_level
                    .map_or(false, |max| max >= *level)
            })
            .ok_or_else(|| {
                dx11_error(
                    "D3D11CreateDevice",
                    DXGI_ERROR_UNSUPPORTED,
                    "none of the requested feature levels are supported",
                )
            })?;

        let handle = self
            .tracker
            .create(ReferenceObjectKind::Device, None, 0);

        let device = ReferenceDx11Device {
            handle,
            tracker: self.tracker.clone(),
            debug: flags.contains(Dx11CreateDeviceFlags::DEBUG),
            max_allocation_size: reference_adapter.max_allocation_size,
            pending_messages: self.pending_messages.clone(),
        };

        Ok(Dx11CreatedDevice {
            device: Box::new(device),
            feature_level,
            adapter: dxgi_adapter,
        })
    }
}

pub struct ReferenceDx11Device {
    handle: PrismNativeHandle,
    tracker: Arc<ReferenceObjectTracker>,
    debug: bool,
    max_allocation_size: u64,
    pending_messages: Arc<Mutex<Vec<Dx11Message>>>,
}

impl ReferenceDx11Device {
    fn create_resource(
        &self,
        kind: ReferenceObjectKind,
        size: u64,
    ) -> PrismResult<PrismNativeHandle> {
        if size > self.max_allocation_size {
            return Err(dx11_error(
                "CreateResource",
                E_OUTOFMEMORY,
                format!("{} bytes exceeds the adapter's allocation limit", size),
            )
            .into());
        }

        Ok(self.tracker.create(kind, Some(self.handle), size))
    }
}

impl Dx11NativeDevice for ReferenceDx11Device {
    fn configure_info_queue(
        &self,
        _break_on_severity: &[PrismValidationSeverity],
        _deny_list: &[Dx11MessageId],
    ) -> PrismResult<()> {
        if !self.debug {
            return Err(dx11_error(
                "QueryInterface(ID3D11InfoQueue)",
                E_NOINTERFACE,
                "the debug layer is not active",
            )
            .into());
        }

        Ok(())
    }

    fn take_messages(&self) -> Vec<Dx11Message> {
        if !self.debug {
            return Vec::default();
        }

        std::mem::take(&mut *self.pending_messages.lock().unwrap())
    }

    fn create_buffer(
        &self,
        desc: &Dx11BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismNativeHandle> {
        if desc.byte_width == 0 {
            return Err(dx11_error("CreateBuffer", E_INVALIDARG, "ByteWidth is 0").into());
        }

        if desc.usage == Dx11Usage::Immutable && initial_data.is_none() {
            return Err(dx11_error(
                "CreateBuffer",
                E_INVALIDARG,
                "immutable buffers require initial data",
            )
            .into());
        }

        let buffer = self.create_resource(ReferenceObjectKind::Buffer, desc.byte_width as u64)?;
        if let Some(data) = initial_data {
            if let Err(e) = self.tracker.write(buffer, 0, data) {
                self.tracker.release(buffer);
                return Err(e);
            }
        }

        Ok(buffer)
    }

    fn create_texture(
        &self,
        desc: &Dx11TextureDesc,
    ) -> PrismResult<PrismNativeHandle> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 || desc.array_size == 0 {
            return Err(dx11_error("CreateTexture", E_INVALIDARG, "zero sized texture").into());
        }

        let size = desc.width as u64
            * desc.height as u64
            * desc.depth as u64
            * desc.array_size as u64
            * desc.sample_count.max(1) as u64
            * 4;
        self.create_resource(ReferenceObjectKind::Texture, size)
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

    fn release_resource(
        &self,
        resource: PrismNativeHandle,
    ) {
        self.tracker.release(resource);
    }

    fn wait_idle(&self) -> PrismResult<()> {
        // Work completes as it is submitted
        Ok(())
    }

    fn release(&self) -> u32 {
        let outstanding = self.tracker.live_children(self.handle) as u32;
        self.tracker.release(self.handle);
        outstanding
    }
}
