use crate::dx11::PrismDeviceDx11;
use crate::dx12::PrismDeviceDx12;
use crate::selection::select_backend;
use crate::vulkan::PrismDeviceVulkan;
use crate::*;
use std::sync::Arc;

/// Rejects textures larger than the device allows. Runs after `PrismTextureDef::verify`.
pub(crate) fn verify_texture_limits(
    texture_def: &PrismTextureDef,
    limits: &PrismDeviceLimits,
) -> PrismResult<()> {
    let check = |field: &'static str, value: u32, max: u32| {
        if value > max {
            Err(PrismError::invalid_argument(
                field,
                format!("{} exceeds the device limit of {}", value, max),
            ))
        } else {
            Ok(())
        }
    };

    match texture_def.dimension {
        PrismTextureDimension::Dim1D => {
            check("width", texture_def.width, limits.max_texture_dimension_1d)?;
            check(
                "depth_or_array_size",
                texture_def.depth_or_array_size,
                limits.max_texture_array_layers,
            )?;
        }
        PrismTextureDimension::Dim2D => {
            let max_dimension = if texture_def.is_cube_compatible() {
                limits
                    .max_texture_dimension_2d
                    .min(limits.max_texture_dimension_cube)
            } else {
                limits.max_texture_dimension_2d
            };

            check("width", texture_def.width, max_dimension)?;
            check("height", texture_def.height, max_dimension)?;
            check(
                "depth_or_array_size",
                texture_def.depth_or_array_size,
                limits.max_texture_array_layers,
            )?;
        }
        PrismTextureDimension::Dim3D => {
            let max_dimension = limits.max_texture_dimension_3d;
            check("width", texture_def.width, max_dimension)?;
            check("height", texture_def.height, max_dimension)?;
            check(
                "depth_or_array_size",
                texture_def.depth_or_array_size,
                max_dimension,
            )?;
        }
    }

    Ok(())
}

/// A logical device on one of the backends. Resources created from it keep the native device
/// alive, so it can be destroyed while they exist, though the native release is then deferred.
///
/// Dropping the device destroys it.
pub enum PrismDevice {
    Dx11(PrismDeviceDx11),
    Dx12(PrismDeviceDx12),
    Vk(PrismDeviceVulkan),
}

impl std::fmt::Debug for PrismDevice {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismDevice")
            .field("backend_type", &self.backend_type())
            .field("is_destroyed", &self.is_destroyed())
            .finish()
    }
}

impl PrismDevice {
    /// Creates a device with the process-wide registry
    pub fn new(device_def: &PrismDeviceDef) -> PrismResult<Self> {
        PrismDevice::new_with_registry(device_def, PrismBackendRegistry::global())
    }

    /// Creates a device on the backend named by the def, or the first supported backend in the
    /// platform's priority order. A backend named in the def that can't run on this machine fails
    /// with `UnsupportedBackend`, another backend is never substituted.
    pub fn new_with_registry(
        device_def: &PrismDeviceDef,
        registry: &PrismBackendRegistry,
    ) -> PrismResult<Self> {
        profiling::scope!("PrismDevice::new");

        let backend = select_backend(device_def, registry)?;
        if !registry.is_backend_supported(backend) {
            return Err(PrismError::UnsupportedBackend(backend));
        }

        log::info!(
            "Creating {:?} device, validation: {:?}, power preference: {:?}",
            backend,
            device_def.validation_mode,
            device_def.power_preference
        );

        match backend {
            PrismBackendType::Dx11 => PrismDevice::new_dx11(device_def, registry),
            PrismBackendType::Dx12 => PrismDevice::new_dx12(device_def, registry),
            PrismBackendType::Vulkan => PrismDevice::new_vulkan(device_def, registry),
        }
    }

    /// Creates a D3D11 device without consulting the support check
    pub fn new_dx11(
        device_def: &PrismDeviceDef,
        registry: &PrismBackendRegistry,
    ) -> PrismResult<Self> {
        Ok(PrismDevice::Dx11(PrismDeviceDx11::new(device_def, registry)?))
    }

    /// Creates a D3D12 device without consulting the support check
    pub fn new_dx12(
        device_def: &PrismDeviceDef,
        registry: &PrismBackendRegistry,
    ) -> PrismResult<Self> {
        Ok(PrismDevice::Dx12(PrismDeviceDx12::new(device_def, registry)?))
    }

    /// Creates a Vulkan device without consulting the support check
    pub fn new_vulkan(
        device_def: &PrismDeviceDef,
        registry: &PrismBackendRegistry,
    ) -> PrismResult<Self> {
        Ok(PrismDevice::Vk(PrismDeviceVulkan::new(device_def, registry)?))
    }

    pub fn backend_type(&self) -> PrismBackendType {
        match self {
            PrismDevice::Dx11(_) => PrismBackendType::Dx11,
            PrismDevice::Dx12(_) => PrismBackendType::Dx12,
            PrismDevice::Vk(_) => PrismBackendType::Vulkan,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        match self {
            PrismDevice::Dx11(inner) => inner.is_destroyed(),
            PrismDevice::Dx12(inner) => inner.is_destroyed(),
            PrismDevice::Vk(inner) => inner.is_destroyed(),
        }
    }

    /// Adapter, features and limits, captured when the device was created
    pub fn device_info(&self) -> PrismResult<&Arc<PrismDeviceInfo>> {
        Ok(match self {
            PrismDevice::Dx11(inner) => inner.device_context()?.device_info(),
            PrismDevice::Dx12(inner) => inner.device_context()?.device_info(),
            PrismDevice::Vk(inner) => inner.device_context()?.device_info(),
        })
    }

    pub fn adapter_info(&self) -> PrismResult<&PrismAdapterInfo> {
        Ok(&self.device_info()?.adapter_info)
    }

    pub fn features(&self) -> PrismResult<&PrismDeviceFeatures> {
        Ok(&self.device_info()?.features)
    }

    pub fn limits(&self) -> PrismResult<&PrismDeviceLimits> {
        Ok(&self.device_info()?.limits)
    }

    pub fn create_buffer(
        &self,
        buffer_def: &PrismBufferDef,
    ) -> PrismResult<PrismBuffer> {
        self.create_buffer_internal(buffer_def, None)
    }

    /// Creates a CPU-writable buffer sized to hold `data` and copies `data` into it
    pub fn create_buffer_with_data<T: Copy>(
        &self,
        data: &[T],
        usage: PrismBufferUsage,
    ) -> PrismResult<PrismBuffer> {
        let buffer_def = PrismBufferDef {
            cpu_access: PrismCpuAccess::Write,
            ..PrismBufferDef::for_data(data, usage)
        };

        self.create_buffer_internal(&buffer_def, Some(prism_base::memory::slice_as_bytes(data)))
    }

    fn create_buffer_internal(
        &self,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismBuffer> {
        profiling::scope!("PrismDevice::create_buffer");
        buffer_def.verify()?;

        Ok(match self {
            PrismDevice::Dx11(inner) => PrismBuffer::Dx11(
                inner
                    .device_context()?
                    .create_buffer(buffer_def, initial_data)?,
            ),
            PrismDevice::Dx12(inner) => PrismBuffer::Dx12(
                inner
                    .device_context()?
                    .create_buffer(buffer_def, initial_data)?,
            ),
            PrismDevice::Vk(inner) => PrismBuffer::Vk(
                inner
                    .device_context()?
                    .create_buffer(buffer_def, initial_data)?,
            ),
        })
    }

    pub fn create_texture(
        &self,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<PrismTexture> {
        profiling::scope!("PrismDevice::create_texture");
        texture_def.verify()?;
        verify_texture_limits(texture_def, self.limits()?)?;

        Ok(match self {
            PrismDevice::Dx11(inner) => {
                PrismTexture::Dx11(inner.device_context()?.create_texture(texture_def)?)
            }
            PrismDevice::Dx12(inner) => {
                PrismTexture::Dx12(inner.device_context()?.create_texture(texture_def)?)
            }
            PrismDevice::Vk(inner) => {
                PrismTexture::Vk(inner.device_context()?.create_texture(texture_def)?)
            }
        })
    }

    /// Blocks until the device has finished all submitted work
    pub fn wait_idle(&self) -> PrismResult<()> {
        match self {
            PrismDevice::Dx11(inner) => inner.device_context()?.wait_idle(),
            PrismDevice::Dx12(inner) => inner.device_context()?.wait_idle(),
            PrismDevice::Vk(inner) => inner.device_context()?.wait_idle(),
        }
    }

    /// Forwards pending native validation messages to the registry's validation sink. Returns
    /// the number of messages delivered.
    pub fn pump_validation_messages(&self) -> PrismResult<usize> {
        Ok(match self {
            PrismDevice::Dx11(inner) => inner.device_context()?.pump_validation_messages(),
            PrismDevice::Dx12(inner) => inner.device_context()?.pump_validation_messages(),
            PrismDevice::Vk(inner) => inner.device_context()?.pump_validation_messages(),
        })
    }

    /// Waits for the device to be idle and releases it. Calling this again has no effect.
    pub fn destroy(&mut self) {
        match self {
            PrismDevice::Dx11(inner) => inner.destroy(),
            PrismDevice::Dx12(inner) => inner.destroy(),
            PrismDevice::Vk(inner) => inner.destroy(),
        }
    }

    /// Get the underlying D3D11 API object. This provides access to any internally created
    /// D3D11 objects.
    pub fn dx11_device(&self) -> Option<&PrismDeviceDx11> {
        match self {
            PrismDevice::Dx11(inner) => Some(inner),
            PrismDevice::Dx12(_) => None,
            PrismDevice::Vk(_) => None,
        }
    }

    /// Get the underlying D3D12 API object. This provides access to any internally created
    /// D3D12 objects.
    pub fn dx12_device(&self) -> Option<&PrismDeviceDx12> {
        match self {
            PrismDevice::Dx11(_) => None,
            PrismDevice::Dx12(inner) => Some(inner),
            PrismDevice::Vk(_) => None,
        }
    }

    /// Get the underlying vulkan API object. This provides access to any internally created
    /// vulkan objects.
    pub fn vk_device(&self) -> Option<&PrismDeviceVulkan> {
        match self {
            PrismDevice::Dx11(_) => None,
            PrismDevice::Dx12(_) => None,
            PrismDevice::Vk(inner) => Some(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dx11::{Dx11Message, Dx11MessageId};
    use crate::dx12::{Dx12Message, Dx12MessageId};
    use crate::reference::*;
    use crate::vulkan::{VkDebugMessage, VkDebugSeverityFlags, VkPhysicalDeviceType};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<PrismValidationMessage>>);

    impl CollectingSink {
        fn message_ids(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .map(|message| message.message_id.clone())
                .collect()
        }
    }

    impl PrismValidationSink for CollectingSink {
        fn on_validation_message(
            &self,
            message: &PrismValidationMessage,
        ) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    fn init_logging() {
        let _ = env_logger::try_init();
    }

    fn windows() -> PrismPlatformInfo {
        PrismPlatformInfo::with_os_family(PrismOsFamily::Windows)
    }

    fn linux() -> PrismPlatformInfo {
        PrismPlatformInfo::with_os_family(PrismOsFamily::Linux)
    }

    fn device_def(backend: PrismBackendType) -> PrismDeviceDef {
        PrismDeviceDef {
            preferred_backend: Some(backend),
            ..Default::default()
        }
    }

    #[test]
    fn test_automatic_vulkan_device_end_to_end() {
        init_logging();
        let driver = ReferenceDriver::default();
        let registry = driver.registry(linux());

        let mut device = PrismDevice::new_with_registry(&PrismDeviceDef::default(), &registry)
            .unwrap();
        assert_eq!(device.backend_type(), PrismBackendType::Vulkan);
        assert_eq!(
            device.adapter_info().unwrap().adapter_type,
            PrismAdapterType::DiscreteGpu
        );
        assert_eq!(device.adapter_info().unwrap().vendor(), PrismVendor::Amd);
        assert_eq!(device.limits().unwrap().min_uniform_buffer_offset_alignment, 64);
        assert!(device.features().unwrap().render_passes);

        let start = std::time::Instant::now();
        device.wait_idle().unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        device.destroy();
        assert!(device.is_destroyed());
        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Device), 0);
        assert_eq!(driver.tracker.invalid_release_count(), 0);
    }

    #[test]
    fn test_vulkan_queues_use_separate_families() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(linux());
        let device = PrismDevice::new_with_registry(&PrismDeviceDef::default(), &registry)
            .unwrap();

        let device_context = device.vk_device().unwrap().device_context().unwrap();
        let allocation = device_context.queue_allocation();
        assert_eq!(allocation.graphics.queue_family_index, 0);
        assert_eq!(allocation.compute.queue_family_index, 1);
        assert_eq!(allocation.transfer.queue_family_index, 2);
        assert_eq!(allocation.queue_create_infos.len(), 3);

        let graphics = device_context.queue(PrismQueueType::Graphics).queue;
        let transfer = device_context.queue(PrismQueueType::Transfer).queue;
        assert_ne!(graphics, transfer);
    }

    #[test]
    fn test_buffers_report_their_def() {
        init_logging();
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());

        let buffer_def = PrismBufferDef {
            size: 100,
            usage: PrismBufferUsage::CONSTANT,
            cpu_access: PrismCpuAccess::Write,
            shared_resource_flags: PrismSharedResourceFlags::SHARED,
            label: Some("constants".to_string()),
        };

        for backend in PrismBackendType::ALL.iter() {
            let device = PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            assert_eq!(device.backend_type(), *backend);

            let buffer = device.create_buffer(&buffer_def).unwrap();
            assert_eq!(buffer.backend_type(), *backend);
            // Reported as requested even though each backend pads constant buffers
            assert_eq!(buffer.buffer_def(), &buffer_def);
            assert_eq!(
                driver.tracker.object_name(buffer.native_handle()).as_deref(),
                Some("constants")
            );
        }

        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Buffer), 0);
        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Device), 0);
        assert_eq!(driver.tracker.invalid_release_count(), 0);
    }

    #[test]
    fn test_constant_buffer_alignment_per_backend() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());
        let buffer_def = PrismBufferDef::for_constant_buffer(100);

        let device = PrismDevice::new_with_registry(&device_def(PrismBackendType::Dx11), &registry)
            .unwrap();
        let buffer = device.create_buffer(&buffer_def).unwrap();
        let dx11_buffer = buffer.dx11_buffer().unwrap();
        assert_eq!(dx11_buffer.dx11_buffer_desc().byte_width, 128);

        let device = PrismDevice::new_with_registry(&device_def(PrismBackendType::Dx12), &registry)
            .unwrap();
        let buffer = device.create_buffer(&buffer_def).unwrap();
        assert_eq!(buffer.dx12_buffer().unwrap().dx12_allocation().desc.width, 256);

        let device =
            PrismDevice::new_with_registry(&device_def(PrismBackendType::Vulkan), &registry)
                .unwrap();
        let buffer = device.create_buffer(&buffer_def).unwrap();
        assert_eq!(buffer.vk_buffer().unwrap().vk_buffer_desc().size, 128);
    }

    #[test]
    fn test_buffer_with_data() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());
        let data = [1u16, 2, 3];

        for backend in PrismBackendType::ALL.iter() {
            let device = PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            let buffer = device
                .create_buffer_with_data(&data, PrismBufferUsage::VERTEX)
                .unwrap();
            assert_eq!(buffer.buffer_def().size, 6);
            assert_eq!(buffer.buffer_def().cpu_access, PrismCpuAccess::Write);

            let contents = driver
                .tracker
                .object_contents(buffer.native_handle())
                .unwrap();
            assert_eq!(&contents[..], prism_base::memory::slice_as_bytes(&data));
        }
    }

    #[test]
    fn test_invalid_defs_create_no_native_objects() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());

        for backend in PrismBackendType::ALL.iter() {
            let device = PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();

            let error = device
                .create_buffer(&PrismBufferDef::for_usage(0, PrismBufferUsage::VERTEX))
                .unwrap_err();
            assert_eq!(error.invalid_field(), Some("size"));

            for (width, height, depth, field) in [
                (0, 16, 1, "width"),
                (16, 0, 1, "height"),
                (16, 16, 0, "depth_or_array_size"),
            ]
            .iter()
            {
                let texture_def = PrismTextureDef {
                    width: *width,
                    height: *height,
                    depth_or_array_size: *depth,
                    ..Default::default()
                };
                let error = device.create_texture(&texture_def).unwrap_err();
                assert_eq!(error.invalid_field(), Some(*field));
            }

            // Beyond the device's 2D limit
            let error = device
                .create_texture(&PrismTextureDef::texture_2d(
                    PrismFormat::Rgba8Unorm,
                    16385,
                    16,
                    1,
                    1,
                    PrismTextureUsage::SHADER_READ,
                ))
                .unwrap_err();
            assert_eq!(error.invalid_field(), Some("width"));

            // A readback cubemap with a full mip chain can't be mapped
            let error = device
                .create_texture(&PrismTextureDef {
                    cpu_access: PrismCpuAccess::Read,
                    ..PrismTextureDef::texture_2d(
                        PrismFormat::Rgba8Unorm,
                        256,
                        256,
                        0,
                        6,
                        PrismTextureUsage::SHADER_READ,
                    )
                })
                .unwrap_err();
            assert_eq!(error.invalid_field(), Some("cpu_access"));

            assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Buffer), 0);
            assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Texture), 0);

            // The device is still usable
            device
                .create_buffer(&PrismBufferDef::for_staging_buffer(4))
                .unwrap();
        }
    }

    #[test]
    fn test_full_mip_chain_and_cubemaps() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());

        for backend in PrismBackendType::ALL.iter() {
            let device = PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            let texture = device
                .create_texture(&PrismTextureDef::texture_2d(
                    PrismFormat::Rgba8Unorm,
                    256,
                    256,
                    0,
                    6,
                    PrismTextureUsage::SHADER_READ,
                ))
                .unwrap();
            assert_eq!(texture.texture_def().mip_levels, 9);
            assert!(texture.texture_def().is_cube_compatible());
            assert!(driver.tracker.is_alive(texture.native_handle()));
        }

        let rectangular = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            256,
            128,
            1,
            6,
            PrismTextureUsage::SHADER_READ,
        );
        assert!(!rectangular.is_cube_compatible());
    }

    #[test]
    fn test_out_of_memory_leaves_device_usable() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());
        let huge = PrismBufferDef::for_usage(6 * 1024 * 1024 * 1024, PrismBufferUsage::SHADER_READ);

        for backend in [PrismBackendType::Dx12, PrismBackendType::Vulkan].iter() {
            let device = PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            match device.create_buffer(&huge) {
                Err(PrismError::NativeError(error)) => assert_eq!(error.backend, Some(*backend)),
                other => panic!("expected a native error, got {:?}", other),
            }

            device
                .create_buffer(&PrismBufferDef::for_usage(64, PrismBufferUsage::SHADER_READ))
                .unwrap();
        }
    }

    #[test]
    fn test_double_destroy_is_a_noop() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());

        for backend in PrismBackendType::ALL.iter() {
            let mut device =
                PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            device.destroy();
            device.destroy();
            assert!(device.is_destroyed());

            assert_eq!(device.wait_idle(), Err(PrismError::DeviceDestroyed));
            assert_eq!(
                device
                    .create_buffer(&PrismBufferDef::for_staging_buffer(4))
                    .err(),
                Some(PrismError::DeviceDestroyed)
            );
            assert!(device.adapter_info().is_err());
            std::mem::drop(device);
        }

        assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Device), 0);
        assert_eq!(driver.tracker.invalid_release_count(), 0);
    }

    #[test]
    fn test_destroy_with_live_resources_defers_release() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(windows());

        for backend in PrismBackendType::ALL.iter() {
            let mut device =
                PrismDevice::new_with_registry(&device_def(*backend), &registry).unwrap();
            let buffer = device
                .create_buffer(&PrismBufferDef::for_staging_buffer(16))
                .unwrap();

            device.destroy();
            assert!(device.is_destroyed());
            assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Device), 1);

            std::mem::drop(buffer);
            assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Device), 0);
            assert_eq!(driver.tracker.live_count(ReferenceObjectKind::Buffer), 0);
        }

        assert_eq!(driver.tracker.invalid_release_count(), 0);
    }

    #[test]
    fn test_requested_backend_is_never_substituted() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(linux());
        assert_eq!(
            PrismDevice::new_with_registry(&device_def(PrismBackendType::Dx12), &registry).err(),
            Some(PrismError::UnsupportedBackend(PrismBackendType::Dx12))
        );

        let registry = driver.registry(PrismPlatformInfo::with_os_family(PrismOsFamily::MacOs));
        assert_eq!(
            PrismDevice::new_with_registry(&PrismDeviceDef::default(), &registry).err(),
            Some(PrismError::UnsupportedPlatform)
        );
        assert_eq!(driver.live_object_count(), 0);
    }

    #[test]
    fn test_software_fallbacks() {
        init_logging();
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

        // Automatic selection finds nothing, each backend still falls back when asked directly
        assert_eq!(
            PrismDevice::new_with_registry(&PrismDeviceDef::default(), &registry).err(),
            Some(PrismError::UnsupportedPlatform)
        );

        let def = PrismDeviceDef::default();
        for device in [
            PrismDevice::new_dx11(&def, &registry).unwrap(),
            PrismDevice::new_dx12(&def, &registry).unwrap(),
            PrismDevice::new_vulkan(&def, &registry).unwrap(),
        ]
        .iter()
        {
            assert_eq!(
                device.adapter_info().unwrap().adapter_type,
                PrismAdapterType::Cpu
            );
        }
    }

    #[test]
    fn test_no_warp_is_no_compatible_adapter() {
        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig {
                adapters: vec![],
                warp_adapter: None,
                supports_gpu_preference: false,
            },
            ReferenceVkConfig {
                physical_devices: vec![],
                ..Default::default()
            },
        );
        let registry = driver.registry(windows());
        let def = PrismDeviceDef::default();

        for result in [
            PrismDevice::new_dx11(&def, &registry),
            PrismDevice::new_dx12(&def, &registry),
            PrismDevice::new_vulkan(&def, &registry),
        ]
        .iter()
        {
            match result {
                Err(PrismError::NoCompatibleAdapter(_)) => {}
                other => panic!("expected NoCompatibleAdapter, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_power_preference_picks_adapter() {
        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig {
                adapters: vec![
                    ReferenceAdapter::integrated("integrated", 0x8086),
                    ReferenceAdapter::discrete("discrete", 0x10de),
                    ReferenceAdapter::warp(),
                ],
                ..Default::default()
            },
            ReferenceVkConfig::default(),
        );
        let registry = driver.registry(windows());

        let high = PrismDeviceDef {
            preferred_backend: Some(PrismBackendType::Dx12),
            power_preference: PrismPowerPreference::HighPerformance,
            ..Default::default()
        };
        let device = PrismDevice::new_with_registry(&high, &registry).unwrap();
        assert_eq!(device.adapter_info().unwrap().name, "discrete");
        assert_eq!(
            device.adapter_info().unwrap().adapter_type,
            PrismAdapterType::DiscreteGpu
        );
        assert!(device.features().unwrap().raytracing);

        let low = PrismDeviceDef {
            power_preference: PrismPowerPreference::LowPower,
            ..high
        };
        let device = PrismDevice::new_with_registry(&low, &registry).unwrap();
        assert_eq!(device.adapter_info().unwrap().name, "integrated");
        assert_eq!(
            device.adapter_info().unwrap().adapter_type,
            PrismAdapterType::IntegratedGpu
        );
        // The integrated adapter reports no render pass tier
        assert!(!device.features().unwrap().render_passes);
    }

    #[test]
    fn test_dx12_validation_messages() {
        let driver = ReferenceDriver::default();
        let sink = Arc::new(CollectingSink::default());
        let registry = driver.registry_with_sink(windows(), sink.clone());

        let def = PrismDeviceDef {
            preferred_backend: Some(PrismBackendType::Dx12),
            validation_mode: PrismValidationMode::Gpu,
            label: Some("validated".to_string()),
            ..Default::default()
        };
        let device = PrismDevice::new_with_registry(&def, &registry).unwrap();
        assert!(driver.dx12.is_debug_layer_enabled());
        assert!(driver.dx12.is_gpu_based_validation_enabled());

        driver.dx12.inject_message(Dx12Message {
            severity: PrismValidationSeverity::Warning,
            id: Dx12MessageId::ClearRenderTargetViewMismatchingClearValue,
            description: "mismatching clear value".to_string(),
        });
        driver.dx12.inject_message(Dx12Message {
            severity: PrismValidationSeverity::Error,
            id: Dx12MessageId::Other(1234),
            description: "bad barrier".to_string(),
        });

        assert_eq!(device.pump_validation_messages().unwrap(), 1);
        assert_eq!(sink.message_ids(), vec!["1234".to_string()]);
        assert_eq!(
            sink.0.lock().unwrap()[0].backend,
            PrismBackendType::Dx12
        );
        assert_eq!(device.pump_validation_messages().unwrap(), 0);
    }

    #[test]
    fn test_dx11_messages_need_validation() {
        let driver = ReferenceDriver::default();
        let sink = Arc::new(CollectingSink::default());
        let registry = driver.registry_with_sink(windows(), sink.clone());

        let device = PrismDevice::new_with_registry(&device_def(PrismBackendType::Dx11), &registry)
            .unwrap();
        driver.dx11.inject_message(Dx11Message {
            severity: PrismValidationSeverity::Error,
            id: Dx11MessageId::Other(7),
            description: "ignored without the debug layer".to_string(),
        });
        assert_eq!(device.pump_validation_messages().unwrap(), 0);
        assert!(sink.message_ids().is_empty());
    }

    #[test]
    fn test_dx11_validation_messages() {
        let driver = ReferenceDriver::default();
        let sink = Arc::new(CollectingSink::default());
        let registry = driver.registry_with_sink(windows(), sink.clone());

        let def = PrismDeviceDef {
            validation_mode: PrismValidationMode::Enabled,
            ..device_def(PrismBackendType::Dx11)
        };
        let device = PrismDevice::new_with_registry(&def, &registry).unwrap();
        driver.dx11.inject_message(Dx11Message {
            severity: PrismValidationSeverity::Warning,
            id: Dx11MessageId::SetPrivateDataChangingParams,
            description: "name changed".to_string(),
        });
        driver.dx11.inject_message(Dx11Message {
            severity: PrismValidationSeverity::Error,
            id: Dx11MessageId::Other(7),
            description: "reported".to_string(),
        });

        // Resource creation pumps messages
        device
            .create_buffer(&PrismBufferDef::for_staging_buffer(4))
            .unwrap();
        assert_eq!(sink.message_ids(), vec!["7".to_string()]);
    }

    #[test]
    fn test_vulkan_validation_messages() {
        let driver = ReferenceDriver::default();
        let sink = Arc::new(CollectingSink::default());
        let registry = driver.registry_with_sink(linux(), sink.clone());

        let def = PrismDeviceDef {
            validation_mode: PrismValidationMode::Gpu,
            ..Default::default()
        };
        let device = PrismDevice::new_with_registry(&def, &registry).unwrap();

        let instance_desc = driver.vulkan.created_instances().pop().unwrap();
        assert_eq!(
            instance_desc.enabled_layers,
            vec!["VK_LAYER_KHRONOS_validation".to_string()]
        );
        assert_eq!(instance_desc.validation_features.len(), 3);

        let message = |id: i32, name: &str| VkDebugMessage {
            severity: VkDebugSeverityFlags::ERROR,
            message_id_number: id,
            message_id_name: name.to_string(),
            message: String::new(),
        };
        driver.vulkan.inject_message(message(
            0x7cd0911d,
            "VUID-VkSwapchainCreateInfoKHR-imageExtent-01274",
        ));
        driver.vulkan.inject_message(message(0x1234, ""));

        assert_eq!(device.pump_validation_messages().unwrap(), 1);
        assert_eq!(sink.message_ids(), vec!["0x1234".to_string()]);
    }

    #[test]
    fn test_texture_limits() {
        let limits = PrismDeviceLimits {
            max_texture_dimension_1d: 4096,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 256,
            max_texture_dimension_cube: 4096,
            max_texture_array_layers: 64,
            ..Default::default()
        };

        let cube = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            8192,
            8192,
            1,
            6,
            PrismTextureUsage::SHADER_READ,
        );
        assert_eq!(
            verify_texture_limits(&cube, &limits)
                .unwrap_err()
                .invalid_field(),
            Some("width")
        );

        let array = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            8192,
            4096,
            1,
            65,
            PrismTextureUsage::SHADER_READ,
        );
        assert_eq!(
            verify_texture_limits(&array, &limits)
                .unwrap_err()
                .invalid_field(),
            Some("depth_or_array_size")
        );

        let volume = PrismTextureDef::texture_3d(
            PrismFormat::R8Unorm,
            256,
            256,
            256,
            1,
            PrismTextureUsage::SHADER_READ,
        );
        assert!(verify_texture_limits(&volume, &limits).is_ok());
    }
}
