use super::device_context::DX11_DENIED_MESSAGE_IDS;
use super::native::*;
use crate::dx11::{PrismDeviceContextDx11, PrismDeviceContextDx11Inner};
use crate::dxgi::{adapters_in_preference_order, DxgiAdapter, DxgiFactory};
use crate::internal_shared::release_device_inner;
use crate::{
    PrismAdapterInfo, PrismBackendRegistry, PrismBackendType, PrismDeviceDef, PrismDeviceFeatures,
    PrismDeviceInfo, PrismDeviceLimits, PrismError, PrismPowerPreference, PrismResult,
    PrismValidationSeverity,
};
use std::sync::Arc;

const DX11_MINIMUM_FEATURE_LEVEL: Dx11FeatureLevel = Dx11FeatureLevel::Level11_0;

/// Returns true if a non-software adapter supports feature level 11_0 with BGRA support
pub(crate) fn is_dx11_supported(registry: &PrismBackendRegistry) -> bool {
    if !registry.platform().is_windows() {
        return false;
    }

    let native = match registry.dx11_native() {
        Some(native) => native,
        None => return false,
    };

    let factory = match native.create_dxgi_factory(false) {
        Ok(factory) => factory,
        Err(e) => {
            log::debug!("D3D11 not supported, could not create DXGI factory: {}", e);
            return false;
        }
    };

    let adapters = match factory.enum_adapters() {
        Ok(adapters) => adapters,
        Err(e) => {
            log::debug!("D3D11 not supported, could not enumerate adapters: {}", e);
            return false;
        }
    };

    adapters.iter().any(|adapter| {
        !adapter.desc.is_software()
            && native.is_feature_level_supported(
                adapter,
                DX11_MINIMUM_FEATURE_LEVEL,
                Dx11CreateDeviceFlags::BGRA_SUPPORT,
            )
    })
}

fn find_hardware_adapter(
    native: &dyn Dx11Native,
    factory: &dyn DxgiFactory,
    power_preference: PrismPowerPreference,
) -> PrismResult<Option<DxgiAdapter>> {
    for adapter in adapters_in_preference_order(factory, power_preference)? {
        adapter.log_info();

        if adapter.desc.is_software() {
            // Only used through the WARP fallback
            continue;
        }

        if native.is_feature_level_supported(
            &adapter,
            DX11_MINIMUM_FEATURE_LEVEL,
            Dx11CreateDeviceFlags::BGRA_SUPPORT,
        ) {
            return Ok(Some(adapter));
        }
    }

    Ok(None)
}

fn create_device(
    native: &dyn Dx11Native,
    factory: &dyn DxgiFactory,
    device_def: &PrismDeviceDef,
    flags: Dx11CreateDeviceFlags,
) -> PrismResult<Dx11CreatedDevice> {
    let hardware_device =
        match find_hardware_adapter(native, factory, device_def.power_preference)? {
            Some(adapter) => {
                match native.create_device(
                    Some(&adapter),
                    Dx11DriverType::Hardware,
                    flags,
                    &DX11_FEATURE_LEVELS,
                ) {
                    Ok(created) => Some(created),
                    Err(e) => {
                        log::warn!(
                            "D3D11CreateDevice failed on adapter {:?} ({}), falling back to WARP",
                            adapter.desc.description,
                            e
                        );
                        None
                    }
                }
            }
            None => None,
        };

    if let Some(created) = hardware_device {
        return Ok(created);
    }

    log::info!("No hardware D3D11 adapter available, creating a WARP device");
    native
        .create_device(None, Dx11DriverType::Warp, flags, &DX11_FEATURE_LEVELS)
        .map_err(|e| {
            PrismError::NoCompatibleAdapter(format!(
                "No Direct3D 11 device found and WARP device creation failed: {}",
                e
            ))
        })
}

pub(crate) fn dx11_device_info(
    adapter: &DxgiAdapter,
    feature_level: Dx11FeatureLevel,
) -> PrismDeviceInfo {
    let is_11_0 = feature_level >= Dx11FeatureLevel::Level11_0;

    let driver_description = match adapter.driver_version_string() {
        Some(version) => format!(
            "Direct3D 11 (feature level {}), driver {}",
            feature_level.as_str(),
            version
        ),
        None => format!("Direct3D 11 (feature level {})", feature_level.as_str()),
    };

    let adapter_info = PrismAdapterInfo {
        vendor_id: adapter.desc.vendor_id,
        device_id: adapter.desc.device_id,
        name: adapter.desc.description.clone(),
        adapter_type: adapter.adapter_type(),
        driver_description,
    };

    let features = PrismDeviceFeatures {
        independent_blend: true,
        compute_shader: is_11_0,
        tessellation_shader: is_11_0,
        multi_viewport: true,
        index_type_uint32: true,
        multi_draw_indirect: true,
        fill_mode_non_solid: true,
        sampler_anisotropy: true,
        texture_compression_bc: true,
        texture_compression_etc2: false,
        texture_compression_astc_ldr: false,
        texture_cube_array: true,
        raytracing: false,
        render_passes: false,
    };

    // D3D11_REQ_* and D3D11_* limits, fixed for feature level 11_0
    let limits = PrismDeviceLimits {
        max_texture_dimension_1d: 16384,
        max_texture_dimension_2d: 16384,
        max_texture_dimension_3d: 2048,
        max_texture_dimension_cube: 16384,
        max_texture_array_layers: 2048,
        max_color_attachments: 8,
        max_viewports: 16,
        max_viewport_dimensions: [32767, 32767],
        max_uniform_buffer_range: 65536,
        min_uniform_buffer_offset_alignment: 256,
        min_storage_buffer_offset_alignment: 16,
        max_sampler_anisotropy: 16.0,
        max_vertex_input_bindings: 32,
        max_tessellation_patch_size: 32,
        max_compute_shared_memory_size: 32768,
        max_compute_work_group_count: [65535, 65535, 65535],
        max_compute_work_group_invocations: 1024,
        max_compute_work_group_size: [1024, 1024, 64],
    };

    PrismDeviceInfo {
        adapter_info,
        features,
        limits,
    }
}

/// Owner of a D3D11 device. Dropping it (or calling `destroy()`) releases the device once no
/// resources reference it.
pub struct PrismDeviceDx11 {
    device_context: Option<PrismDeviceContextDx11>,
}

impl Drop for PrismDeviceDx11 {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl PrismDeviceDx11 {
    pub fn device_context(&self) -> PrismResult<&PrismDeviceContextDx11> {
        self.device_context
            .as_ref()
            .ok_or(PrismError::DeviceDestroyed)
    }

    pub fn is_destroyed(&self) -> bool {
        self.device_context.is_none()
    }

    pub fn new(
        device_def: &PrismDeviceDef,
        registry: &PrismBackendRegistry,
    ) -> PrismResult<Self> {
        profiling::scope!("PrismDeviceDx11::new");

        let native = registry
            .dx11_native()
            .ok_or(PrismError::UnsupportedBackend(PrismBackendType::Dx11))?;

        let mut flags = Dx11CreateDeviceFlags::BGRA_SUPPORT;
        if device_def.validation_mode.is_enabled() {
            if native.sdk_layers_available() {
                flags |= Dx11CreateDeviceFlags::DEBUG;
            } else {
                log::warn!(
                    "D3D11 validation was requested but the SDK layers are not installed, continuing without validation"
                );
            }
        }

        let factory = registry.dx11_dxgi_factory(flags.contains(Dx11CreateDeviceFlags::DEBUG))?;
        let created = create_device(&**native, &*factory, device_def, flags)?;

        log::info!(
            "Created D3D11 device on {:?} at feature level {}",
            created.adapter.desc.description,
            created.feature_level.as_str()
        );

        if flags.contains(Dx11CreateDeviceFlags::DEBUG) {
            if let Err(e) = created.device.configure_info_queue(
                &[
                    PrismValidationSeverity::Corruption,
                    PrismValidationSeverity::Error,
                ],
                &DX11_DENIED_MESSAGE_IDS,
            ) {
                log::warn!("Could not configure the D3D11 info queue: {}", e);
            }
        }

        if let Some(label) = &device_def.label {
            created.device.set_device_name(label);
        }

        let device_info = dx11_device_info(&created.adapter, created.feature_level);
        let inner = Arc::new(PrismDeviceContextDx11Inner::new(
            device_info,
            created.device,
            created.feature_level,
            registry.validation_sink(),
        ));

        Ok(PrismDeviceDx11 {
            device_context: Some(PrismDeviceContextDx11::new(inner)),
        })
    }

    /// Waits for the device to be idle and releases it. Calling this more than once has no
    /// effect.
    pub fn destroy(&mut self) {
        if let Some(device_context) = self.device_context.take() {
            if let Err(e) = device_context.wait_idle() {
                log::warn!("Failed to wait for D3D11 device idle: {}", e);
            }

            let inner = device_context.inner.clone();

            // This should be the final device context
            std::mem::drop(device_context);

            release_device_inner(inner, PrismBackendType::Dx11);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxgi::{DxgiAdapterDesc, DxgiAdapterFlags};
    use crate::PrismAdapterType;

    fn adapter(flags: DxgiAdapterFlags) -> DxgiAdapter {
        DxgiAdapter {
            index: 0,
            desc: DxgiAdapterDesc {
                description: "Microsoft Basic Render Driver".to_string(),
                vendor_id: 0x1414,
                device_id: 0x8c,
                sub_sys_id: 0,
                revision: 0,
                dedicated_video_memory: 0,
                dedicated_system_memory: 0,
                shared_system_memory: 0,
                flags,
            },
            umd_version: None,
        }
    }

    #[test]
    fn test_device_info_for_feature_level() {
        let info = dx11_device_info(
            &adapter(DxgiAdapterFlags::SOFTWARE),
            Dx11FeatureLevel::Level11_1,
        );
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::Cpu);
        assert_eq!(
            info.adapter_info.driver_description,
            "Direct3D 11 (feature level 11_1)"
        );
        assert!(info.features.compute_shader);
        assert!(!info.features.raytracing);
        assert_eq!(info.limits.max_texture_dimension_2d, 16384);
        assert_eq!(info.limits.max_color_attachments, 8);

        let info = dx11_device_info(
            &adapter(DxgiAdapterFlags::empty()),
            Dx11FeatureLevel::Level10_1,
        );
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::Unknown);
        assert!(!info.features.compute_shader);
        assert!(!info.features.tessellation_shader);
    }
}
