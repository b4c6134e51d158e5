use super::device_context::{DX12_BREAK_ON_MESSAGE_IDS, DX12_DENIED_MESSAGE_IDS};
use super::native::*;
use crate::dx12::{PrismDeviceContextDx12, PrismDeviceContextDx12Inner};
use crate::dxgi::{adapters_in_preference_order, DxgiAdapter};
use crate::internal_shared::release_device_inner;
use crate::{
    PrismAdapterInfo, PrismAdapterType, PrismBackendRegistry, PrismBackendType, PrismDeviceDef,
    PrismDeviceFeatures, PrismDeviceInfo, PrismDeviceLimits, PrismError, PrismResult,
    PrismValidationMode, PrismValidationSeverity, PrismVendor,
};
use std::sync::Arc;

const DX12_MINIMUM_FEATURE_LEVEL: Dx12FeatureLevel = Dx12FeatureLevel::Level11_0;

/// Returns true if a non-software adapter can create a D3D12 device at feature level 11_0
pub(crate) fn is_dx12_supported(registry: &PrismBackendRegistry) -> bool {
    if !registry.platform().is_windows() {
        return false;
    }

    let native = match registry.dx12_native() {
        Some(native) => native,
        None => return false,
    };

    if !native.meets_os_requirements() {
        log::debug!("D3D12 not supported, the OS build is too old");
        return false;
    }

    let factory = match native.create_dxgi_factory(false) {
        Ok(factory) => factory,
        Err(e) => {
            log::debug!("D3D12 not supported, could not create DXGI factory: {}", e);
            return false;
        }
    };

    let adapters = match factory.enum_adapters() {
        Ok(adapters) => adapters,
        Err(e) => {
            log::debug!("D3D12 not supported, could not enumerate adapters: {}", e);
            return false;
        }
    };

    adapters.iter().any(|adapter| {
        !adapter.desc.is_software()
            && native.is_feature_level_supported(adapter, DX12_MINIMUM_FEATURE_LEVEL)
    })
}

fn enable_debug_layer(
    native: &dyn Dx12Native,
    validation_mode: PrismValidationMode,
) -> bool {
    let debug = match native.get_debug_interface() {
        Ok(debug) => debug,
        Err(e) => {
            log::warn!(
                "D3D12 validation was requested but D3D12GetDebugInterface failed ({}), continuing without validation",
                e
            );
            return false;
        }
    };

    debug.enable_debug_layer();

    if validation_mode == PrismValidationMode::Gpu {
        if !debug.set_enable_gpu_based_validation(true) {
            log::warn!("D3D12 GPU-based validation is not available");
        }

        if !debug.set_enable_synchronized_command_queue_validation(true) {
            log::warn!("D3D12 synchronized command queue validation is not available");
        }
    }

    true
}

fn select_adapter(
    native: &dyn Dx12Native,
    adapters: Vec<DxgiAdapter>,
) -> Option<DxgiAdapter> {
    for adapter in adapters {
        adapter.log_info();

        if adapter.desc.is_software() {
            continue;
        }

        if native.is_feature_level_supported(&adapter, DX12_MINIMUM_FEATURE_LEVEL) {
            return Some(adapter);
        }
    }

    None
}

pub(crate) fn dx12_device_info(
    adapter: &DxgiAdapter,
    feature_level: Dx12FeatureLevel,
    architecture: Option<Dx12Architecture>,
    options5: Option<Dx12Options5>,
) -> PrismDeviceInfo {
    let adapter_type = if adapter.desc.is_software() {
        PrismAdapterType::Cpu
    } else {
        match architecture {
            Some(architecture) if architecture.uma => PrismAdapterType::IntegratedGpu,
            Some(_) => PrismAdapterType::DiscreteGpu,
            None => PrismAdapterType::Unknown,
        }
    };

    let driver_description = match adapter.driver_version_string() {
        Some(version) => format!("D3D12 driver {}", version),
        None => format!("Direct3D 12 (feature level {})", feature_level.as_str()),
    };

    let adapter_info = PrismAdapterInfo {
        vendor_id: adapter.desc.vendor_id,
        device_id: adapter.desc.device_id,
        name: adapter.desc.description.clone(),
        adapter_type,
        driver_description,
    };

    let options5 = options5.unwrap_or_default();
    let render_passes = options5.render_pass_tier > 0
        && PrismVendor::from_vendor_id(adapter.desc.vendor_id) != PrismVendor::Intel;

    let features = PrismDeviceFeatures {
        independent_blend: true,
        compute_shader: true,
        tessellation_shader: true,
        multi_viewport: true,
        index_type_uint32: true,
        multi_draw_indirect: true,
        fill_mode_non_solid: true,
        sampler_anisotropy: true,
        texture_compression_bc: true,
        texture_compression_etc2: false,
        texture_compression_astc_ldr: false,
        texture_cube_array: true,
        raytracing: options5.raytracing_tier >= DX12_RAYTRACING_TIER_1_0,
        render_passes,
    };

    // D3D12_REQ_* limits
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

pub struct PrismDeviceDx12 {
    device_context: Option<PrismDeviceContextDx12>,
}

impl Drop for PrismDeviceDx12 {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl PrismDeviceDx12 {
    pub fn device_context(&self) -> PrismResult<&PrismDeviceContextDx12> {
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
        profiling::scope!("PrismDeviceDx12::new");

        let native = registry
            .dx12_native()
            .ok_or(PrismError::UnsupportedBackend(PrismBackendType::Dx12))?;

        // The debug layer must be enabled before the device is created
        let validation_enabled = device_def.validation_mode.is_enabled()
            && enable_debug_layer(&**native, device_def.validation_mode);

        let factory = registry.dx12_dxgi_factory(validation_enabled)?;
        let adapters = adapters_in_preference_order(&*factory, device_def.power_preference)?;

        let adapter = match select_adapter(&**native, adapters) {
            Some(adapter) => adapter,
            None => {
                log::info!("No hardware D3D12 adapter available, using the WARP adapter");
                factory.enum_warp_adapter().map_err(|e| {
                    PrismError::NoCompatibleAdapter(format!(
                        "No Direct3D 12 adapter found and WARP12 is not available: {}",
                        e
                    ))
                })?
            }
        };

        let native_device = native.create_device(&adapter, DX12_MINIMUM_FEATURE_LEVEL)?;
        let feature_level = native_device.max_feature_level();

        log::info!(
            "Created D3D12 device on {:?} at feature level {}",
            adapter.desc.description,
            feature_level.as_str()
        );

        if validation_enabled {
            if let Err(e) = native_device.configure_info_queue(
                &[
                    PrismValidationSeverity::Corruption,
                    PrismValidationSeverity::Error,
                ],
                &DX12_DENIED_MESSAGE_IDS,
                &DX12_BREAK_ON_MESSAGE_IDS,
            ) {
                log::warn!("Could not configure the D3D12 info queue: {}", e);
            }

            if device_def.validation_mode == PrismValidationMode::Gpu {
                if let Err(e) = native_device
                    .configure_gpu_based_validation(Dx12ShaderPatchMode::UnguardedValidation)
                {
                    log::warn!("Could not configure D3D12 GPU-based validation: {}", e);
                }
            }
        }

        if let Some(label) = &device_def.label {
            native_device.set_device_name(label);
        }

        let architecture = native_device
            .check_architecture()
            .map_err(|e| log::debug!("D3D12_FEATURE_ARCHITECTURE query failed: {}", e))
            .ok();
        let options5 = native_device
            .check_options5()
            .map_err(|e| log::debug!("D3D12_FEATURE_D3D12_OPTIONS5 query failed: {}", e))
            .ok();

        let device_info = dx12_device_info(&adapter, feature_level, architecture, options5);
        let inner = Arc::new(PrismDeviceContextDx12Inner::new(
            device_info,
            native_device,
            feature_level,
            registry.validation_sink(),
        ));

        Ok(PrismDeviceDx12 {
            device_context: Some(PrismDeviceContextDx12::new(inner)),
        })
    }

    pub fn destroy(&mut self) {
        if let Some(device_context) = self.device_context.take() {
            if let Err(e) = device_context.wait_idle() {
                log::warn!("Failed to wait for D3D12 device idle: {}", e);
            }

            let inner = device_context.inner.clone();

            // This should be the final device context
            std::mem::drop(device_context);

            release_device_inner(inner, PrismBackendType::Dx12);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxgi::{DxgiAdapterDesc, DxgiAdapterFlags};

    fn adapter(vendor_id: u32) -> DxgiAdapter {
        DxgiAdapter {
            index: 0,
            desc: DxgiAdapterDesc {
                description: "Test GPU".to_string(),
                vendor_id,
                device_id: 1,
                sub_sys_id: 0,
                revision: 0,
                dedicated_video_memory: 0,
                dedicated_system_memory: 0,
                shared_system_memory: 0,
                flags: DxgiAdapterFlags::empty(),
            },
            umd_version: Some((31u64 << 48) | (101u64 << 16) | 4502),
        }
    }

    #[test]
    fn test_uma_is_integrated() {
        let info = dx12_device_info(
            &adapter(0x1002),
            Dx12FeatureLevel::Level12_1,
            Some(Dx12Architecture {
                uma: true,
                cache_coherent_uma: true,
            }),
            None,
        );
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::IntegratedGpu);
        assert_eq!(info.adapter_info.driver_description, "D3D12 driver 31.0.101.4502");
        assert!(!info.features.raytracing);
        assert!(!info.features.render_passes);
        assert_eq!(info.limits.min_uniform_buffer_offset_alignment, 256);
    }

    #[test]
    fn test_options5_features() {
        let options5 = Dx12Options5 {
            render_pass_tier: 1,
            raytracing_tier: DX12_RAYTRACING_TIER_1_0,
        };
        let info = dx12_device_info(
            &adapter(0x10DE),
            Dx12FeatureLevel::Level12_2,
            Some(Dx12Architecture::default()),
            Some(options5),
        );
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::DiscreteGpu);
        assert!(info.features.raytracing);
        assert!(info.features.render_passes);

        // Render passes are left disabled on Intel
        let info = dx12_device_info(
            &adapter(0x8086),
            Dx12FeatureLevel::Level12_2,
            None,
            Some(options5),
        );
        assert!(!info.features.render_passes);
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::Unknown);
    }
}
