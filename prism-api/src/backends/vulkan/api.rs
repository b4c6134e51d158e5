use super::instance::VK_MINIMUM_API_VERSION;
use super::native::*;
use crate::internal_shared::release_device_inner;
use crate::vulkan::{
    PrismDeviceContextVulkan, PrismDeviceContextVulkanInner, PrismVkInstance, VkQueueAllocation,
};
use crate::{
    PrismAdapterInfo, PrismAdapterType, PrismBackendRegistry, PrismBackendType, PrismDeviceDef,
    PrismDeviceFeatures, PrismDeviceInfo, PrismDeviceLimits, PrismError, PrismPowerPreference,
    PrismResult, PrismValidationMode, PrismVendor,
};
use std::sync::Arc;

const PORTABILITY_SUBSET_EXTENSION: &str = "VK_KHR_portability_subset";
const RAY_TRACING_PIPELINE_EXTENSION: &str = "VK_KHR_ray_tracing_pipeline";
const ACCELERATION_STRUCTURE_EXTENSION: &str = "VK_KHR_acceleration_structure";

/// Returns true if the loader supports Vulkan 1.1 and a non-CPU physical device reports API 1.1
pub(crate) fn is_vulkan_supported(registry: &PrismBackendRegistry) -> bool {
    let native = match registry.vulkan_native() {
        Some(native) => native,
        None => return false,
    };

    // A throwaway instance, so that the cached one gets the validation mode of the first device
    let check_instance = match PrismVkInstance::new(
        &**native,
        registry.application_name(),
        PrismValidationMode::Disabled,
    ) {
        Ok(instance) => instance,
        Err(e) => {
            log::debug!("Vulkan not supported, could not create an instance: {}", e);
            return false;
        }
    };

    let physical_devices = match check_instance.native_instance().enumerate_physical_devices() {
        Ok(physical_devices) => physical_devices,
        Err(e) => {
            log::debug!(
                "Vulkan not supported, could not enumerate physical devices: {}",
                e
            );
            return false;
        }
    };

    physical_devices.iter().any(|physical_device| {
        physical_device.device_type != VkPhysicalDeviceType::Cpu
            && physical_device.api_version >= VK_MINIMUM_API_VERSION
    })
}

fn is_physical_device_suitable(physical_device: &VkPhysicalDeviceDesc) -> bool {
    let has_graphics_queue = physical_device.queue_families.iter().any(|queue_family| {
        queue_family
            .queue_flags
            .contains(VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE)
    });

    let suitable = has_graphics_queue && physical_device.api_version >= VK_MINIMUM_API_VERSION;
    log::info!(
        "Found {} device '{}' Type: {:?} API: {} DriverVersion: {}",
        if suitable { "suitable" } else { "unsuitable" },
        physical_device.device_name,
        physical_device.device_type,
        vk_version_to_string(physical_device.api_version),
        driver_version_to_string(physical_device.vendor_id, physical_device.driver_version)
    );
    log::trace!("{:#?}", physical_device);

    suitable
}

/// Picks a physical device in enumeration order. With HighPerformance a discrete GPU wins as soon
/// as it is found, with LowPower an integrated GPU is preferred. CPU devices are only used if
/// nothing else is suitable.
pub(crate) fn select_physical_device(
    physical_devices: Vec<VkPhysicalDeviceDesc>,
    power_preference: PrismPowerPreference,
) -> Option<VkPhysicalDeviceDesc> {
    let mut first_suitable = None;
    let mut first_integrated = None;
    let mut first_cpu = None;

    for physical_device in physical_devices {
        if !is_physical_device_suitable(&physical_device) {
            continue;
        }

        match physical_device.device_type {
            VkPhysicalDeviceType::Cpu => {
                if first_cpu.is_none() {
                    first_cpu = Some(physical_device);
                }
                continue;
            }
            VkPhysicalDeviceType::DiscreteGpu
                if power_preference == PrismPowerPreference::HighPerformance =>
            {
                return Some(physical_device);
            }
            VkPhysicalDeviceType::IntegratedGpu
                if power_preference == PrismPowerPreference::LowPower =>
            {
                if first_integrated.is_none() {
                    first_integrated = Some(physical_device.clone());
                }
            }
            _ => {}
        }

        if first_suitable.is_none() {
            first_suitable = Some(physical_device);
        }
    }

    if let Some(physical_device) = first_integrated.or(first_suitable) {
        return Some(physical_device);
    }

    if let Some(physical_device) = &first_cpu {
        log::info!(
            "No hardware Vulkan device available, using the CPU device '{}'",
            physical_device.device_name
        );
    }

    first_cpu
}

/// NVIDIA packs its driver version as 10.8.8.6 bits, everyone else uses the vulkan version format
fn driver_version_to_string(
    vendor_id: u32,
    driver_version: u32,
) -> String {
    match PrismVendor::from_vendor_id(vendor_id) {
        PrismVendor::Nvidia => format!(
            "{}.{}.{}.{}",
            (driver_version >> 22) & 0x3FF,
            (driver_version >> 14) & 0xFF,
            (driver_version >> 6) & 0xFF,
            driver_version & 0x3F
        ),
        _ => vk_version_to_string(driver_version),
    }
}

pub(crate) fn vulkan_device_info(physical_device: &VkPhysicalDeviceDesc) -> PrismDeviceInfo {
    let adapter_type = match physical_device.device_type {
        VkPhysicalDeviceType::DiscreteGpu => PrismAdapterType::DiscreteGpu,
        VkPhysicalDeviceType::IntegratedGpu => PrismAdapterType::IntegratedGpu,
        VkPhysicalDeviceType::VirtualGpu => PrismAdapterType::VirtualGpu,
        VkPhysicalDeviceType::Cpu => PrismAdapterType::Cpu,
        VkPhysicalDeviceType::Other => PrismAdapterType::Unknown,
    };

    let adapter_info = PrismAdapterInfo {
        vendor_id: physical_device.vendor_id,
        device_id: physical_device.device_id,
        name: physical_device.device_name.clone(),
        adapter_type,
        driver_description: format!(
            "Vulkan {} driver {}",
            vk_version_to_string(physical_device.api_version),
            driver_version_to_string(physical_device.vendor_id, physical_device.driver_version)
        ),
    };

    let vk_features = &physical_device.features;
    let features = PrismDeviceFeatures {
        independent_blend: vk_features.independent_blend,
        // Guaranteed by the graphics|compute queue family the device was selected with
        compute_shader: true,
        tessellation_shader: vk_features.tessellation_shader,
        multi_viewport: vk_features.multi_viewport,
        index_type_uint32: vk_features.full_draw_index_uint32,
        multi_draw_indirect: vk_features.multi_draw_indirect,
        fill_mode_non_solid: vk_features.fill_mode_non_solid,
        sampler_anisotropy: vk_features.sampler_anisotropy,
        texture_compression_bc: vk_features.texture_compression_bc,
        texture_compression_etc2: vk_features.texture_compression_etc2,
        texture_compression_astc_ldr: vk_features.texture_compression_astc_ldr,
        texture_cube_array: vk_features.image_cube_array,
        raytracing: physical_device.supports_extension(RAY_TRACING_PIPELINE_EXTENSION)
            && physical_device.supports_extension(ACCELERATION_STRUCTURE_EXTENSION),
        render_passes: true,
    };

    let vk_limits = &physical_device.limits;
    let limits = PrismDeviceLimits {
        max_texture_dimension_1d: vk_limits.max_image_dimension_1d,
        max_texture_dimension_2d: vk_limits.max_image_dimension_2d,
        max_texture_dimension_3d: vk_limits.max_image_dimension_3d,
        max_texture_dimension_cube: vk_limits.max_image_dimension_cube,
        max_texture_array_layers: vk_limits.max_image_array_layers,
        max_color_attachments: vk_limits.max_color_attachments,
        max_viewports: vk_limits.max_viewports,
        max_viewport_dimensions: vk_limits.max_viewport_dimensions,
        max_uniform_buffer_range: vk_limits.max_uniform_buffer_range as u64,
        min_uniform_buffer_offset_alignment: vk_limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: vk_limits.min_storage_buffer_offset_alignment,
        max_sampler_anisotropy: vk_limits.max_sampler_anisotropy,
        max_vertex_input_bindings: vk_limits.max_vertex_input_bindings,
        max_tessellation_patch_size: vk_limits.max_tessellation_patch_size,
        max_compute_shared_memory_size: vk_limits.max_compute_shared_memory_size,
        max_compute_work_group_count: vk_limits.max_compute_work_group_count,
        max_compute_work_group_invocations: vk_limits.max_compute_work_group_invocations,
        max_compute_work_group_size: vk_limits.max_compute_work_group_size,
    };

    PrismDeviceInfo {
        adapter_info,
        features,
        limits,
    }
}

pub struct PrismDeviceVulkan {
    device_context: Option<PrismDeviceContextVulkan>,
}

impl Drop for PrismDeviceVulkan {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl PrismDeviceVulkan {
    pub fn device_context(&self) -> PrismResult<&PrismDeviceContextVulkan> {
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
        profiling::scope!("PrismDeviceVulkan::new");

        let instance = registry.vulkan_instance(device_def.validation_mode)?;
        if device_def.validation_mode.is_enabled() && !instance.validation_enabled() {
            log::warn!("Vulkan validation was requested but the instance was created without it");
        }

        let physical_devices = instance.native_instance().enumerate_physical_devices()?;
        if physical_devices.is_empty() {
            return Err(PrismError::NoCompatibleAdapter(
                "The Vulkan instance reported no physical devices".to_string(),
            ));
        }

        let physical_device =
            select_physical_device(physical_devices, device_def.power_preference).ok_or_else(
                || {
                    PrismError::NoCompatibleAdapter(
                        "No Vulkan physical device supports Vulkan 1.1 with a graphics queue"
                            .to_string(),
                    )
                },
            )?;

        log::info!(
            "Using Vulkan physical device '{}' ({:?})",
            physical_device.device_name,
            physical_device.device_type
        );

        let queue_allocation = VkQueueAllocation::allocate(&physical_device.queue_families)?;

        // Mandatory when the implementation exposes it
        let mut enabled_extensions = Vec::default();
        if physical_device.supports_extension(PORTABILITY_SUBSET_EXTENSION) {
            enabled_extensions.push(PORTABILITY_SUBSET_EXTENSION.to_string());
        }

        let device_desc = VkDeviceDesc {
            queue_create_infos: queue_allocation.queue_create_infos.clone(),
            enabled_extensions,
            enabled_features: physical_device.features,
        };

        let native_device = instance
            .native_instance()
            .create_device(&physical_device, &device_desc)?;

        if let Some(label) = &device_def.label {
            native_device.set_device_name(label);
        }

        let device_info = vulkan_device_info(&physical_device);
        let inner = Arc::new(PrismDeviceContextVulkanInner::new(
            device_info,
            instance,
            physical_device,
            native_device,
            queue_allocation,
            registry.validation_sink(),
        ));

        Ok(PrismDeviceVulkan {
            device_context: Some(PrismDeviceContextVulkan::new(inner)),
        })
    }

    pub fn destroy(&mut self) {
        if let Some(device_context) = self.device_context.take() {
            if let Err(e) = device_context.wait_idle() {
                log::warn!("Failed to wait for Vulkan device idle: {}", e);
            }

            let inner = device_context.inner.clone();

            // This should be the final device context
            std::mem::drop(device_context);

            release_device_inner(inner, PrismBackendType::Vulkan);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physical_device(
        index: u32,
        device_type: VkPhysicalDeviceType,
    ) -> VkPhysicalDeviceDesc {
        VkPhysicalDeviceDesc {
            index,
            device_name: format!("Device {}", index),
            device_type,
            vendor_id: 0x10DE,
            device_id: index,
            api_version: VK_API_VERSION_1_2,
            driver_version: (535 << 22) | (104 << 14),
            queue_families: vec![VkQueueFamilyDesc {
                queue_flags: VkQueueFlags::all(),
                queue_count: 1,
            }],
            features: VkPhysicalDeviceFeatures::default(),
            limits: VkPhysicalDeviceLimits::default(),
            extensions: Vec::default(),
        }
    }

    #[test]
    fn test_high_performance_prefers_discrete() {
        let devices = vec![
            physical_device(0, VkPhysicalDeviceType::IntegratedGpu),
            physical_device(1, VkPhysicalDeviceType::DiscreteGpu),
        ];
        let selected =
            select_physical_device(devices, PrismPowerPreference::HighPerformance).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn test_low_power_prefers_integrated() {
        let devices = vec![
            physical_device(0, VkPhysicalDeviceType::DiscreteGpu),
            physical_device(1, VkPhysicalDeviceType::IntegratedGpu),
        ];
        let selected = select_physical_device(devices, PrismPowerPreference::LowPower).unwrap();
        assert_eq!(selected.index, 1);

        let devices = vec![
            physical_device(0, VkPhysicalDeviceType::DiscreteGpu),
            physical_device(1, VkPhysicalDeviceType::IntegratedGpu),
        ];
        let selected = select_physical_device(devices, PrismPowerPreference::NoPreference).unwrap();
        assert_eq!(selected.index, 0);
    }

    #[test]
    fn test_cpu_device_is_last_resort() {
        let devices = vec![
            physical_device(0, VkPhysicalDeviceType::Cpu),
            physical_device(1, VkPhysicalDeviceType::VirtualGpu),
        ];
        let selected =
            select_physical_device(devices, PrismPowerPreference::HighPerformance).unwrap();
        assert_eq!(selected.index, 1);

        let devices = vec![physical_device(0, VkPhysicalDeviceType::Cpu)];
        let selected =
            select_physical_device(devices, PrismPowerPreference::HighPerformance).unwrap();
        assert_eq!(selected.device_type, VkPhysicalDeviceType::Cpu);
    }

    #[test]
    fn test_unsuitable_devices_are_skipped() {
        let mut old_device = physical_device(0, VkPhysicalDeviceType::DiscreteGpu);
        old_device.api_version = VK_API_VERSION_1_0;
        let mut no_graphics = physical_device(1, VkPhysicalDeviceType::DiscreteGpu);
        no_graphics.queue_families[0].queue_flags = VkQueueFlags::COMPUTE;

        assert!(select_physical_device(
            vec![old_device, no_graphics],
            PrismPowerPreference::HighPerformance
        )
        .is_none());
    }

    #[test]
    fn test_vulkan_device_info() {
        let mut device = physical_device(0, VkPhysicalDeviceType::DiscreteGpu);
        device.limits.min_uniform_buffer_offset_alignment = 64;
        device.features.sampler_anisotropy = true;
        device.extensions = vec![
            RAY_TRACING_PIPELINE_EXTENSION.to_string(),
            ACCELERATION_STRUCTURE_EXTENSION.to_string(),
        ];

        let info = vulkan_device_info(&device);
        assert_eq!(info.adapter_info.adapter_type, PrismAdapterType::DiscreteGpu);
        assert_eq!(
            info.adapter_info.driver_description,
            "Vulkan 1.2.0 driver 535.104.0.0"
        );
        assert_eq!(info.limits.min_uniform_buffer_offset_alignment, 64);
        assert!(info.features.sampler_anisotropy);
        assert!(info.features.raytracing);
        assert!(info.features.render_passes);
        assert!(!info.features.tessellation_shader);
    }
}
