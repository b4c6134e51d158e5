//! `VkNative` over the system Vulkan loader, through `ash`

use super::native::*;
use crate::{PrismBackendType, PrismError, PrismNativeError, PrismNativeHandle, PrismResult};
use ash::extensions::ext::DebugUtils;
use ash::vk;
use ash::vk::Handle;
use fnv::FnvHashMap;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::{Arc, Mutex};

fn native_error(
    operation: &'static str,
    message: impl Into<String>,
) -> PrismError {
    PrismNativeError::new(Some(PrismBackendType::Vulkan), operation, 0, message).into()
}

fn to_cstrings(names: &[String]) -> PrismResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|_| native_error("CString::new", format!("invalid name {:?}", name)))
        })
        .collect()
}

fn gpu_allocator_location(memory_location: VkMemoryLocation) -> MemoryLocation {
    match memory_location {
        VkMemoryLocation::GpuOnly => MemoryLocation::GpuOnly,
        VkMemoryLocation::CpuToGpu => MemoryLocation::CpuToGpu,
        VkMemoryLocation::GpuToCpu => MemoryLocation::GpuToCpu,
    }
}

unsafe fn c_chars_to_string(chars: &[c_char]) -> String {
    CStr::from_ptr(chars.as_ptr()).to_string_lossy().into_owned()
}

type DebugMessages = Mutex<Vec<VkDebugMessage>>;

/// Queues messages for `take_debug_messages`. Must never panic, it's called from the driver.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = &*p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        String::default()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_string_lossy()
            .into_owned()
    };
    let message = if callback_data.p_message.is_null() {
        String::default()
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_string_lossy()
            .into_owned()
    };

    let messages = &*(p_user_data as *const DebugMessages);
    if let Ok(mut messages) = messages.lock() {
        messages.push(VkDebugMessage {
            severity: VkDebugSeverityFlags::from_bits_truncate(message_severity.as_raw()),
            message_id_number: callback_data.message_id_number,
            message_id_name,
            message,
        });
    }

    vk::FALSE
}

/// The system Vulkan loader
pub struct AshVkNative {
    entry: ash::Entry,
}

impl AshVkNative {
    /// Loads the Vulkan loader library. Fails if no Vulkan runtime is installed.
    pub fn new() -> PrismResult<Self> {
        let entry = unsafe { ash::Entry::load()? };
        Ok(AshVkNative { entry })
    }
}

impl VkNative for AshVkNative {
    fn instance_version(&self) -> PrismResult<u32> {
        Ok(self
            .entry
            .try_enumerate_instance_version()?
            .unwrap_or(VK_API_VERSION_1_0))
    }

    fn enumerate_instance_layers(&self) -> PrismResult<Vec<String>> {
        let layers = self.entry.enumerate_instance_layer_properties()?;
        Ok(layers
            .iter()
            .map(|layer| unsafe { c_chars_to_string(&layer.layer_name) })
            .collect())
    }

    fn enumerate_instance_extensions(&self) -> PrismResult<Vec<String>> {
        let extensions = self.entry.enumerate_instance_extension_properties(None)?;
        Ok(extensions
            .iter()
            .map(|extension| unsafe { c_chars_to_string(&extension.extension_name) })
            .collect())
    }

    fn create_instance(
        &self,
        desc: &VkInstanceDesc,
    ) -> PrismResult<Box<dyn VkNativeInstance>> {
        let app_name = CString::new(desc.application_name.as_str())
            .map_err(|_| native_error("vkCreateInstance", "invalid application name"))?;
        let appinfo = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(0)
            .engine_name(&app_name)
            .engine_version(0)
            .api_version(desc.api_version);

        let layer_names = to_cstrings(&desc.enabled_layers)?;
        let layer_name_ptrs: Vec<_> = layer_names.iter().map(|x| x.as_ptr()).collect();
        let extension_names = to_cstrings(&desc.enabled_extensions)?;
        let extension_name_ptrs: Vec<_> = extension_names.iter().map(|x| x.as_ptr()).collect();

        let enabled_validation_features: Vec<_> = desc
            .validation_features
            .iter()
            .map(|feature| match feature {
                VkValidationFeatureEnable::GpuAssisted => {
                    vk::ValidationFeatureEnableEXT::GPU_ASSISTED
                }
                VkValidationFeatureEnable::GpuAssistedReserveBindingSlot => {
                    vk::ValidationFeatureEnableEXT::GPU_ASSISTED_RESERVE_BINDING_SLOT
                }
                VkValidationFeatureEnable::SynchronizationValidation => {
                    vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION
                }
            })
            .collect();
        let mut validation_features = vk::ValidationFeaturesEXT::builder()
            .enabled_validation_features(&enabled_validation_features);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&appinfo)
            .enabled_layer_names(&layer_name_ptrs)
            .enabled_extension_names(&extension_name_ptrs);
        if !enabled_validation_features.is_empty() {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { self.entry.create_instance(&create_info, None)? };

        let messages = Arc::new(DebugMessages::default());
        let debug_utils = if desc
            .enabled_extensions
            .iter()
            .any(|extension| extension == "VK_EXT_debug_utils")
        {
            Some(DebugUtils::new(&self.entry, &instance))
        } else {
            None
        };

        let mut debug_messenger = None;
        if let Some(debug_utils) = &debug_utils {
            if !desc.debug_severity.is_empty() {
                log::info!("Setting up vulkan debug callback");
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                    .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
                        desc.debug_severity.bits(),
                    ))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(vulkan_debug_callback))
                    .user_data(Arc::as_ptr(&messages) as *mut c_void);

                match unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) } {
                    Ok(messenger) => debug_messenger = Some(messenger),
                    Err(e) => log::warn!("Could not create the debug utils messenger: {:?}", e),
                }
            }
        }

        Ok(Box::new(AshVkInstance {
            instance,
            debug_utils,
            debug_messenger,
            messages,
        }))
    }
}

struct AshVkInstance {
    instance: ash::Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    // Read by the debug callback, must outlive the messenger
    messages: Arc<DebugMessages>,
}

impl Drop for AshVkInstance {
    fn drop(&mut self) {
        log::trace!("destroying VkInstance");
        unsafe {
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils, self.debug_messenger.take())
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
        log::trace!("destroyed VkInstance");
    }
}

impl AshVkInstance {
    fn physical_devices(&self) -> PrismResult<Vec<vk::PhysicalDevice>> {
        Ok(unsafe { self.instance.enumerate_physical_devices()? })
    }

    fn query_physical_device(
        &self,
        index: u32,
        physical_device: vk::PhysicalDevice,
    ) -> PrismResult<VkPhysicalDeviceDesc> {
        let properties = unsafe {
            self.instance
                .get_physical_device_properties(physical_device)
        };
        let features = unsafe { self.instance.get_physical_device_features(physical_device) };
        let queue_families = unsafe {
            self.instance
                .get_physical_device_queue_family_properties(physical_device)
        };
        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(physical_device)?
        };

        let device_type = match properties.device_type {
            vk::PhysicalDeviceType::INTEGRATED_GPU => VkPhysicalDeviceType::IntegratedGpu,
            vk::PhysicalDeviceType::DISCRETE_GPU => VkPhysicalDeviceType::DiscreteGpu,
            vk::PhysicalDeviceType::VIRTUAL_GPU => VkPhysicalDeviceType::VirtualGpu,
            vk::PhysicalDeviceType::CPU => VkPhysicalDeviceType::Cpu,
            _ => VkPhysicalDeviceType::Other,
        };

        let limits = &properties.limits;
        Ok(VkPhysicalDeviceDesc {
            index,
            device_name: unsafe { c_chars_to_string(&properties.device_name) },
            device_type,
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            queue_families: queue_families
                .iter()
                .map(|queue_family| VkQueueFamilyDesc {
                    queue_flags: VkQueueFlags::from_bits_truncate(
                        queue_family.queue_flags.as_raw(),
                    ),
                    queue_count: queue_family.queue_count,
                })
                .collect(),
            features: VkPhysicalDeviceFeatures {
                independent_blend: features.independent_blend != 0,
                geometry_shader: features.geometry_shader != 0,
                tessellation_shader: features.tessellation_shader != 0,
                multi_viewport: features.multi_viewport != 0,
                full_draw_index_uint32: features.full_draw_index_uint32 != 0,
                multi_draw_indirect: features.multi_draw_indirect != 0,
                fill_mode_non_solid: features.fill_mode_non_solid != 0,
                sampler_anisotropy: features.sampler_anisotropy != 0,
                texture_compression_bc: features.texture_compression_bc != 0,
                texture_compression_etc2: features.texture_compression_etc2 != 0,
                texture_compression_astc_ldr: features.texture_compression_astc_ldr != 0,
                image_cube_array: features.image_cube_array != 0,
            },
            limits: VkPhysicalDeviceLimits {
                max_image_dimension_1d: limits.max_image_dimension1_d,
                max_image_dimension_2d: limits.max_image_dimension2_d,
                max_image_dimension_3d: limits.max_image_dimension3_d,
                max_image_dimension_cube: limits.max_image_dimension_cube,
                max_image_array_layers: limits.max_image_array_layers,
                max_color_attachments: limits.max_color_attachments,
                max_viewports: limits.max_viewports,
                max_viewport_dimensions: limits.max_viewport_dimensions,
                max_uniform_buffer_range: limits.max_uniform_buffer_range,
                min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
                min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
                max_sampler_anisotropy: limits.max_sampler_anisotropy,
                max_vertex_input_bindings: limits.max_vertex_input_bindings,
                max_tessellation_patch_size: limits.max_tessellation_patch_size,
                max_compute_shared_memory_size: limits.max_compute_shared_memory_size,
                max_compute_work_group_count: limits.max_compute_work_group_count,
                max_compute_work_group_invocations: limits.max_compute_work_group_invocations,
                max_compute_work_group_size: limits.max_compute_work_group_size,
            },
            extensions: extensions
                .iter()
                .map(|extension| unsafe { c_chars_to_string(&extension.extension_name) })
                .collect(),
        })
    }
}

impl VkNativeInstance for AshVkInstance {
    fn enumerate_physical_devices(&self) -> PrismResult<Vec<VkPhysicalDeviceDesc>> {
        self.physical_devices()?
            .into_iter()
            .enumerate()
            .map(|(index, physical_device)| self.query_physical_device(index as u32, physical_device))
            .collect()
    }

    fn create_device(
        &self,
        physical_device_desc: &VkPhysicalDeviceDesc,
        desc: &VkDeviceDesc,
    ) -> PrismResult<Box<dyn VkNativeDevice>> {
        let physical_device = self
            .physical_devices()?
            .get(physical_device_desc.index as usize)
            .copied()
            .ok_or_else(|| native_error("vkCreateDevice", "physical device no longer exists"))?;

        let queue_create_infos: Vec<_> = desc
            .queue_create_infos
            .iter()
            .map(|queue_create_info| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(queue_create_info.queue_family_index)
                    .queue_priorities(&queue_create_info.queue_priorities)
                    .build()
            })
            .collect();

        let extension_names = to_cstrings(&desc.enabled_extensions)?;
        let extension_name_ptrs: Vec<_> = extension_names.iter().map(|x| x.as_ptr()).collect();

        let f = &desc.enabled_features;
        let features = vk::PhysicalDeviceFeatures::builder()
            .independent_blend(f.independent_blend)
            .geometry_shader(f.geometry_shader)
            .tessellation_shader(f.tessellation_shader)
            .multi_viewport(f.multi_viewport)
            .full_draw_index_uint32(f.full_draw_index_uint32)
            .multi_draw_indirect(f.multi_draw_indirect)
            .fill_mode_non_solid(f.fill_mode_non_solid)
            .sampler_anisotropy(f.sampler_anisotropy)
            .texture_compression_bc(f.texture_compression_bc)
            .texture_compression_etc2(f.texture_compression_etc2)
            .texture_compression_astc_ldr(f.texture_compression_astc_ldr)
            .image_cube_array(f.image_cube_array);

        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_name_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            self.instance
                .create_device(physical_device, &device_create_info, None)?
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: self.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        Ok(Box::new(AshVkDevice {
            device,
            debug_utils: self.debug_utils.clone(),
            allocator: Mutex::new(Some(allocator)),
            allocations: Mutex::new(FnvHashMap::default()),
        }))
    }

    fn take_debug_messages(&self) -> Vec<VkDebugMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

struct AshAllocation {
    object_type: vk::ObjectType,
    allocation: Allocation,
}

struct AshVkDevice {
    device: ash::Device,
    debug_utils: Option<DebugUtils>,
    // Taken in `destroy`, it must be dropped before the device is
    allocator: Mutex<Option<Allocator>>,
    // Keyed by the raw buffer or image handle
    allocations: Mutex<FnvHashMap<u64, AshAllocation>>,
}

impl AshVkDevice {
    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        memory_location: VkMemoryLocation,
        linear: bool,
    ) -> PrismResult<Allocation> {
        let mut allocator = self.allocator.lock().unwrap();
        let allocator = allocator
            .as_mut()
            .ok_or_else(|| native_error("vkAllocateMemory", "the device has been destroyed"))?;

        Ok(allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: gpu_allocator_location(memory_location),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    }

    fn free(
        &self,
        allocation: Allocation,
    ) {
        if let Some(allocator) = self.allocator.lock().unwrap().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::error!("Failed to free vulkan allocation: {}", e);
            }
        }
    }
}

impl VkNativeDevice for AshVkDevice {
    fn get_device_queue(
        &self,
        queue_family_index: u32,
        queue_index: u32,
    ) -> PrismNativeHandle {
        let queue = unsafe {
            self.device
                .get_device_queue(queue_family_index, queue_index)
        };
        PrismNativeHandle(queue.as_raw())
    }

    fn create_buffer(
        &self,
        desc: &VkBufferDesc,
        memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(vk::BufferUsageFlags::from_raw(desc.usage.bits()))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = self.device.create_buffer(&create_info, None)?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = match self.allocate("buffer", requirements, memory_location, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) =
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                self.device.destroy_buffer(buffer, None);
                self.free(allocation);
                return Err(e.into());
            }

            self.allocations.lock().unwrap().insert(
                buffer.as_raw(),
                AshAllocation {
                    object_type: vk::ObjectType::BUFFER,
                    allocation,
                },
            );
            Ok(PrismNativeHandle(buffer.as_raw()))
        }
    }

    fn create_image(
        &self,
        desc: &VkImageDesc,
        memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle> {
        let image_type = match desc.image_type {
            VkImageType::Type1D => vk::ImageType::TYPE_1D,
            VkImageType::Type2D => vk::ImageType::TYPE_2D,
            VkImageType::Type3D => vk::ImageType::TYPE_3D,
        };
        let tiling = match desc.tiling {
            VkImageTiling::Optimal => vk::ImageTiling::OPTIMAL,
            VkImageTiling::Linear => vk::ImageTiling::LINEAR,
        };

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .format(vk::Format::from_raw(desc.format.0))
            .extent(vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: desc.extent[2],
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::from_raw(desc.samples))
            .tiling(tiling)
            .usage(vk::ImageUsageFlags::from_raw(desc.usage.bits()))
            .flags(vk::ImageCreateFlags::from_raw(desc.flags.bits()))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = self.device.create_image(&create_info, None)?;
            let requirements = self.device.get_image_memory_requirements(image);
            let linear = tiling == vk::ImageTiling::LINEAR;
            let allocation = match self.allocate("image", requirements, memory_location, linear) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) =
                self.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                self.device.destroy_image(image, None);
                self.free(allocation);
                return Err(e.into());
            }

            self.allocations.lock().unwrap().insert(
                image.as_raw(),
                AshAllocation {
                    object_type: vk::ObjectType::IMAGE,
                    allocation,
                },
            );
            Ok(PrismNativeHandle(image.as_raw()))
        }
    }

    fn write_buffer_data(
        &self,
        buffer: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()> {
        let mut allocations = self.allocations.lock().unwrap();
        let mapped = allocations
            .get_mut(&buffer.0)
            .ok_or_else(|| native_error("vkMapMemory", "unknown buffer"))?
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| native_error("vkMapMemory", "buffer is not host visible"))?;

        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= mapped.len())
            .ok_or_else(|| {
                native_error(
                    "vkMapMemory",
                    format!(
                        "writing {} bytes at offset {} overruns the {} byte allocation",
                        data.len(),
                        offset,
                        mapped.len()
                    ),
                )
            })?;
        mapped[start..end].copy_from_slice(data);

        Ok(())
    }

    fn set_device_name(
        &self,
        name: &str,
    ) {
        self.set_name(vk::ObjectType::DEVICE, self.device.handle().as_raw(), name);
    }

    fn set_object_name(
        &self,
        object: PrismNativeHandle,
        name: &str,
    ) {
        let object_type = self
            .allocations
            .lock()
            .unwrap()
            .get(&object.0)
            .map(|allocation| allocation.object_type);

        if let Some(object_type) = object_type {
            self.set_name(object_type, object.0, name);
        }
    }

    fn destroy_buffer(
        &self,
        buffer: PrismNativeHandle,
    ) {
        let allocation = self.allocations.lock().unwrap().remove(&buffer.0);
        unsafe {
            self.device
                .destroy_buffer(vk::Buffer::from_raw(buffer.0), None);
        }
        if let Some(allocation) = allocation {
            self.free(allocation.allocation);
        }
    }

    fn destroy_image(
        &self,
        image: PrismNativeHandle,
    ) {
        let allocation = self.allocations.lock().unwrap().remove(&image.0);
        unsafe {
            self.device
                .destroy_image(vk::Image::from_raw(image.0), None);
        }
        if let Some(allocation) = allocation {
            self.free(allocation.allocation);
        }
    }

    fn wait_idle(&self) -> PrismResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn destroy(&self) {
        let remaining = self.allocations.lock().unwrap().len();
        if remaining > 0 {
            log::warn!(
                "Destroying vulkan device with {} buffers or images still alive",
                remaining
            );
        }

        // Frees the allocator's memory blocks
        self.allocator.lock().unwrap().take();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl AshVkDevice {
    fn set_name(
        &self,
        object_type: vk::ObjectType,
        object_handle: u64,
        name: &str,
    ) {
        let debug_utils = match &self.debug_utils {
            Some(debug_utils) => debug_utils,
            None => return,
        };

        if let Ok(name) = CString::new(name) {
            let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
                .object_type(object_type)
                .object_handle(object_handle)
                .object_name(&name);
            unsafe {
                if let Err(e) =
                    debug_utils.set_debug_utils_object_name(self.device.handle(), &name_info)
                {
                    log::debug!("vkSetDebugUtilsObjectNameEXT failed: {:?}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_access_picks_allocator_location() {
        use super::super::buffer::vk_memory_location;
        use crate::PrismCpuAccess;

        assert_eq!(
            gpu_allocator_location(vk_memory_location(PrismCpuAccess::None)),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            gpu_allocator_location(vk_memory_location(PrismCpuAccess::Write)),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            gpu_allocator_location(vk_memory_location(PrismCpuAccess::Read)),
            MemoryLocation::GpuToCpu
        );
    }
}
