use super::{ReferenceObjectKind, ReferenceObjectTracker};
use crate::vulkan::*;
use crate::{PrismBackendType, PrismNativeError, PrismNativeHandle, PrismResult};
use fnv::FnvHashSet;
use std::sync::{Arc, Mutex};

const VK_ERROR_OUT_OF_DEVICE_MEMORY: i64 = -2;
const VK_ERROR_INITIALIZATION_FAILED: i64 = -3;
const VK_ERROR_MEMORY_MAP_FAILED: i64 = -5;
const VK_ERROR_LAYER_NOT_PRESENT: i64 = -6;
const VK_ERROR_EXTENSION_NOT_PRESENT: i64 = -7;

fn vk_error(
    operation: &'static str,
    code: i64,
    message: impl Into<String>,
) -> PrismNativeError {
    PrismNativeError::new(Some(PrismBackendType::Vulkan), operation, code, message)
}

/// A physical device with the limits and queue families of a typical desktop GPU: one family with
/// everything, a dedicated transfer family and an async compute family
pub fn reference_physical_device(
    device_name: &str,
    device_type: VkPhysicalDeviceType,
) -> VkPhysicalDeviceDesc {
    VkPhysicalDeviceDesc {
        index: 0,
        device_name: device_name.to_string(),
        device_type,
        vendor_id: 0x1002,
        device_id: 0x73bf,
        api_version: VK_API_VERSION_1_2,
        driver_version: vk_make_api_version(2, 0, 279),
        queue_families: vec![
            VkQueueFamilyDesc {
                queue_flags: VkQueueFlags::GRAPHICS
                    | VkQueueFlags::COMPUTE
                    | VkQueueFlags::TRANSFER
                    | VkQueueFlags::SPARSE_BINDING,
                queue_count: 1,
            },
            VkQueueFamilyDesc {
                queue_flags: VkQueueFlags::COMPUTE
                    | VkQueueFlags::TRANSFER
                    | VkQueueFlags::SPARSE_BINDING,
                queue_count: 4,
            },
            VkQueueFamilyDesc {
                queue_flags: VkQueueFlags::TRANSFER | VkQueueFlags::SPARSE_BINDING,
                queue_count: 2,
            },
        ],
        features: VkPhysicalDeviceFeatures {
            independent_blend: true,
            geometry_shader: true,
            tessellation_shader: true,
            multi_viewport: true,
            full_draw_index_uint32: true,
            multi_draw_indirect: true,
            fill_mode_non_solid: true,
            sampler_anisotropy: true,
            texture_compression_bc: true,
            texture_compression_etc2: false,
            texture_compression_astc_ldr: false,
            image_cube_array: true,
        },
        limits: VkPhysicalDeviceLimits {
            max_image_dimension_1d: 16384,
            max_image_dimension_2d: 16384,
            max_image_dimension_3d: 2048,
            max_image_dimension_cube: 16384,
            max_image_array_layers: 2048,
            max_color_attachments: 8,
            max_viewports: 16,
            max_viewport_dimensions: [16384, 16384],
            max_uniform_buffer_range: 65536,
            min_uniform_buffer_offset_alignment: 64,
            min_storage_buffer_offset_alignment: 16,
            max_sampler_anisotropy: 16.0,
            max_vertex_input_bindings: 32,
            max_tessellation_patch_size: 32,
            max_compute_shared_memory_size: 65536,
            max_compute_work_group_count: [65535, 65535, 65535],
            max_compute_work_group_invocations: 1024,
            max_compute_work_group_size: [1024, 1024, 1024],
        },
        extensions: vec!["VK_KHR_swapchain".to_string()],
    }
}

/// A simulated Vulkan loader and the devices its ICDs expose
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceVkConfig {
    pub instance_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    /// `index` is assigned from the position in this list
    pub physical_devices: Vec<VkPhysicalDeviceDesc>,
    /// Allocations larger than this fail with VK_ERROR_OUT_OF_DEVICE_MEMORY
    pub max_allocation_size: u64,
}

impl Default for ReferenceVkConfig {
    fn default() -> Self {
        ReferenceVkConfig {
            instance_version: vk_make_api_version(1, 3, 0),
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            extensions: vec![
                "VK_KHR_surface".to_string(),
                "VK_EXT_debug_utils".to_string(),
                "VK_EXT_validation_features".to_string(),
            ],
            physical_devices: vec![reference_physical_device(
                "Reference Discrete GPU",
                VkPhysicalDeviceType::DiscreteGpu,
            )],
            max_allocation_size: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// Software implementation of the Vulkan loader
pub struct ReferenceVkNative {
    config: Arc<ReferenceVkConfig>,
    tracker: Arc<ReferenceObjectTracker>,
    pending_messages: Arc<Mutex<Vec<VkDebugMessage>>>,
    instance_descs: Mutex<Vec<VkInstanceDesc>>,
}

impl ReferenceVkNative {
    pub fn new(
        config: ReferenceVkConfig,
        tracker: Arc<ReferenceObjectTracker>,
    ) -> Self {
        ReferenceVkNative {
            config: Arc::new(config),
            tracker,
            pending_messages: Default::default(),
            instance_descs: Default::default(),
        }
    }

    /// Queues a message as if a validation layer had reported it. Instances without a debug
    /// messenger discard it.
    pub fn inject_message(
        &self,
        message: VkDebugMessage,
    ) {
        self.pending_messages.lock().unwrap().push(message);
    }

    /// Every VkInstanceCreateInfo passed to `create_instance`, oldest first
    pub fn created_instances(&self) -> Vec<VkInstanceDesc> {
        self.instance_descs.lock().unwrap().clone()
    }
}

impl VkNative for ReferenceVkNative {
    fn instance_version(&self) -> PrismResult<u32> {
        Ok(self.config.instance_version)
    }

    fn enumerate_instance_layers(&self) -> PrismResult<Vec<String>> {
        Ok(self.config.layers.clone())
    }

    fn enumerate_instance_extensions(&self) -> PrismResult<Vec<String>> {
        Ok(self.config.extensions.clone())
    }

    fn create_instance(
        &self,
        desc: &VkInstanceDesc,
    ) -> PrismResult<Box<dyn VkNativeInstance>> {
        if let Some(layer) = desc
            .enabled_layers
            .iter()
            .find(|layer| !self.config.layers.contains(layer))
        {
            return Err(vk_error("vkCreateInstance", VK_ERROR_LAYER_NOT_PRESENT, layer.clone()).into());
        }

        if let Some(extension) = desc
            .enabled_extensions
            .iter()
            .find(|extension| !self.config.extensions.contains(extension))
        {
            return Err(vk_error(
                "vkCreateInstance",
                VK_ERROR_EXTENSION_NOT_PRESENT,
                extension.clone(),
            )
            .into());
        }

        self.instance_descs.lock().unwrap().push(desc.clone());

        let handle = self
            .tracker
            .create(ReferenceObjectKind::Instance, None, 0);

        Ok(Box::new(ReferenceVkInstance {
            handle,
            config: self.config.clone(),
            tracker: self.tracker.clone(),
            has_messenger: !desc.debug_severity.is_empty(),
            debug_severity: desc.debug_severity,
            pending_messages: self.pending_messages.clone(),
        }))
    }
}

pub struct ReferenceVkInstance {
    handle: PrismNativeHandle,
    config: Arc<ReferenceVkConfig>,
    tracker: Arc<ReferenceObjectTracker>,
    has_messenger: bool,
    debug_severity: VkDebugSeverityFlags,
    pending_messages: Arc<Mutex<Vec<VkDebugMessage>>>,
}

impl Drop for ReferenceVkInstance {
    fn drop(&mut self) {
        let outstanding = self.tracker.live_children(self.handle);
        if outstanding > 0 {
            log::error!(
                "reference VkInstance destroyed with {} live devices",
                outstanding
            );
        }

        self.tracker.release(self.handle);
    }
}

impl VkNativeInstance for ReferenceVkInstance {
    fn enumerate_physical_devices(&self) -> PrismResult<Vec<VkPhysicalDeviceDesc>> {
        Ok(self
            .config
            .physical_devices
            .iter()
            .enumerate()
            .map(|(index, physical_device)| VkPhysicalDeviceDesc {
                index: index as u32,
                ..physical_device.clone()
            })
            .collect())
    }

    fn create_device(
        &self,
        physical_device: &VkPhysicalDeviceDesc,
        desc: &VkDeviceDesc,
    ) -> PrismResult<Box<dyn VkNativeDevice>> {
        let known = self
            .config
            .physical_devices
            .get(physical_device.index as usize)
            .ok_or_else(|| {
                vk_error(
                    "vkCreateDevice",
                    VK_ERROR_INITIALIZATION_FAILED,
                    "unknown physical device",
                )
            })?;

        for queue_create_info in &desc.queue_create_infos {
            let family = known
                .queue_families
                .get(queue_create_info.queue_family_index as usize);
            let fits = family.map_or(false, |family| {
                !queue_create_info.queue_priorities.is_empty()
                    && queue_create_info.queue_priorities.len() as u32 <= family.queue_count
            });

            if !fits {
                return Err(vk_error(
                    "vkCreateDevice",
                    VK_ERROR_INITIALIZATION_FAILED,
                    format!("invalid queue create info {:?}", queue_create_info),
                )
                .into());
            }
        }

        if let Some(extension) = desc
            .enabled_extensions
            .iter()
            .find(|extension| !known.supports_extension(extension))
        {
            return Err(vk_error(
                "vkCreateDevice",
                VK_ERROR_EXTENSION_NOT_PRESENT,
                extension.clone(),
            )
            .into());
        }

        let handle = self
            .tracker
            .create(ReferenceObjectKind::Device, Some(self.handle), 0);

        Ok(Box::new(ReferenceVkDevice {
            handle,
            tracker: self.tracker.clone(),
            max_allocation_size: self.config.max_allocation_size,
            host_visible_buffers: Default::default(),
        }))
    }

    fn take_debug_messages(&self) -> Vec<VkDebugMessage> {
        let messages = std::mem::take(&mut *self.pending_messages.lock().unwrap());
        if !self.has_messenger {
            return Vec::default();
        }

        messages
            .into_iter()
            .filter(|message| self.debug_severity.intersects(message.severity))
            .collect()
    }
}

pub struct ReferenceVkDevice {
    handle: PrismNativeHandle,
    tracker: Arc<ReferenceObjectTracker>,
    max_allocation_size: u64,
    host_visible_buffers: Mutex<FnvHashSet<u64>>,
}

impl ReferenceVkDevice {
    fn allocate(
        &self,
        kind: ReferenceObjectKind,
        size: u64,
    ) -> PrismResult<PrismNativeHandle> {
        if size == 0 {
            return Err(vk_error(
                "vkAllocateMemory",
                VK_ERROR_INITIALIZATION_FAILED,
                "zero sized allocation",
            )
            .into());
        }

        if size > self.max_allocation_size {
            return Err(vk_error(
                "vkAllocateMemory",
                VK_ERROR_OUT_OF_DEVICE_MEMORY,
                format!("{} bytes exceeds the device's allocation limit", size),
            )
            .into());
        }

        Ok(self.tracker.create(kind, Some(self.handle), size))
    }
}

impl VkNativeDevice for ReferenceVkDevice {
    fn get_device_queue(
        &self,
        queue_family_index: u32,
        queue_index: u32,
    ) -> PrismNativeHandle {
        // Queues are owned by the device, they get a handle derived from the device's
        PrismNativeHandle(
            (self.handle.0 << 16) | ((queue_family_index as u64) << 8) | queue_index as u64,
        )
    }

    fn create_buffer(
        &self,
        desc: &VkBufferDesc,
        memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle> {
        let buffer = self.allocate(ReferenceObjectKind::Buffer, desc.size)?;
        if memory_location.is_host_visible() {
            self.host_visible_buffers.lock().unwrap().insert(buffer.0);
        }

        Ok(buffer)
    }

    fn create_image(
        &self,
        desc: &VkImageDesc,
        _memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle> {
        let [width, height, depth] = desc.extent;
        let size = width as u64
            * height as u64
            * depth as u64
            * desc.array_layers as u64
            * desc.samples.max(1) as u64
            * 4;
        self.allocate(ReferenceObjectKind::Texture, size)
    }

    fn write_buffer_data(
        &self,
        buffer: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()> {
        if !self.host_visible_buffers.lock().unwrap().contains(&buffer.0) {
            return Err(vk_error(
                "vkMapMemory",
                VK_ERROR_MEMORY_MAP_FAILED,
                "the buffer's memory is not host visible",
            )
            .into());
        }

        self.tracker.write(buffer, offset, data)
    }

    fn set_device_name(
        &self,
        name: &str,
    ) {
        self.tracker.set_name(self.handle, name);
    }

    fn set_object_name(
        &self,
        object: PrismNativeHandle,
        name: &str,
    ) {
        self.tracker.set_name(object, name);
    }

    fn destroy_buffer(
        &self,
        buffer: PrismNativeHandle,
    ) {
        self.host_visible_buffers.lock().unwrap().remove(&buffer.0);
        self.tracker.release(buffer);
    }

    fn destroy_image(
        &self,
        image: PrismNativeHandle,
    ) {
        self.tracker.release(image);
    }

    fn wait_idle(&self) -> PrismResult<()> {
        // Nothing is ever in flight
        Ok(())
    }

    fn destroy(&self) {
        let outstanding = self.tracker.live_children(self.handle);
        if outstanding > 0 {
            log::error!(
                "reference VkDevice destroyed with {} live objects",
                outstanding
            );
        }

        self.tracker.release(self.handle);
    }
}
