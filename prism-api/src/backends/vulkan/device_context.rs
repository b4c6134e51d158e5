use super::native::*;
use crate::internal_shared::{forward_validation_messages, PrismContextTracker, TrackedDeviceInner};
use crate::vulkan::{
    PrismBufferVulkan, PrismTextureVulkan, PrismVkInstance, VkQueueAllocation, VkQueueAssignment,
};
use crate::{
    PrismBackendType, PrismBufferDef, PrismDeviceInfo, PrismNativeHandle, PrismQueueType,
    PrismResult, PrismTextureDef, PrismValidationMessage, PrismValidationSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Validation messages that are expected during normal operation and never forwarded.
/// 0x7cd0911d: VUID-VkSwapchainCreateInfoKHR-imageExtent-01274, fires when a window is resized
/// between querying the surface extent and creating the swapchain.
pub(crate) const VK_DENIED_MESSAGE_IDS: [i32; 1] = [0x7cd0911d];

/// A hardware queue retrieved at device creation
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VkDeviceQueue {
    pub assignment: VkQueueAssignment,
    pub queue: PrismNativeHandle,
}

pub struct PrismDeviceContextVulkanInner {
    pub(crate) device_info: Arc<PrismDeviceInfo>,
    native_device: Box<dyn VkNativeDevice>,
    physical_device: VkPhysicalDeviceDesc,
    queue_allocation: VkQueueAllocation,
    graphics_queue: VkDeviceQueue,
    compute_queue: VkDeviceQueue,
    transfer_queue: VkDeviceQueue,
    validation_sink: Arc<dyn PrismValidationSink>,

    // Kept alive until the device has been destroyed
    instance: Arc<PrismVkInstance>,

    destroyed: AtomicBool,
    context_tracker: PrismContextTracker,
}

impl Drop for PrismDeviceContextVulkanInner {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            log::trace!("destroying device");
            if let Err(e) = self.native_device.wait_idle() {
                log::warn!("vkDeviceWaitIdle failed before destroying the device: {}", e);
            }

            self.native_device.destroy();
            log::trace!("destroyed device");
        }
    }
}

impl TrackedDeviceInner for PrismDeviceContextVulkanInner {
    fn context_tracker(&self) -> &PrismContextTracker {
        &self.context_tracker
    }
}

impl PrismDeviceContextVulkanInner {
    pub(crate) fn new(
        device_info: PrismDeviceInfo,
        instance: Arc<PrismVkInstance>,
        physical_device: VkPhysicalDeviceDesc,
        native_device: Box<dyn VkNativeDevice>,
        queue_allocation: VkQueueAllocation,
        validation_sink: Arc<dyn PrismValidationSink>,
    ) -> Self {
        let get_queue = |assignment: &VkQueueAssignment| VkDeviceQueue {
            assignment: *assignment,
            queue: native_device
                .get_device_queue(assignment.queue_family_index, assignment.queue_index),
        };

        let graphics_queue = get_queue(&queue_allocation.graphics);
        let compute_queue = get_queue(&queue_allocation.compute);
        let transfer_queue = get_queue(&queue_allocation.transfer);

        PrismDeviceContextVulkanInner {
            device_info: Arc::new(device_info),
            native_device,
            physical_device,
            queue_allocation,
            graphics_queue,
            compute_queue,
            transfer_queue,
            validation_sink,
            instance,
            destroyed: AtomicBool::new(false),
            context_tracker: PrismContextTracker::default(),
        }
    }
}

pub struct PrismDeviceContextVulkan {
    pub(crate) inner: Arc<PrismDeviceContextVulkanInner>,
    create_index: u64,
}

impl std::fmt::Debug for PrismDeviceContextVulkan {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismDeviceContextVulkan")
            .field("physical_device", &self.inner.physical_device.device_name)
            .field("graphics_queue", &self.inner.graphics_queue)
            .finish()
    }
}

impl Clone for PrismDeviceContextVulkan {
    fn clone(&self) -> Self {
        let create_index = self.inner.context_tracker.track_new();
        PrismDeviceContextVulkan {
            inner: self.inner.clone(),
            create_index,
        }
    }
}

impl Drop for PrismDeviceContextVulkan {
    fn drop(&mut self) {
        self.inner.context_tracker.untrack(self.create_index);
    }
}

impl PrismDeviceContextVulkan {
    pub(crate) fn new(inner: Arc<PrismDeviceContextVulkanInner>) -> Self {
        let create_index = inner.context_tracker.track_new();
        PrismDeviceContextVulkan {
            inner,
            create_index,
        }
    }

    pub fn device_info(&self) -> &Arc<PrismDeviceInfo> {
        &self.inner.device_info
    }

    pub fn instance(&self) -> &Arc<PrismVkInstance> {
        &self.inner.instance
    }

    pub fn physical_device(&self) -> &VkPhysicalDeviceDesc {
        &self.inner.physical_device
    }

    pub fn limits(&self) -> &VkPhysicalDeviceLimits {
        &self.inner.physical_device.limits
    }

    pub fn native_device(&self) -> &dyn VkNativeDevice {
        &*self.inner.native_device
    }

    pub fn queue_allocation(&self) -> &VkQueueAllocation {
        &self.inner.queue_allocation
    }

    pub fn queue(
        &self,
        queue_type: PrismQueueType,
    ) -> &VkDeviceQueue {
        match queue_type {
            PrismQueueType::Graphics => &self.inner.graphics_queue,
            PrismQueueType::Compute => &self.inner.compute_queue,
            PrismQueueType::Transfer => &self.inner.transfer_queue,
        }
    }

    pub fn wait_idle(&self) -> PrismResult<()> {
        profiling::scope!("PrismDeviceContextVulkan::wait_idle");
        self.inner.native_device.wait_idle()
    }

    /// Forwards messages received by the instance's debug messenger. The messenger is shared by
    /// all devices created on the instance.
    pub fn pump_validation_messages(&self) -> usize {
        let messages = self
            .inner
            .instance
            .native_instance()
            .take_debug_messages()
            .into_iter()
            .map(|message| {
                let message_id = if message.message_id_name.is_empty() {
                    format!("{:#x}", message.message_id_number)
                } else {
                    message.message_id_name
                };
                (
                    message.message_id_number,
                    PrismValidationMessage {
                        backend: PrismBackendType::Vulkan,
                        severity: message.severity.to_validation_severity(),
                        message_id,
                        message: message.message,
                    },
                )
            });

        forward_validation_messages(
            messages,
            &VK_DENIED_MESSAGE_IDS,
            &*self.inner.validation_sink,
        )
    }

    pub fn create_buffer(
        &self,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismBufferVulkan> {
        let result = PrismBufferVulkan::new(self, buffer_def, initial_data);
        self.pump_validation_messages();
        result
    }

    pub fn create_texture(
        &self,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<PrismTextureVulkan> {
        let result = PrismTextureVulkan::new(self, texture_def);
        self.pump_validation_messages();
        result
    }
}
