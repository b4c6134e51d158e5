use super::native::*;
use crate::vulkan::PrismDeviceContextVulkan;
use crate::{
    PrismBufferDef, PrismBufferUsage, PrismCpuAccess, PrismError, PrismNativeHandle, PrismResult,
    PrismSharedResourceFlags,
};

pub(crate) fn vk_memory_location(cpu_access: PrismCpuAccess) -> VkMemoryLocation {
    match cpu_access {
        PrismCpuAccess::None => VkMemoryLocation::GpuOnly,
        PrismCpuAccess::Read => VkMemoryLocation::GpuToCpu,
        PrismCpuAccess::Write => VkMemoryLocation::CpuToGpu,
    }
}

/// External memory is not set up by this backend
pub(crate) fn log_ignored_shared_flags(flags: PrismSharedResourceFlags) {
    if !flags.is_empty() {
        log::trace!("Vulkan resources can't be shared, ignoring {:?}", flags);
    }
}

pub fn vk_buffer_desc(
    buffer_def: &PrismBufferDef,
    min_uniform_buffer_offset_alignment: u64,
) -> PrismResult<VkBufferDesc> {
    // Any buffer can be the source or destination of a copy
    let mut usage = VkBufferUsageFlags::TRANSFER_SRC | VkBufferUsageFlags::TRANSFER_DST;
    let mut size = buffer_def.size;

    if buffer_def.usage.contains(PrismBufferUsage::CONSTANT) {
        usage |= VkBufferUsageFlags::UNIFORM_BUFFER;
        size = prism_base::memory::align_size_u64(size, min_uniform_buffer_offset_alignment.max(1))
            .ok_or_else(|| PrismError::invalid_argument("size", "buffer size overflows"))?;
    }

    if buffer_def.usage.contains(PrismBufferUsage::VERTEX) {
        usage |= VkBufferUsageFlags::VERTEX_BUFFER;
    }

    if buffer_def.usage.contains(PrismBufferUsage::INDEX) {
        usage |= VkBufferUsageFlags::INDEX_BUFFER;
    }

    if buffer_def
        .usage
        .intersects(PrismBufferUsage::SHADER_READ_WRITE)
    {
        usage |= VkBufferUsageFlags::STORAGE_BUFFER;
    }

    if buffer_def.usage.contains(PrismBufferUsage::INDIRECT) {
        usage |= VkBufferUsageFlags::INDIRECT_BUFFER;
    }

    Ok(VkBufferDesc { size, usage })
}

#[derive(Debug)]
pub struct PrismBufferVulkan {
    device_context: PrismDeviceContextVulkan,
    buffer_def: PrismBufferDef,
    desc: VkBufferDesc,
    memory_location: VkMemoryLocation,
    buffer: PrismNativeHandle,
}

impl Drop for PrismBufferVulkan {
    fn drop(&mut self) {
        log::trace!("destroying PrismBufferVulkan {:?}", self.buffer);
        self.device_context
            .native_device()
            .destroy_buffer(self.buffer);
    }
}

impl PrismBufferVulkan {
    pub fn buffer_def(&self) -> &PrismBufferDef {
        &self.buffer_def
    }

    pub fn vk_buffer_desc(&self) -> &VkBufferDesc {
        &self.desc
    }

    pub fn vk_memory_location(&self) -> VkMemoryLocation {
        self.memory_location
    }

    pub fn vk_buffer(&self) -> PrismNativeHandle {
        self.buffer
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_object_name(self.buffer, label);
        self.buffer_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextVulkan,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<Self> {
        buffer_def.verify()?;

        if let Some(data) = initial_data {
            if buffer_def.cpu_access != PrismCpuAccess::Write {
                return Err(PrismError::invalid_argument(
                    "cpu_access",
                    "Vulkan buffers created with data must be CPU writable",
                ));
            }

            if data.len() as u64 > buffer_def.size {
                return Err(PrismError::invalid_argument(
                    "size",
                    format!(
                        "{} bytes of initial data don't fit in a {} byte buffer",
                        data.len(),
                        buffer_def.size
                    ),
                ));
            }
        }

        log_ignored_shared_flags(buffer_def.shared_resource_flags);

        let desc = vk_buffer_desc(
            buffer_def,
            device_context.limits().min_uniform_buffer_offset_alignment,
        )?;
        let memory_location = vk_memory_location(buffer_def.cpu_access);

        let native_device = device_context.native_device();
        let buffer = native_device.create_buffer(&desc, memory_location)?;
        log::trace!(
            "created PrismBufferVulkan {:?} {:?} {:?}",
            buffer,
            desc,
            memory_location
        );

        // Constructed before writing so the buffer is destroyed if the write fails
        let mut prism_buffer = PrismBufferVulkan {
            device_context: device_context.clone(),
            buffer_def: buffer_def.clone(),
            desc,
            memory_location,
            buffer,
        };

        if let Some(data) = initial_data {
            native_device.write_buffer_data(buffer, 0, data)?;
        }

        if let Some(label) = &buffer_def.label {
            prism_buffer.set_label(label);
        }

        Ok(prism_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_alignment() {
        let desc = vk_buffer_desc(&PrismBufferDef::for_constant_buffer(100), 64).unwrap();
        assert_eq!(desc.size, 128);
        assert!(desc.usage.contains(VkBufferUsageFlags::UNIFORM_BUFFER));
        assert!(!desc.usage.contains(VkBufferUsageFlags::STORAGE_BUFFER));

        // Some drivers report an alignment of 0
        let desc = vk_buffer_desc(&PrismBufferDef::for_constant_buffer(100), 0).unwrap();
        assert_eq!(desc.size, 100);
    }

    #[test]
    fn test_buffer_usage_flags() {
        let def = PrismBufferDef::for_usage(
            256,
            PrismBufferUsage::VERTEX | PrismBufferUsage::INDEX | PrismBufferUsage::INDIRECT,
        );
        let desc = vk_buffer_desc(&def, 256).unwrap();
        assert_eq!(desc.size, 256);
        assert_eq!(
            desc.usage,
            VkBufferUsageFlags::TRANSFER_SRC
                | VkBufferUsageFlags::TRANSFER_DST
                | VkBufferUsageFlags::VERTEX_BUFFER
                | VkBufferUsageFlags::INDEX_BUFFER
                | VkBufferUsageFlags::INDIRECT_BUFFER
        );

        let desc = vk_buffer_desc(&PrismBufferDef::for_staging_buffer(16), 256).unwrap();
        assert_eq!(
            desc.usage,
            VkBufferUsageFlags::TRANSFER_SRC | VkBufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn test_memory_location() {
        assert_eq!(
            vk_memory_location(PrismCpuAccess::None),
            VkMemoryLocation::GpuOnly
        );
        assert_eq!(
            vk_memory_location(PrismCpuAccess::Read),
            VkMemoryLocation::GpuToCpu
        );
        assert_eq!(
            vk_memory_location(PrismCpuAccess::Write),
            VkMemoryLocation::CpuToGpu
        );
        assert!(!VkMemoryLocation::GpuOnly.is_host_visible());
        assert!(VkMemoryLocation::GpuToCpu.is_host_visible());
    }
}
