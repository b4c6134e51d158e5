use super::native::*;
use crate::dx12::PrismDeviceContextDx12;
use crate::dxgi::DxgiFormat;
use crate::{
    PrismBufferDef, PrismBufferUsage, PrismCpuAccess, PrismError, PrismNativeHandle, PrismResult,
    PrismSharedResourceFlags,
};

/// D3D12_CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT
pub const DX12_CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Everything needed to call CreateCommittedResource for a buffer
#[derive(Clone, Debug, PartialEq)]
pub struct Dx12BufferAllocation {
    pub heap_properties: Dx12HeapProperties,
    pub heap_flags: Dx12HeapFlags,
    pub desc: Dx12ResourceDesc,
    pub initial_state: Dx12ResourceStates,
}

/// Cross-adapter sharing needs a flag on both the heap and the resource. NT handles are implied by
/// D3D12 shared heaps, so SHARED_NT_HANDLE adds nothing.
pub(crate) fn dx12_shared_flags(
    flags: PrismSharedResourceFlags
) -> (Dx12HeapFlags, Dx12ResourceFlags) {
    let mut heap_flags = Dx12HeapFlags::empty();
    let mut resource_flags = Dx12ResourceFlags::empty();

    if flags.contains(PrismSharedResourceFlags::SHARED) {
        heap_flags |= Dx12HeapFlags::SHARED;
    }

    if flags.contains(PrismSharedResourceFlags::SHARED_NT_HANDLE) {
        log::trace!("D3D12 shared heaps always use NT handles, ignoring SHARED_NT_HANDLE");
    }

    if flags.contains(PrismSharedResourceFlags::CROSS_ADAPTER) {
        heap_flags |= Dx12HeapFlags::SHARED | Dx12HeapFlags::SHARED_CROSS_ADAPTER;
        resource_flags |= Dx12ResourceFlags::ALLOW_CROSS_ADAPTER;
    }

    (heap_flags, resource_flags)
}

pub fn dx12_buffer_allocation(buffer_def: &PrismBufferDef) -> PrismResult<Dx12BufferAllocation> {
    let mut width = buffer_def.size;
    if buffer_def.usage.contains(PrismBufferUsage::CONSTANT) {
        width = prism_base::memory::align_size_u64(width, DX12_CONSTANT_BUFFER_ALIGNMENT)
            .ok_or_else(|| PrismError::invalid_argument("size", "buffer size overflows"))?;
    }

    let (mut heap_flags, mut flags) = dx12_shared_flags(buffer_def.shared_resource_flags);

    let (heap_type, initial_state) = match buffer_def.cpu_access {
        PrismCpuAccess::None => {
            if buffer_def.usage.contains(PrismBufferUsage::SHADER_WRITE) {
                flags |= Dx12ResourceFlags::ALLOW_UNORDERED_ACCESS;
            }
            (Dx12HeapType::Default, Dx12ResourceStates::COMMON)
        }
        PrismCpuAccess::Read => {
            flags |= Dx12ResourceFlags::DENY_SHADER_RESOURCE;
            (Dx12HeapType::Readback, Dx12ResourceStates::COPY_DEST)
        }
        PrismCpuAccess::Write => (Dx12HeapType::Upload, Dx12ResourceStates::GENERIC_READ),
    };

    if heap_type != Dx12HeapType::Default
        && heap_flags.contains(Dx12HeapFlags::SHARED_CROSS_ADAPTER)
    {
        log::trace!("D3D12 upload and readback heaps can't be shared across adapters");
        heap_flags.remove(Dx12HeapFlags::SHARED_CROSS_ADAPTER);
        flags.remove(Dx12ResourceFlags::ALLOW_CROSS_ADAPTER);
    }

    Ok(Dx12BufferAllocation {
        heap_properties: Dx12HeapProperties::new(heap_type),
        heap_flags,
        desc: Dx12ResourceDesc {
            dimension: Dx12ResourceDimension::Buffer,
            alignment: 0,
            width,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: DxgiFormat::UNKNOWN,
            sample_count: 1,
            sample_quality: 0,
            layout: Dx12TextureLayout::RowMajor,
            flags,
        },
        initial_state,
    })
}

#[derive(Debug)]
pub struct PrismBufferDx12 {
    device_context: PrismDeviceContextDx12,
    buffer_def: PrismBufferDef,
    allocation: Dx12BufferAllocation,
    resource: PrismNativeHandle,
}

impl Drop for PrismBufferDx12 {
    fn drop(&mut self) {
        log::trace!("destroying PrismBufferDx12 {:?}", self.resource);
        self.device_context
            .native_device()
            .release_resource(self.resource);
    }
}

impl PrismBufferDx12 {
    pub fn buffer_def(&self) -> &PrismBufferDef {
        &self.buffer_def
    }

    pub fn dx12_allocation(&self) -> &Dx12BufferAllocation {
        &self.allocation
    }

    pub fn dx12_resource(&self) -> PrismNativeHandle {
        self.resource
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_resource_name(self.resource, label);
        self.buffer_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextDx12,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<Self> {
        buffer_def.verify()?;

        if let Some(data) = initial_data {
            if buffer_def.cpu_access != PrismCpuAccess::Write {
                return Err(PrismError::invalid_argument(
                    "cpu_access",
                    "D3D12 buffers created with data must be CPU writable",
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

        let allocation = dx12_buffer_allocation(buffer_def)?;
        let native_device = device_context.native_device();
        let resource = native_device.create_committed_resource(
            &allocation.heap_properties,
            allocation.heap_flags,
            &allocation.desc,
            allocation.initial_state,
        )?;
        log::trace!("created PrismBufferDx12 {:?} {:?}", resource, allocation);

        // Constructed before writing so the resource is released if the write fails
        let mut buffer = PrismBufferDx12 {
            device_context: device_context.clone(),
            buffer_def: buffer_def.clone(),
            allocation,
            resource,
        };

        if let Some(data) = initial_data {
            native_device.write_resource_data(resource, 0, data)?;
        }

        if let Some(label) = &buffer_def.label {
            buffer.set_label(label);
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_is_aligned_upload() {
        let allocation = dx12_buffer_allocation(&PrismBufferDef::for_constant_buffer(300)).unwrap();
        assert_eq!(allocation.desc.width, 512);
        assert_eq!(allocation.heap_properties.heap_type, Dx12HeapType::Upload);
        assert_eq!(allocation.initial_state, Dx12ResourceStates::GENERIC_READ);
        assert_eq!(allocation.initial_state.bits(), 0xAC3);
    }

    #[test]
    fn test_readback_buffer() {
        let allocation = dx12_buffer_allocation(&PrismBufferDef::for_readback_buffer(64)).unwrap();
        assert_eq!(allocation.heap_properties.heap_type, Dx12HeapType::Readback);
        assert_eq!(allocation.initial_state, Dx12ResourceStates::COPY_DEST);
        assert!(allocation
            .desc
            .flags
            .contains(Dx12ResourceFlags::DENY_SHADER_RESOURCE));
    }

    #[test]
    fn test_gpu_buffer_allows_unordered_access() {
        let def = PrismBufferDef {
            size: 1000,
            ..Default::default()
        };
        let allocation = dx12_buffer_allocation(&def).unwrap();
        assert_eq!(allocation.desc.width, 1000);
        assert_eq!(allocation.heap_properties.heap_type, Dx12HeapType::Default);
        assert_eq!(allocation.initial_state, Dx12ResourceStates::COMMON);
        assert_eq!(
            allocation.desc.flags,
            Dx12ResourceFlags::ALLOW_UNORDERED_ACCESS
        );
    }

    #[test]
    fn test_shared_buffer_flags() {
        let def = PrismBufferDef {
            size: 64,
            shared_resource_flags: PrismSharedResourceFlags::CROSS_ADAPTER,
            ..Default::default()
        };
        let allocation = dx12_buffer_allocation(&def).unwrap();
        assert_eq!(
            allocation.heap_flags,
            Dx12HeapFlags::SHARED | Dx12HeapFlags::SHARED_CROSS_ADAPTER
        );
        assert!(allocation
            .desc
            .flags
            .contains(Dx12ResourceFlags::ALLOW_CROSS_ADAPTER));

        let def = PrismBufferDef {
            size: 64,
            shared_resource_flags: PrismSharedResourceFlags::SHARED_NT_HANDLE,
            ..Default::default()
        };
        assert!(dx12_buffer_allocation(&def).unwrap().heap_flags.is_empty());
    }
}
