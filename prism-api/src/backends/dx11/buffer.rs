use super::native::*;
use crate::dx11::PrismDeviceContextDx11;
use crate::{
    PrismBufferDef, PrismBufferUsage, PrismCpuAccess, PrismError, PrismNativeHandle, PrismResult,
    PrismSharedResourceFlags,
};

/// Constant buffers are padded to this size before creation
pub const DX11_CONSTANT_BUFFER_ALIGNMENT: u64 = 64;

/// Translates a buffer def into a D3D11_BUFFER_DESC
pub fn dx11_buffer_desc(buffer_def: &PrismBufferDef) -> PrismResult<Dx11BufferDesc> {
    let mut size = buffer_def.size;
    let mut usage = Dx11Usage::Default;
    let mut bind_flags = Dx11BindFlags::empty();
    let mut cpu_access_flags = Dx11CpuAccessFlags::empty();
    let mut misc_flags = Dx11ResourceMiscFlags::empty();

    if buffer_def.usage.contains(PrismBufferUsage::CONSTANT) {
        size = prism_base::memory::align_size_u64(size, DX11_CONSTANT_BUFFER_ALIGNMENT)
            .ok_or_else(|| PrismError::invalid_argument("size", "buffer size overflows"))?;
        usage = Dx11Usage::Dynamic;
        bind_flags = Dx11BindFlags::CONSTANT_BUFFER;
        cpu_access_flags = Dx11CpuAccessFlags::WRITE;
    } else {
        if buffer_def.usage.contains(PrismBufferUsage::VERTEX) {
            bind_flags |= Dx11BindFlags::VERTEX_BUFFER;
        }

        if buffer_def.usage.contains(PrismBufferUsage::INDEX) {
            bind_flags |= Dx11BindFlags::INDEX_BUFFER;
        }

        if buffer_def.usage.contains(PrismBufferUsage::SHADER_READ) {
            bind_flags |= Dx11BindFlags::SHADER_RESOURCE;
            misc_flags |= Dx11ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS;
        }

        if buffer_def.usage.contains(PrismBufferUsage::SHADER_WRITE) {
            bind_flags |= Dx11BindFlags::UNORDERED_ACCESS;
            misc_flags |= Dx11ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS;
        }

        if buffer_def.usage.contains(PrismBufferUsage::INDIRECT) {
            misc_flags |= Dx11ResourceMiscFlags::DRAWINDIRECT_ARGS;
        }

        match buffer_def.cpu_access {
            PrismCpuAccess::None => {}
            PrismCpuAccess::Read => {
                // Staging resources can't be bound to the pipeline
                usage = Dx11Usage::Staging;
                cpu_access_flags = Dx11CpuAccessFlags::READ;
                bind_flags = Dx11BindFlags::empty();
                misc_flags = Dx11ResourceMiscFlags::empty();
            }
            PrismCpuAccess::Write => {
                usage = Dx11Usage::Dynamic;
                cpu_access_flags = Dx11CpuAccessFlags::WRITE;
                if bind_flags.contains(Dx11BindFlags::UNORDERED_ACCESS) {
                    log::warn!("D3D11 dynamic buffers can't be written by shaders, ignoring SHADER_WRITE");
                    bind_flags.remove(Dx11BindFlags::UNORDERED_ACCESS);
                }
            }
        }
    }

    misc_flags |= dx11_shared_misc_flags(buffer_def.shared_resource_flags);

    let byte_width = u32::try_from(size).map_err(|_| {
        PrismError::invalid_argument(
            "size",
            format!("D3D11 buffers are limited to {} bytes", u32::MAX),
        )
    })?;

    Ok(Dx11BufferDesc {
        byte_width,
        usage,
        bind_flags,
        cpu_access_flags,
        misc_flags,
        structure_byte_stride: 0,
    })
}

/// NT handle sharing implies a keyed mutex. Cross-adapter sharing can't be expressed in D3D11.
pub(crate) fn dx11_shared_misc_flags(flags: PrismSharedResourceFlags) -> Dx11ResourceMiscFlags {
    if flags.contains(PrismSharedResourceFlags::CROSS_ADAPTER) {
        log::trace!("D3D11 does not support cross-adapter sharing, ignoring CROSS_ADAPTER");
    }

    if flags.contains(PrismSharedResourceFlags::SHARED_NT_HANDLE) {
        Dx11ResourceMiscFlags::SHARED_KEYEDMUTEX | Dx11ResourceMiscFlags::SHARED_NTHANDLE
    } else if flags.contains(PrismSharedResourceFlags::SHARED) {
        Dx11ResourceMiscFlags::SHARED
    } else {
        Dx11ResourceMiscFlags::empty()
    }
}

#[derive(Debug)]
pub struct PrismBufferDx11 {
    device_context: PrismDeviceContextDx11,
    buffer_def: PrismBufferDef,
    desc: Dx11BufferDesc,
    buffer: PrismNativeHandle,
}

impl Drop for PrismBufferDx11 {
    fn drop(&mut self) {
        log::trace!("destroying PrismBufferDx11 {:?}", self.buffer);
        self.device_context
            .native_device()
            .release_resource(self.buffer);
    }
}

impl PrismBufferDx11 {
    pub fn buffer_def(&self) -> &PrismBufferDef {
        &self.buffer_def
    }

    pub fn dx11_buffer_desc(&self) -> &Dx11BufferDesc {
        &self.desc
    }

    pub fn dx11_buffer(&self) -> PrismNativeHandle {
        self.buffer
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_resource_name(self.buffer, label);
        self.buffer_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextDx11,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<Self> {
        buffer_def.verify()?;
        let desc = dx11_buffer_desc(buffer_def)?;

        let buffer = device_context
            .native_device()
            .create_buffer(&desc, initial_data)?;
        log::trace!("created PrismBufferDx11 {:?} {:?}", buffer, desc);

        if let Some(label) = &buffer_def.label {
            device_context
                .native_device()
                .set_resource_name(buffer, label);
        }

        Ok(PrismBufferDx11 {
            device_context: device_context.clone(),
            buffer_def: buffer_def.clone(),
            desc,
            buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_buffer_desc() {
        let desc = dx11_buffer_desc(&PrismBufferDef::for_constant_buffer(100)).unwrap();
        assert_eq!(desc.byte_width, 128);
        assert_eq!(desc.usage, Dx11Usage::Dynamic);
        assert_eq!(desc.bind_flags, Dx11BindFlags::CONSTANT_BUFFER);
        assert_eq!(desc.cpu_access_flags, Dx11CpuAccessFlags::WRITE);
    }

    #[test]
    fn test_vertex_index_buffer_desc() {
        let def = PrismBufferDef::for_usage(
            256,
            PrismBufferUsage::VERTEX | PrismBufferUsage::INDEX,
        );
        let desc = dx11_buffer_desc(&def).unwrap();
        assert_eq!(desc.byte_width, 256);
        assert_eq!(desc.usage, Dx11Usage::Default);
        assert_eq!(
            desc.bind_flags,
            Dx11BindFlags::VERTEX_BUFFER | Dx11BindFlags::INDEX_BUFFER
        );
        assert!(desc.misc_flags.is_empty());
    }

    #[test]
    fn test_shader_read_write_buffer_desc() {
        let def = PrismBufferDef {
            size: 256,
            usage: PrismBufferUsage::SHADER_READ_WRITE | PrismBufferUsage::INDIRECT,
            ..Default::default()
        };
        let desc = dx11_buffer_desc(&def).unwrap();
        assert_eq!(
            desc.bind_flags,
            Dx11BindFlags::SHADER_RESOURCE | Dx11BindFlags::UNORDERED_ACCESS
        );
        assert_eq!(
            desc.misc_flags,
            Dx11ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS | Dx11ResourceMiscFlags::DRAWINDIRECT_ARGS
        );
    }

    #[test]
    fn test_cpu_access_buffer_desc() {
        let desc = dx11_buffer_desc(&PrismBufferDef::for_readback_buffer(64)).unwrap();
        assert_eq!(desc.usage, Dx11Usage::Staging);
        assert_eq!(desc.cpu_access_flags, Dx11CpuAccessFlags::READ);
        assert!(desc.bind_flags.is_empty());

        let def = PrismBufferDef {
            size: 64,
            cpu_access: PrismCpuAccess::Write,
            ..Default::default()
        };
        let desc = dx11_buffer_desc(&def).unwrap();
        assert_eq!(desc.usage, Dx11Usage::Dynamic);
        assert_eq!(desc.bind_flags, Dx11BindFlags::SHADER_RESOURCE);
    }

    #[test]
    fn test_shared_flags() {
        assert_eq!(
            dx11_shared_misc_flags(
                PrismSharedResourceFlags::SHARED | PrismSharedResourceFlags::SHARED_NT_HANDLE
            ),
            Dx11ResourceMiscFlags::SHARED_KEYEDMUTEX | Dx11ResourceMiscFlags::SHARED_NTHANDLE
        );
        assert_eq!(
            dx11_shared_misc_flags(PrismSharedResourceFlags::SHARED),
            Dx11ResourceMiscFlags::SHARED
        );
        assert!(dx11_shared_misc_flags(PrismSharedResourceFlags::CROSS_ADAPTER).is_empty());
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let def = PrismBufferDef::for_usage(u32::MAX as u64 + 1, PrismBufferUsage::VERTEX);
        assert_eq!(
            dx11_buffer_desc(&def).unwrap_err().invalid_field(),
            Some("size")
        );
    }
}
