use crate::dx11::PrismBufferDx11;
use crate::dx12::PrismBufferDx12;
use crate::vulkan::PrismBufferVulkan;
use crate::{PrismBackendType, PrismBufferDef, PrismNativeHandle};

/// A buffer is a piece of memory that can be accessed by the GPU. It may reside in CPU or GPU
/// memory depending on how it is created.
///
/// The buffer keeps its device's native objects alive. Buffers must not be dropped while the GPU
/// is using them.
#[derive(Debug)]
pub enum PrismBuffer {
    Dx11(PrismBufferDx11),
    Dx12(PrismBufferDx12),
    Vk(PrismBufferVulkan),
}

impl PrismBuffer {
    pub fn backend_type(&self) -> PrismBackendType {
        match self {
            PrismBuffer::Dx11(_) => PrismBackendType::Dx11,
            PrismBuffer::Dx12(_) => PrismBackendType::Dx12,
            PrismBuffer::Vk(_) => PrismBackendType::Vulkan,
        }
    }

    /// The def the buffer was created with. Size, usage, CPU access and sharing flags are reported
    /// as requested, before any backend alignment.
    pub fn buffer_def(&self) -> &PrismBufferDef {
        match self {
            PrismBuffer::Dx11(inner) => inner.buffer_def(),
            PrismBuffer::Dx12(inner) => inner.buffer_def(),
            PrismBuffer::Vk(inner) => inner.buffer_def(),
        }
    }

    /// The ID3D11Buffer, ID3D12Resource or VkBuffer
    pub fn native_handle(&self) -> PrismNativeHandle {
        match self {
            PrismBuffer::Dx11(inner) => inner.dx11_buffer(),
            PrismBuffer::Dx12(inner) => inner.dx12_resource(),
            PrismBuffer::Vk(inner) => inner.vk_buffer(),
        }
    }

    /// Sets the debug name of the native object
    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        match self {
            PrismBuffer::Dx11(inner) => inner.set_label(label),
            PrismBuffer::Dx12(inner) => inner.set_label(label),
            PrismBuffer::Vk(inner) => inner.set_label(label),
        }
    }

    /// Get the underlying D3D11 API object. This provides access to any internally created
    /// D3D11 objects.
    pub fn dx11_buffer(&self) -> Option<&PrismBufferDx11> {
        match self {
            PrismBuffer::Dx11(inner) => Some(inner),
            PrismBuffer::Dx12(_) => None,
            PrismBuffer::Vk(_) => None,
        }
    }

    /// Get the underlying D3D12 API object. This provides access to any internally created
    /// D3D12 objects.
    pub fn dx12_buffer(&self) -> Option<&PrismBufferDx12> {
        match self {
            PrismBuffer::Dx11(_) => None,
            PrismBuffer::Dx12(inner) => Some(inner),
            PrismBuffer::Vk(_) => None,
        }
    }

    /// Get the underlying vulkan API object. This provides access to any internally created
    /// vulkan objects.
    pub fn vk_buffer(&self) -> Option<&PrismBufferVulkan> {
        match self {
            PrismBuffer::Dx11(_) => None,
            PrismBuffer::Dx12(_) => None,
            PrismBuffer::Vk(inner) => Some(inner),
        }
    }
}
