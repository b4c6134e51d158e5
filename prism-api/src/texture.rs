use crate::dx11::PrismTextureDx11;
use crate::dx12::PrismTextureDx12;
use crate::vulkan::PrismTextureVulkan;
use crate::{PrismBackendType, PrismNativeHandle, PrismTextureDef};

/// An image that can be used by the GPU.
///
/// Textures must not be dropped if they are in use by the GPU.
#[derive(Debug)]
pub enum PrismTexture {
    Dx11(PrismTextureDx11),
    Dx12(PrismTextureDx12),
    Vk(PrismTextureVulkan),
}

impl PrismTexture {
    pub fn backend_type(&self) -> PrismBackendType {
        match self {
            PrismTexture::Dx11(_) => PrismBackendType::Dx11,
            PrismTexture::Dx12(_) => PrismBackendType::Dx12,
            PrismTexture::Vk(_) => PrismBackendType::Vulkan,
        }
    }

    /// The def the texture was created with, with `mip_levels` resolved to the actual count
    pub fn texture_def(&self) -> &PrismTextureDef {
        match self {
            PrismTexture::Dx11(inner) => inner.texture_def(),
            PrismTexture::Dx12(inner) => inner.texture_def(),
            PrismTexture::Vk(inner) => inner.texture_def(),
        }
    }

    pub fn native_handle(&self) -> PrismNativeHandle {
        match self {
            PrismTexture::Dx11(inner) => inner.dx11_texture(),
            PrismTexture::Dx12(inner) => inner.dx12_resource(),
            PrismTexture::Vk(inner) => inner.vk_image(),
        }
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        match self {
            PrismTexture::Dx11(inner) => inner.set_label(label),
            PrismTexture::Dx12(inner) => inner.set_label(label),
            PrismTexture::Vk(inner) => inner.set_label(label),
        }
    }

    pub fn dx11_texture(&self) -> Option<&PrismTextureDx11> {
        match self {
            PrismTexture::Dx11(inner) => Some(inner),
            PrismTexture::Dx12(_) => None,
            PrismTexture::Vk(_) => None,
        }
    }

    pub fn dx12_texture(&self) -> Option<&PrismTextureDx12> {
        match self {
            PrismTexture::Dx11(_) => None,
            PrismTexture::Dx12(inner) => Some(inner),
            PrismTexture::Vk(_) => None,
        }
    }

    pub fn vk_texture(&self) -> Option<&PrismTextureVulkan> {
        match self {
            PrismTexture::Dx11(_) => None,
            PrismTexture::Dx12(_) => None,
            PrismTexture::Vk(inner) => Some(inner),
        }
    }
}
