use super::buffer::dx11_shared_misc_flags;
use super::native::*;
use crate::dx11::PrismDeviceContextDx11;
use crate::dxgi::dxgi_resource_format;
use crate::{PrismCpuAccess, PrismNativeHandle, PrismResult, PrismTextureDef, PrismTextureUsage};

/// Translates a texture def into the D3D11 texture desc of its dimension
pub fn dx11_texture_desc(texture_def: &PrismTextureDef) -> Dx11TextureDesc {
    let (usage, cpu_access_flags) = match texture_def.cpu_access {
        PrismCpuAccess::None => (Dx11Usage::Default, Dx11CpuAccessFlags::empty()),
        PrismCpuAccess::Read => (Dx11Usage::Staging, Dx11CpuAccessFlags::READ),
        PrismCpuAccess::Write => (Dx11Usage::Dynamic, Dx11CpuAccessFlags::WRITE),
    };

    let mut bind_flags = Dx11BindFlags::empty();
    if texture_def.cpu_access != PrismCpuAccess::Read {
        if texture_def.usage.contains(PrismTextureUsage::SHADER_READ) {
            bind_flags |= Dx11BindFlags::SHADER_RESOURCE;
        }

        if texture_def.usage.contains(PrismTextureUsage::SHADER_WRITE) {
            bind_flags |= Dx11BindFlags::UNORDERED_ACCESS;
        }

        if texture_def.usage.contains(PrismTextureUsage::RENDER_TARGET) {
            if texture_def.format.is_depth_stencil() {
                bind_flags |= Dx11BindFlags::DEPTH_STENCIL;
            } else {
                bind_flags |= Dx11BindFlags::RENDER_TARGET;
            }
        }
    }

    let mut misc_flags = dx11_shared_misc_flags(texture_def.shared_resource_flags);
    if texture_def.is_cube_compatible() {
        misc_flags |= Dx11ResourceMiscFlags::TEXTURECUBE;
    }

    Dx11TextureDesc {
        dimension: texture_def.dimension,
        width: texture_def.width,
        height: texture_def.height,
        depth: texture_def.depth(),
        mip_levels: texture_def.resolved_mip_levels(),
        array_size: texture_def.array_layers(),
        format: dxgi_resource_format(
            texture_def.format,
            texture_def.requires_typeless_format(),
        ),
        sample_count: texture_def.sample_count.as_u32(),
        sample_quality: 0,
        usage,
        bind_flags,
        cpu_access_flags,
        misc_flags,
    }
}

#[derive(Debug)]
pub struct PrismTextureDx11 {
    device_context: PrismDeviceContextDx11,
    texture_def: PrismTextureDef,
    desc: Dx11TextureDesc,
    texture: PrismNativeHandle,
}

impl Drop for PrismTextureDx11 {
    fn drop(&mut self) {
        log::trace!("destroying PrismTextureDx11 {:?}", self.texture);
        self.device_context
            .native_device()
            .release_resource(self.texture);
    }
}

impl PrismTextureDx11 {
    pub fn texture_def(&self) -> &PrismTextureDef {
        &self.texture_def
    }

    pub fn dx11_texture_desc(&self) -> &Dx11TextureDesc {
        &self.desc
    }

    pub fn dx11_texture(&self) -> PrismNativeHandle {
        self.texture
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_resource_name(self.texture, label);
        self.texture_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextDx11,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<Self> {
        texture_def.verify()?;

        // Mip level 0 is resolved here so the def reports the created mip count
        let mut texture_def = texture_def.clone();
        texture_def.mip_levels = texture_def.resolved_mip_levels();

        let desc = dx11_texture_desc(&texture_def);
        let texture = device_context.native_device().create_texture(&desc)?;
        log::trace!("created PrismTextureDx11 {:?} {:?}", texture, desc);

        if let Some(label) = &texture_def.label {
            device_context
                .native_device()
                .set_resource_name(texture, label);
        }

        Ok(PrismTextureDx11 {
            device_context: device_context.clone(),
            texture_def,
            desc,
            texture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxgi::DxgiFormat;
    use crate::{PrismFormat, PrismSharedResourceFlags, PrismTextureDimension};

    #[test]
    fn test_cube_texture_desc() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            128,
            128,
            0,
            6,
            PrismTextureUsage::SHADER_READ,
        );
        let desc = dx11_texture_desc(&def);
        assert_eq!(desc.dimension, PrismTextureDimension::Dim2D);
        assert_eq!(desc.mip_levels, 8);
        assert_eq!(desc.array_size, 6);
        assert_eq!(desc.depth, 1);
        assert!(desc.misc_flags.contains(Dx11ResourceMiscFlags::TEXTURECUBE));
        assert_eq!(desc.bind_flags, Dx11BindFlags::SHADER_RESOURCE);
    }

    #[test]
    fn test_depth_render_target_desc() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Depth32Float,
            64,
            32,
            1,
            1,
            PrismTextureUsage::RENDER_TARGET | PrismTextureUsage::SHADER_READ_WRITE,
        );
        let desc = dx11_texture_desc(&def);
        assert_eq!(desc.format, DxgiFormat::R32_TYPELESS);
        assert_eq!(
            desc.bind_flags,
            Dx11BindFlags::DEPTH_STENCIL
                | Dx11BindFlags::SHADER_RESOURCE
                | Dx11BindFlags::UNORDERED_ACCESS
        );
        assert!(!desc.misc_flags.contains(Dx11ResourceMiscFlags::TEXTURECUBE));
    }

    #[test]
    fn test_color_render_target_desc() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Bgra8Unorm,
            64,
            64,
            1,
            1,
            PrismTextureUsage::RENDER_TARGET,
        );
        let desc = dx11_texture_desc(&def);
        assert_eq!(desc.format, DxgiFormat::B8G8R8A8_UNORM);
        assert_eq!(desc.bind_flags, Dx11BindFlags::RENDER_TARGET);
    }

    #[test]
    fn test_staging_texture_desc() {
        let def = PrismTextureDef {
            width: 16,
            height: 16,
            cpu_access: PrismCpuAccess::Read,
            shared_resource_flags: PrismSharedResourceFlags::SHARED,
            ..Default::default()
        };
        let desc = dx11_texture_desc(&def);
        assert_eq!(desc.usage, Dx11Usage::Staging);
        assert_eq!(desc.cpu_access_flags, Dx11CpuAccessFlags::READ);
        assert!(desc.bind_flags.is_empty());
        assert_eq!(desc.misc_flags, Dx11ResourceMiscFlags::SHARED);
    }

    #[test]
    fn test_3d_texture_desc() {
        let def = PrismTextureDef::texture_3d(
            PrismFormat::R16Float,
            32,
            16,
            64,
            0,
            PrismTextureUsage::SHADER_READ_WRITE,
        );
        let desc = dx11_texture_desc(&def);
        assert_eq!(desc.depth, 64);
        assert_eq!(desc.array_size, 1);
        assert_eq!(desc.mip_levels, 7);
    }
}
