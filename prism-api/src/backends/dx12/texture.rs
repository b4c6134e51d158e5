use super::buffer::dx12_shared_flags;
use super::native::*;
use crate::dx12::PrismDeviceContextDx12;
use crate::dxgi::dxgi_resource_format;
use crate::{
    PrismCpuAccess, PrismError, PrismNativeHandle, PrismResult, PrismTextureDef,
    PrismTextureDimension, PrismTextureUsage,
};

/// Everything needed to call CreateCommittedResource for a texture
#[derive(Clone, Debug, PartialEq)]
pub struct Dx12TextureAllocation {
    pub heap_properties: Dx12HeapProperties,
    pub heap_flags: Dx12HeapFlags,
    pub desc: Dx12ResourceDesc,
    pub initial_state: Dx12ResourceStates,
}

pub fn dx12_texture_allocation(
    texture_def: &PrismTextureDef
) -> PrismResult<Dx12TextureAllocation> {
    let dimension = match texture_def.dimension {
        PrismTextureDimension::Dim1D => Dx12ResourceDimension::Texture1D,
        PrismTextureDimension::Dim2D => Dx12ResourceDimension::Texture2D,
        PrismTextureDimension::Dim3D => Dx12ResourceDimension::Texture3D,
    };

    let depth_or_array_size = u16::try_from(texture_def.depth_or_array_size).map_err(|_| {
        PrismError::invalid_argument(
            "depth_or_array_size",
            format!("D3D12 textures are limited to {} layers", u16::MAX),
        )
    })?;

    // The full chain of any u32 extent is at most 32 levels
    let mip_levels = texture_def.resolved_mip_levels() as u16;

    let (heap_flags, mut flags) = dx12_shared_flags(texture_def.shared_resource_flags);

    if texture_def.usage.contains(PrismTextureUsage::SHADER_WRITE) {
        flags |= Dx12ResourceFlags::ALLOW_UNORDERED_ACCESS;
    }

    let is_depth = texture_def.format.is_depth_stencil();
    let mut initial_state = Dx12ResourceStates::COMMON;
    if texture_def.usage.contains(PrismTextureUsage::RENDER_TARGET) {
        if is_depth {
            flags |= Dx12ResourceFlags::ALLOW_DEPTH_STENCIL;
            initial_state = Dx12ResourceStates::DEPTH_WRITE;

            if !texture_def.usage.contains(PrismTextureUsage::SHADER_READ) {
                flags |= Dx12ResourceFlags::DENY_SHADER_RESOURCE;
            }
        } else {
            flags |= Dx12ResourceFlags::ALLOW_RENDER_TARGET;
            initial_state = Dx12ResourceStates::RENDER_TARGET;
        }
    }

    let heap_properties = match texture_def.cpu_access {
        PrismCpuAccess::None => Dx12HeapProperties::new(Dx12HeapType::Default),
        PrismCpuAccess::Read => {
            Dx12HeapProperties::custom(Dx12CpuPageProperty::WriteBack, Dx12MemoryPool::L0)
        }
        PrismCpuAccess::Write => {
            Dx12HeapProperties::custom(Dx12CpuPageProperty::WriteCombine, Dx12MemoryPool::L0)
        }
    };

    Ok(Dx12TextureAllocation {
        heap_properties,
        heap_flags,
        desc: Dx12ResourceDesc {
            dimension,
            alignment: 0,
            width: texture_def.width as u64,
            height: texture_def.height,
            depth_or_array_size,
            mip_levels,
            format: dxgi_resource_format(
                texture_def.format,
                texture_def.requires_typeless_format(),
            ),
            sample_count: texture_def.sample_count.as_u32(),
            sample_quality: 0,
            layout: Dx12TextureLayout::Unknown,
            flags,
        },
        initial_state,
    })
}

#[derive(Debug)]
pub struct PrismTextureDx12 {
    device_context: PrismDeviceContextDx12,
    texture_def: PrismTextureDef,
    allocation: Dx12TextureAllocation,
    resource: PrismNativeHandle,
}

impl Drop for PrismTextureDx12 {
    fn drop(&mut self) {
        log::trace!("destroying PrismTextureDx12 {:?}", self.resource);
        self.device_context
            .native_device()
            .release_resource(self.resource);
    }
}

impl PrismTextureDx12 {
    pub fn texture_def(&self) -> &PrismTextureDef {
        &self.texture_def
    }

    pub fn dx12_allocation(&self) -> &Dx12TextureAllocation {
        &self.allocation
    }

    pub fn dx12_resource(&self) -> PrismNativeHandle {
        self.resource
    }

    /// Cube views can be created on textures with 6 square layers or more
    pub fn is_cube_compatible(&self) -> bool {
        self.texture_def.is_cube_compatible()
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_resource_name(self.resource, label);
        self.texture_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextDx12,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<Self> {
        texture_def.verify()?;

        let mut texture_def = texture_def.clone();
        texture_def.mip_levels = texture_def.resolved_mip_levels();

        let allocation = dx12_texture_allocation(&texture_def)?;
        let resource = device_context.native_device().create_committed_resource(
            &allocation.heap_properties,
            allocation.heap_flags,
            &allocation.desc,
            allocation.initial_state,
        )?;
        log::trace!("created PrismTextureDx12 {:?} {:?}", resource, allocation);

        if let Some(label) = &texture_def.label {
            device_context
                .native_device()
                .set_resource_name(resource, label);
        }

        Ok(PrismTextureDx12 {
            device_context: device_context.clone(),
            texture_def,
            allocation,
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxgi::DxgiFormat;
    use crate::PrismFormat;

    #[test]
    fn test_depth_target_without_shader_read() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Depth24UnormStencil8,
            1920,
            1080,
            1,
            1,
            PrismTextureUsage::RENDER_TARGET,
        );
        let allocation = dx12_texture_allocation(&def).unwrap();
        assert_eq!(
            allocation.desc.flags,
            Dx12ResourceFlags::ALLOW_DEPTH_STENCIL | Dx12ResourceFlags::DENY_SHADER_RESOURCE
        );
        assert_eq!(allocation.desc.format, DxgiFormat::D24_UNORM_S8_UINT);
        assert_eq!(allocation.initial_state, Dx12ResourceStates::DEPTH_WRITE);
    }

    #[test]
    fn test_typeless_depth_texture() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Depth32Float,
            512,
            512,
            0,
            1,
            PrismTextureUsage::SHADER_READ_WRITE,
        );
        let allocation = dx12_texture_allocation(&def).unwrap();
        assert_eq!(allocation.desc.format, DxgiFormat::R32_TYPELESS);
        assert_eq!(allocation.desc.mip_levels, 10);
        assert_eq!(
            allocation.desc.flags,
            Dx12ResourceFlags::ALLOW_UNORDERED_ACCESS
        );
    }

    #[test]
    fn test_cpu_access_texture_uses_custom_heap() {
        let def = PrismTextureDef {
            width: 4,
            height: 4,
            cpu_access: PrismCpuAccess::Read,
            ..Default::default()
        };
        let allocation = dx12_texture_allocation(&def).unwrap();
        assert_eq!(allocation.heap_properties.heap_type, Dx12HeapType::Custom);
        assert_eq!(
            allocation.heap_properties.cpu_page_property,
            Dx12CpuPageProperty::WriteBack
        );
        assert_eq!(allocation.heap_properties.memory_pool, Dx12MemoryPool::L0);
    }

    #[test]
    fn test_texture_dimensions() {
        let def = PrismTextureDef::texture_1d(
            PrismFormat::R32Float,
            64,
            1,
            4,
            PrismTextureUsage::SHADER_READ,
        );
        let allocation = dx12_texture_allocation(&def).unwrap();
        assert_eq!(allocation.desc.dimension, Dx12ResourceDimension::Texture1D);
        assert_eq!(allocation.desc.depth_or_array_size, 4);

        let def = PrismTextureDef {
            depth_or_array_size: 70000,
            ..Default::default()
        };
        assert_eq!(
            dx12_texture_allocation(&def).unwrap_err().invalid_field(),
            Some("depth_or_array_size")
        );
    }
}
