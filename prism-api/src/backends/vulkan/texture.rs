use super::buffer::{log_ignored_shared_flags, vk_memory_location};
use super::native::*;
use crate::vulkan::PrismDeviceContextVulkan;
use crate::{
    PrismCpuAccess, PrismFormat, PrismNativeHandle, PrismResult, PrismTextureDef,
    PrismTextureDimension, PrismTextureUsage,
};

impl From<PrismFormat> for VkFormat {
    fn from(format: PrismFormat) -> Self {
        match format {
            PrismFormat::R8Unorm => VkFormat::R8_UNORM,
            PrismFormat::Rg8Unorm => VkFormat::R8G8_UNORM,
            PrismFormat::Rgba8Unorm => VkFormat::R8G8B8A8_UNORM,
            PrismFormat::Rgba8UnormSrgb => VkFormat::R8G8B8A8_SRGB,
            PrismFormat::Bgra8Unorm => VkFormat::B8G8R8A8_UNORM,
            PrismFormat::Bgra8UnormSrgb => VkFormat::B8G8R8A8_SRGB,
            PrismFormat::Rgb10A2Unorm => VkFormat::A2B10G10R10_UNORM_PACK32,
            PrismFormat::Rg11B10Float => VkFormat::B10G11R11_UFLOAT_PACK32,
            PrismFormat::R16Float => VkFormat::R16_SFLOAT,
            PrismFormat::Rgba16Float => VkFormat::R16G16B16A16_SFLOAT,
            PrismFormat::R32Uint => VkFormat::R32_UINT,
            PrismFormat::R32Float => VkFormat::R32_SFLOAT,
            PrismFormat::Rg32Float => VkFormat::R32G32_SFLOAT,
            PrismFormat::Rgba32Float => VkFormat::R32G32B32A32_SFLOAT,
            PrismFormat::Depth16Unorm => VkFormat::D16_UNORM,
            PrismFormat::Depth32Float => VkFormat::D32_SFLOAT,
            PrismFormat::Depth24UnormStencil8 => VkFormat::D24_UNORM_S8_UINT,
            PrismFormat::Depth32FloatStencil8 => VkFormat::D32_SFLOAT_S8_UINT,
            PrismFormat::Bc1RgbaUnorm => VkFormat::BC1_RGBA_UNORM_BLOCK,
            PrismFormat::Bc3RgbaUnorm => VkFormat::BC3_UNORM_BLOCK,
            PrismFormat::Bc7RgbaUnorm => VkFormat::BC7_UNORM_BLOCK,
        }
    }
}

pub fn vk_image_desc(texture_def: &PrismTextureDef) -> VkImageDesc {
    let image_type = match texture_def.dimension {
        PrismTextureDimension::Dim1D => VkImageType::Type1D,
        PrismTextureDimension::Dim2D => VkImageType::Type2D,
        PrismTextureDimension::Dim3D => VkImageType::Type3D,
    };

    let mut usage = VkImageUsageFlags::TRANSFER_SRC | VkImageUsageFlags::TRANSFER_DST;
    if texture_def.usage.contains(PrismTextureUsage::SHADER_READ) {
        usage |= VkImageUsageFlags::SAMPLED;
    }

    if texture_def.usage.contains(PrismTextureUsage::SHADER_WRITE) {
        usage |= VkImageUsageFlags::STORAGE;
    }

    if texture_def.usage.contains(PrismTextureUsage::RENDER_TARGET) {
        if texture_def.format.is_depth_stencil() {
            usage |= VkImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            usage |= VkImageUsageFlags::COLOR_ATTACHMENT;
        }
    }

    let mut flags = VkImageCreateFlags::empty();
    if texture_def.is_cube_compatible() {
        flags |= VkImageCreateFlags::CUBE_COMPATIBLE;
    }

    if texture_def.requires_typeless_format() {
        flags |= VkImageCreateFlags::MUTABLE_FORMAT;
    }

    // Host visible images must be linear to be mapped. Verified defs with CPU access have a single
    // 2D color subresource, which linear tiling allows.
    let tiling = match texture_def.cpu_access {
        PrismCpuAccess::None => VkImageTiling::Optimal,
        PrismCpuAccess::Read | PrismCpuAccess::Write => VkImageTiling::Linear,
    };

    VkImageDesc {
        image_type,
        format: texture_def.format.into(),
        extent: [texture_def.width, texture_def.height, texture_def.depth()],
        mip_levels: texture_def.resolved_mip_levels(),
        array_layers: texture_def.array_layers(),
        samples: texture_def.sample_count.as_u32(),
        tiling,
        usage,
        flags,
    }
}

#[derive(Debug)]
pub struct PrismTextureVulkan {
    device_context: PrismDeviceContextVulkan,
    texture_def: PrismTextureDef,
    desc: VkImageDesc,
    image: PrismNativeHandle,
}

impl Drop for PrismTextureVulkan {
    fn drop(&mut self) {
        log::trace!("destroying PrismTextureVulkan {:?}", self.image);
        self.device_context
            .native_device()
            .destroy_image(self.image);
    }
}

impl PrismTextureVulkan {
    pub fn texture_def(&self) -> &PrismTextureDef {
        &self.texture_def
    }

    pub fn vk_image_desc(&self) -> &VkImageDesc {
        &self.desc
    }

    pub fn vk_image(&self) -> PrismNativeHandle {
        self.image
    }

    pub fn set_label(
        &mut self,
        label: &str,
    ) {
        self.device_context
            .native_device()
            .set_object_name(self.image, label);
        self.texture_def.label = Some(label.to_string());
    }

    pub fn new(
        device_context: &PrismDeviceContextVulkan,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<Self> {
        texture_def.verify()?;
        log_ignored_shared_flags(texture_def.shared_resource_flags);

        let mut texture_def = texture_def.clone();
        texture_def.mip_levels = texture_def.resolved_mip_levels();

        let desc = vk_image_desc(&texture_def);
        let image = device_context
            .native_device()
            .create_image(&desc, vk_memory_location(texture_def.cpu_access))?;
        log::trace!("created PrismTextureVulkan {:?} {:?}", image, desc);

        if let Some(label) = &texture_def.label {
            device_context.native_device().set_object_name(image, label);
        }

        Ok(PrismTextureVulkan {
            device_context: device_context.clone(),
            texture_def,
            desc,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrismSampleCount;

    #[test]
    fn test_cube_image() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Rgba16Float,
            256,
            256,
            0,
            6,
            PrismTextureUsage::SHADER_READ,
        );
        let desc = vk_image_desc(&def);
        assert_eq!(desc.flags, VkImageCreateFlags::CUBE_COMPATIBLE);
        assert_eq!(desc.mip_levels, 9);
        assert_eq!(desc.array_layers, 6);
        assert_eq!(desc.extent, [256, 256, 1]);
        assert_eq!(desc.format, VkFormat::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_depth_image_usage() {
        let def = PrismTextureDef {
            format: PrismFormat::Depth32Float,
            width: 1024,
            height: 768,
            usage: PrismTextureUsage::RENDER_TARGET | PrismTextureUsage::SHADER_READ_WRITE,
            sample_count: PrismSampleCount::SampleCount4,
            ..Default::default()
        };
        let desc = vk_image_desc(&def);
        assert!(desc
            .usage
            .contains(VkImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | VkImageUsageFlags::STORAGE));
        assert!(!desc.usage.contains(VkImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(desc.flags, VkImageCreateFlags::MUTABLE_FORMAT);
        assert_eq!(desc.samples, 4);
        assert_eq!(desc.tiling, VkImageTiling::Optimal);
    }

    #[test]
    fn test_volume_and_host_visible_images() {
        let def = PrismTextureDef::texture_3d(
            PrismFormat::R8Unorm,
            32,
            32,
            16,
            1,
            PrismTextureUsage::SHADER_READ,
        );
        let desc = vk_image_desc(&def);
        assert_eq!(desc.image_type, VkImageType::Type3D);
        assert_eq!(desc.extent, [32, 32, 16]);
        assert_eq!(desc.array_layers, 1);

        let def = PrismTextureDef {
            cpu_access: PrismCpuAccess::Write,
            ..Default::default()
        };
        assert_eq!(vk_image_desc(&def).tiling, VkImageTiling::Linear);
    }
}
