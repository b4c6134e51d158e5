#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use super::*;
use crate::{PrismError, PrismResult};

/// General configuration that all backends use when creating a device
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PrismDeviceDef {
    /// The backend to use. `None` picks the best supported backend for the platform. A backend
    /// requested explicitly is never substituted by another one.
    pub preferred_backend: Option<PrismBackendType>,

    /// Used to enable/disable validation at runtime. Validation is helpful during development but
    /// very expensive. Applications should not ship with validation enabled.
    pub validation_mode: PrismValidationMode,

    pub power_preference: PrismPowerPreference,

    /// Name given to the native device where the API supports it
    pub label: Option<String>,
}

/// Used to create a `PrismBuffer`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PrismBufferDef {
    /// Size in bytes. Must be at least 1.
    pub size: u64,
    pub usage: PrismBufferUsage,
    pub cpu_access: PrismCpuAccess,
    pub shared_resource_flags: PrismSharedResourceFlags,
    pub label: Option<String>,
}

impl Default for PrismBufferDef {
    fn default() -> Self {
        PrismBufferDef {
            size: 0,
            usage: PrismBufferUsage::default(),
            cpu_access: PrismCpuAccess::None,
            shared_resource_flags: PrismSharedResourceFlags::empty(),
            label: None,
        }
    }
}

impl PrismBufferDef {
    pub fn verify(&self) -> PrismResult<()> {
        if self.size == 0 {
            return Err(PrismError::invalid_argument(
                "size",
                "buffer size must be at least 1 byte",
            ));
        }

        Ok(())
    }

    pub fn for_usage(
        size: u64,
        usage: PrismBufferUsage,
    ) -> PrismBufferDef {
        PrismBufferDef {
            size,
            usage,
            ..Default::default()
        }
    }

    pub fn for_constant_buffer(size: u64) -> PrismBufferDef {
        PrismBufferDef {
            size,
            usage: PrismBufferUsage::CONSTANT,
            cpu_access: PrismCpuAccess::Write,
            ..Default::default()
        }
    }

    /// A CPU-writable buffer used as the source of copies to GPU-only resources
    pub fn for_staging_buffer(size: u64) -> PrismBufferDef {
        PrismBufferDef {
            size,
            usage: PrismBufferUsage::empty(),
            cpu_access: PrismCpuAccess::Write,
            ..Default::default()
        }
    }

    pub fn for_readback_buffer(size: u64) -> PrismBufferDef {
        PrismBufferDef {
            size,
            usage: PrismBufferUsage::empty(),
            cpu_access: PrismCpuAccess::Read,
            ..Default::default()
        }
    }

    pub fn for_data<T: Copy>(
        data: &[T],
        usage: PrismBufferUsage,
    ) -> PrismBufferDef {
        Self::for_usage(
            prism_base::memory::slice_size_in_bytes(data) as u64,
            usage,
        )
    }
}

/// Determines how many dimensions the texture will have.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismTextureDimension {
    Dim1D,
    Dim2D,
    Dim3D,
}

impl Default for PrismTextureDimension {
    fn default() -> Self {
        PrismTextureDimension::Dim2D
    }
}

/// Number of levels in a full mip chain for the given largest extent, 256 -> 9
pub fn mip_level_count_for_extent(max_extent: u32) -> u32 {
    if max_extent == 0 {
        return 0;
    }

    32 - max_extent.leading_zeros()
}

/// Used to create a `PrismTexture`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PrismTextureDef {
    pub dimension: PrismTextureDimension,
    pub format: PrismFormat,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, number of array layers otherwise. Set to 6 (or a multiple of 6) with
    /// equal width and height for cubemaps.
    pub depth_or_array_size: u32,
    /// 0 requests a full mip chain
    pub mip_levels: u32,
    pub sample_count: PrismSampleCount,
    pub usage: PrismTextureUsage,
    pub cpu_access: PrismCpuAccess,
    pub shared_resource_flags: PrismSharedResourceFlags,
    pub label: Option<String>,
}

impl Default for PrismTextureDef {
    fn default() -> Self {
        PrismTextureDef {
            dimension: PrismTextureDimension::Dim2D,
            format: PrismFormat::Rgba8Unorm,
            width: 1,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            sample_count: PrismSampleCount::SampleCount1,
            usage: PrismTextureUsage::SHADER_READ,
            cpu_access: PrismCpuAccess::None,
            shared_resource_flags: PrismSharedResourceFlags::empty(),
            label: None,
        }
    }
}

impl PrismTextureDef {
    pub fn texture_1d(
        format: PrismFormat,
        width: u32,
        mip_levels: u32,
        array_size: u32,
        usage: PrismTextureUsage,
    ) -> Self {
        PrismTextureDef {
            dimension: PrismTextureDimension::Dim1D,
            format,
            width,
            height: 1,
            depth_or_array_size: array_size,
            mip_levels,
            usage,
            ..Default::default()
        }
    }

    pub fn texture_2d(
        format: PrismFormat,
        width: u32,
        height: u32,
        mip_levels: u32,
        array_size: u32,
        usage: PrismTextureUsage,
    ) -> Self {
        PrismTextureDef {
            dimension: PrismTextureDimension::Dim2D,
            format,
            width,
            height,
            depth_or_array_size: array_size,
            mip_levels,
            usage,
            ..Default::default()
        }
    }

    pub fn texture_3d(
        format: PrismFormat,
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        usage: PrismTextureUsage,
    ) -> Self {
        PrismTextureDef {
            dimension: PrismTextureDimension::Dim3D,
            format,
            width,
            height,
            depth_or_array_size: depth,
            mip_levels,
            usage,
            ..Default::default()
        }
    }

    pub fn verify(&self) -> PrismResult<()> {
        if self.width == 0 {
            return Err(PrismError::invalid_argument(
                "width",
                "texture width must be at least 1",
            ));
        }

        if self.height == 0 {
            return Err(PrismError::invalid_argument(
                "height",
                "texture height must be at least 1",
            ));
        }

        if self.depth_or_array_size == 0 {
            return Err(PrismError::invalid_argument(
                "depth_or_array_size",
                "texture depth or array size must be at least 1",
            ));
        }

        if self.dimension == PrismTextureDimension::Dim1D && self.height != 1 {
            return Err(PrismError::invalid_argument(
                "height",
                format!("1D textures must have a height of 1, got {}", self.height),
            ));
        }

        let max_mip_levels = self.full_mip_chain_length();
        if self.mip_levels > max_mip_levels {
            return Err(PrismError::invalid_argument(
                "mip_levels",
                format!(
                    "{} mip levels requested but the full chain is {} levels",
                    self.mip_levels, max_mip_levels
                ),
            ));
        }

        if self.sample_count != PrismSampleCount::SampleCount1 {
            if self.dimension != PrismTextureDimension::Dim2D {
                return Err(PrismError::invalid_argument(
                    "sample_count",
                    "only 2D textures can be multisampled",
                ));
            }

            if self.resolved_mip_levels() != 1 {
                return Err(PrismError::invalid_argument(
                    "mip_levels",
                    "multisampled textures must have exactly one mip level",
                ));
            }
        }

        // Mapped textures use a linear layout on vulkan, which only allows a single 2D color
        // subresource
        if self.cpu_access != PrismCpuAccess::None {
            let single_subresource = self.dimension == PrismTextureDimension::Dim2D
                && self.resolved_mip_levels() == 1
                && self.depth_or_array_size == 1
                && self.sample_count == PrismSampleCount::SampleCount1;

            if !single_subresource || self.format.is_depth_stencil() {
                return Err(PrismError::invalid_argument(
                    "cpu_access",
                    format!(
                        "CPU accessible textures must be single-sampled 2D color textures with one \
                         mip level and one layer, got {:?} {:?} with {} mips, {} layers and {:?}",
                        self.dimension,
                        self.format,
                        self.resolved_mip_levels(),
                        self.depth_or_array_size,
                        self.sample_count
                    ),
                ));
            }
        }

        Ok(())
    }

    fn max_extent(&self) -> u32 {
        let depth = if self.dimension == PrismTextureDimension::Dim3D {
            self.depth_or_array_size
        } else {
            1
        };

        self.width.max(self.height).max(depth)
    }

    pub fn full_mip_chain_length(&self) -> u32 {
        mip_level_count_for_extent(self.max_extent())
    }

    /// The mip level count the texture is created with, resolving 0 to the full chain
    pub fn resolved_mip_levels(&self) -> u32 {
        if self.mip_levels == 0 {
            self.full_mip_chain_length()
        } else {
            self.mip_levels
        }
    }

    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            PrismTextureDimension::Dim3D => 1,
            _ => self.depth_or_array_size,
        }
    }

    pub fn depth(&self) -> u32 {
        match self.dimension {
            PrismTextureDimension::Dim3D => self.depth_or_array_size,
            _ => 1,
        }
    }

    /// 2D textures with at least 6 square layers can be viewed as cubemaps
    pub fn is_cube_compatible(&self) -> bool {
        self.dimension == PrismTextureDimension::Dim2D
            && self.depth_or_array_size >= 6
            && self.width == self.height
    }

    /// Depth formats read and written by shaders need a typeless native format so that views of
    /// different types can be created
    pub fn requires_typeless_format(&self) -> bool {
        self.format.is_depth_stencil() && self.usage.contains(PrismTextureUsage::SHADER_READ_WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_def() {
        let def = PrismBufferDef {
            size: 256,
            ..Default::default()
        };
        assert!(def.verify().is_ok());
        assert_eq!(def.usage, PrismBufferUsage::SHADER_READ_WRITE);
        assert_eq!(def.cpu_access, PrismCpuAccess::None);
        assert!(def.shared_resource_flags.is_empty());
    }

    #[test]
    fn test_zero_size_buffer_rejected() {
        let def = PrismBufferDef::default();
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("size"));
    }

    #[test]
    fn test_buffer_def_for_data() {
        let data = [0.0f32; 16];
        let def = PrismBufferDef::for_data(&data, PrismBufferUsage::VERTEX);
        assert_eq!(def.size, 64);
        assert_eq!(def.usage, PrismBufferUsage::VERTEX);
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count_for_extent(1), 1);
        assert_eq!(mip_level_count_for_extent(2), 2);
        assert_eq!(mip_level_count_for_extent(256), 9);
        assert_eq!(mip_level_count_for_extent(300), 9);
        assert_eq!(mip_level_count_for_extent(1024), 11);
    }

    #[test]
    fn test_texture_2d_def() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            256,
            256,
            0,
            1,
            PrismTextureUsage::SHADER_READ,
        );
        assert!(def.verify().is_ok());
        assert_eq!(def.dimension, PrismTextureDimension::Dim2D);
        assert_eq!(def.width, 256);
        assert_eq!(def.height, 256);
        assert_eq!(def.depth_or_array_size, 1);
        assert_eq!(def.resolved_mip_levels(), 9);
        assert_eq!(def.array_layers(), 1);
        assert_eq!(def.depth(), 1);
    }

    #[test]
    fn test_texture_3d_mips_use_depth() {
        let def = PrismTextureDef::texture_3d(
            PrismFormat::R8Unorm,
            16,
            16,
            64,
            0,
            PrismTextureUsage::SHADER_READ,
        );
        assert_eq!(def.resolved_mip_levels(), 7);
        assert_eq!(def.array_layers(), 1);
        assert_eq!(def.depth(), 64);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let base = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            64,
            64,
            1,
            1,
            PrismTextureUsage::SHADER_READ,
        );

        let def = PrismTextureDef { width: 0, ..base.clone() };
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("width"));

        let def = PrismTextureDef { height: 0, ..base.clone() };
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("height"));

        let def = PrismTextureDef {
            depth_or_array_size: 0,
            ..base
        };
        assert_eq!(
            def.verify().unwrap_err().invalid_field(),
            Some("depth_or_array_size")
        );
    }

    #[test]
    fn test_invalid_mip_and_sample_combinations() {
        let def = PrismTextureDef {
            mip_levels: 10,
            ..PrismTextureDef::texture_2d(
                PrismFormat::Rgba8Unorm,
                256,
                256,
                1,
                1,
                PrismTextureUsage::SHADER_READ,
            )
        };
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("mip_levels"));

        let def = PrismTextureDef {
            sample_count: PrismSampleCount::SampleCount4,
            mip_levels: 0,
            ..PrismTextureDef::texture_2d(
                PrismFormat::Rgba8Unorm,
                256,
                256,
                1,
                1,
                PrismTextureUsage::RENDER_TARGET,
            )
        };
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("mip_levels"));

        let def = PrismTextureDef::texture_1d(
            PrismFormat::Rgba8Unorm,
            256,
            1,
            1,
            PrismTextureUsage::SHADER_READ,
        );
        assert!(def.verify().is_ok());
        let def = PrismTextureDef { height: 2, ..def };
        assert_eq!(def.verify().unwrap_err().invalid_field(), Some("height"));
    }

    #[test]
    fn test_cpu_access_textures_have_one_subresource() {
        let staging = PrismTextureDef {
            cpu_access: PrismCpuAccess::Read,
            ..PrismTextureDef::texture_2d(
                PrismFormat::Rgba8Unorm,
                256,
                256,
                1,
                1,
                PrismTextureUsage::SHADER_READ,
            )
        };
        assert!(staging.verify().is_ok());

        let rejected = [
            // Full mip chain, cubemap layers
            PrismTextureDef::texture_2d(
                PrismFormat::Rgba8Unorm,
                256,
                256,
                0,
                6,
                PrismTextureUsage::SHADER_READ,
            ),
            PrismTextureDef {
                mip_levels: 2,
                ..staging.clone()
            },
            PrismTextureDef {
                depth_or_array_size: 2,
                ..staging.clone()
            },
            PrismTextureDef {
                sample_count: PrismSampleCount::SampleCount4,
                ..staging.clone()
            },
            PrismTextureDef {
                format: PrismFormat::Depth32Float,
                ..staging.clone()
            },
            PrismTextureDef::texture_1d(
                PrismFormat::Rgba8Unorm,
                256,
                1,
                1,
                PrismTextureUsage::SHADER_READ,
            ),
            PrismTextureDef::texture_3d(
                PrismFormat::R8Unorm,
                16,
                16,
                16,
                1,
                PrismTextureUsage::SHADER_READ,
            ),
        ];

        for def in rejected.iter() {
            for cpu_access in [PrismCpuAccess::Read, PrismCpuAccess::Write].iter() {
                let def = PrismTextureDef {
                    cpu_access: *cpu_access,
                    ..def.clone()
                };
                assert_eq!(
                    def.verify().unwrap_err().invalid_field(),
                    Some("cpu_access"),
                    "{:?}",
                    def
                );

                // The same layout is fine without CPU access
                let def = PrismTextureDef {
                    cpu_access: PrismCpuAccess::None,
                    ..def
                };
                assert!(def.verify().is_ok(), "{:?}", def);
            }
        }
    }

    #[test]
    fn test_cube_compatibility() {
        let cube = PrismTextureDef::texture_2d(
            PrismFormat::Rgba8Unorm,
            128,
            128,
            1,
            6,
            PrismTextureUsage::SHADER_READ,
        );
        assert!(cube.is_cube_compatible());

        let non_square = PrismTextureDef { height: 64, ..cube.clone() };
        assert!(!non_square.is_cube_compatible());

        let too_few_layers = PrismTextureDef {
            depth_or_array_size: 5,
            ..cube.clone()
        };
        assert!(!too_few_layers.is_cube_compatible());

        let volume = PrismTextureDef {
            dimension: PrismTextureDimension::Dim3D,
            ..cube
        };
        assert!(!volume.is_cube_compatible());
    }

    #[test]
    fn test_typeless_depth() {
        let def = PrismTextureDef::texture_2d(
            PrismFormat::Depth32Float,
            64,
            64,
            1,
            1,
            PrismTextureUsage::SHADER_READ_WRITE,
        );
        assert!(def.requires_typeless_format());

        let def = PrismTextureDef {
            usage: PrismTextureUsage::SHADER_READ | PrismTextureUsage::RENDER_TARGET,
            ..def
        };
        assert!(!def.requires_typeless_format());
    }
}
