#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Pixel formats that can be requested for a texture. Each backend translates these to its native
/// format enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum PrismFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10A2Unorm,
    Rg11B10Float,
    R16Float,
    Rgba16Float,
    R32Uint,
    R32Float,
    Rg32Float,
    Rgba32Float,
    Depth16Unorm,
    Depth32Float,
    Depth24UnormStencil8,
    Depth32FloatStencil8,
    Bc1RgbaUnorm,
    Bc3RgbaUnorm,
    Bc7RgbaUnorm,
}

impl Default for PrismFormat {
    fn default() -> Self {
        PrismFormat::Rgba8Unorm
    }
}

impl PrismFormat {
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            PrismFormat::Depth16Unorm
                | PrismFormat::Depth32Float
                | PrismFormat::Depth24UnormStencil8
                | PrismFormat::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            PrismFormat::Depth24UnormStencil8 | PrismFormat::Depth32FloatStencil8
        )
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            PrismFormat::Bc1RgbaUnorm | PrismFormat::Bc3RgbaUnorm | PrismFormat::Bc7RgbaUnorm
        )
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            PrismFormat::Rgba8UnormSrgb | PrismFormat::Bgra8UnormSrgb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_classification() {
        assert!(PrismFormat::Depth32Float.is_depth_stencil());
        assert!(!PrismFormat::Depth32Float.has_stencil());
        assert!(PrismFormat::Depth24UnormStencil8.has_stencil());
        assert!(!PrismFormat::Rgba8Unorm.is_depth_stencil());
        assert!(PrismFormat::Bc7RgbaUnorm.is_compressed());
        assert!(PrismFormat::Bgra8UnormSrgb.is_srgb());
    }
}
