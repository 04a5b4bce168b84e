//! Per-texture sampler state.

/// Texture coordinate addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Repeat.
    #[default]
    Wrap,
    /// Repeat mirrored.
    Mirror,
    /// Clamp to the edge texel.
    Clamp,
    /// Use the border color outside [0, 1].
    Border,
    /// Mirror once, then clamp.
    MirrorOnce,
}

/// Minification/magnification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    Point,
    /// Bilinear.
    #[default]
    Linear,
    /// Anisotropic.
    Best,
    /// Depth comparison filter.
    Compare,
}

/// Filter between mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipFilterMode {
    /// Nearest mip.
    Point,
    /// Blend between mips.
    #[default]
    Linear,
    /// Only the top visible mip.
    None,
}

/// Sampler state stored on a texture record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    /// Packed ARGB border color.
    pub border_color: u32,
    pub filter: FilterMode,
    pub mip_filter: MipFilterMode,
    pub lod_bias: f32,
    pub anisotropy: u32,
}

impl SamplerState {
    /// Maximum anisotropy level.
    pub const MAX_ANISOTROPY: u32 = 16;

    /// Default sampler for a texture; cube maps clamp instead of wrapping.
    pub fn new(cube: bool, lod_bias: f32, anisotropy: u32) -> Self {
        let address = if cube { AddressMode::Clamp } else { AddressMode::Wrap };
        Self {
            address_u: address,
            address_v: address,
            address_w: address,
            border_color: 0,
            filter: FilterMode::default(),
            mip_filter: MipFilterMode::default(),
            lod_bias,
            anisotropy: anisotropy.clamp(1, Self::MAX_ANISOTROPY),
        }
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::new(false, 0.0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_defaults_clamp() {
        let sampler = SamplerState::new(true, 0.0, 1);
        assert_eq!(sampler.address_u, AddressMode::Clamp);
        assert_eq!(sampler.address_w, AddressMode::Clamp);
        assert_eq!(SamplerState::default().address_v, AddressMode::Wrap);
    }

    #[test]
    fn test_anisotropy_clamped() {
        assert_eq!(SamplerState::new(false, 0.0, 0).anisotropy, 1);
        assert_eq!(SamplerState::new(false, 0.0, 64).anisotropy, 16);
    }
}
