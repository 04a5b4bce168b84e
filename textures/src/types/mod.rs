//! Core types for the texture system.

mod flags;
mod format;
mod sampler;

pub use flags::{CreateFlags, LockFlags};
pub use format::TextureFormat;
pub use sampler::{AddressMode, FilterMode, MipFilterMode, SamplerState};

/// 3D extent (width, height, depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 3D extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a 2D extent (depth = 1).
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Extent of mip `level`; every dimension stays at least 1.
    pub fn mip(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }
}

impl Default for Extent3d {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Texel offset inside a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3d {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Offset3d {
    /// Origin.
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new offset.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_extent() {
        let extent = Extent3d::new(256, 64, 8);
        assert_eq!(extent.mip(0), extent);
        assert_eq!(extent.mip(3), Extent3d::new(32, 8, 1));
        assert_eq!(extent.mip(10), Extent3d::new(1, 1, 1));
    }
}
