//! Format and parameter resolution.
//!
//! Turns the legacy create-flag bitmask plus requested dimensions into the
//! canonical format, flags and mip count used by the rest of the crate.

use crate::types::{CreateFlags, TextureFormat};

/// Smallest mip dimension for automatically sized render target chains.
pub const RENDER_TARGET_MIN_MIP_SIZE: u32 = 1;
/// Smallest mip dimension for automatically sized chains of other textures.
pub const DEFAULT_MIN_MIP_SIZE: u32 = 4;

/// Output of [`resolve_parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedParameters {
    /// Flags with a concrete format code.
    pub flags: CreateFlags,
    /// The concrete format.
    pub format: TextureFormat,
    /// Concrete mip count, at least 1.
    pub mip_levels: u32,
}

/// Number of mips until the smaller dimension would drop below `min_size`.
///
/// Equals `1 + floor(log2(min(width, height) / min_size))`, never less than 1.
pub fn auto_mip_levels(width: u32, height: u32, min_size: u32) -> u32 {
    let min_size = min_size.max(1);
    let (mut width, mut height) = (width, height);
    let mut levels = 1;
    while width / 2 >= min_size && height / 2 >= min_size {
        levels += 1;
        width /= 2;
        height /= 2;
    }
    levels
}

/// Resolve the default format and an automatic mip count.
pub fn resolve_parameters(
    width: u32,
    height: u32,
    flags: CreateFlags,
    levels: u32,
) -> ResolvedParameters {
    let format = flags.format().unwrap_or(TextureFormat::A8R8G8B8);
    let mut flags = flags.with_format(format);

    // Only re-asserts an already requested sRGB read.
    if flags.contains(CreateFlags::RENDER_TARGET | CreateFlags::SRGB_WRITE)
        && format != TextureFormat::A8R8G8B8
        && flags.contains(CreateFlags::SRGB_READ)
    {
        flags |= CreateFlags::SRGB_READ;
    }

    let mip_levels = if levels == 0 {
        let min_size = if flags.contains(CreateFlags::RENDER_TARGET) {
            RENDER_TARGET_MIN_MIP_SIZE
        } else {
            DEFAULT_MIN_MIP_SIZE
        };
        auto_mip_levels(width, height, min_size)
    } else {
        levels
    };

    ResolvedParameters {
        flags,
        format,
        mip_levels,
    }
}
