//! Texture formats and their metadata.
//!
//! Formats carry the legacy engine names (`A8R8G8B8` is the BGRA8 layout in memory)
//! because the create-flag bitmask stores them as an 8-bit code.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Unorm,
    Snorm,
    Float,
    Uint,
    Depth,
}

#[derive(Debug, Clone, Copy)]
struct FormatInfo {
    name: &'static str,
    bytes_per_block: u32,
    block: u32,
    class: Class,
    stencil: bool,
    srgb: bool,
}

const fn info(name: &'static str, bytes_per_block: u32, block: u32, class: Class) -> FormatInfo {
    FormatInfo {
        name,
        bytes_per_block,
        block,
        class,
        stencil: false,
        srgb: false,
    }
}

const fn srgb(mut info: FormatInfo) -> FormatInfo {
    info.srgb = true;
    info
}

const fn stencil(mut info: FormatInfo) -> FormatInfo {
    info.stencil = true;
    info
}

/// Texture format enumeration.
///
/// The discriminant is the code stored in the high byte of
/// [`CreateFlags`](super::CreateFlags); code 0 means "default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TextureFormat {
    /// 8-bit BGRA, unsigned normalized. The default color format.
    #[default]
    A8R8G8B8 = 1,
    /// 10-bit BGR with 2-bit alpha.
    A2R10G10B10 = 2,
    /// 10-bit RGB with 2-bit alpha.
    A2B10G10R10 = 3,
    /// 16-bit RGBA, unsigned normalized.
    A16B16G16R16 = 4,
    /// 16-bit RGBA, float.
    A16B16G16R16F = 5,
    /// 32-bit RGBA, float.
    A32B32G32R32F = 6,
    /// 16-bit RG, unsigned normalized.
    G16R16 = 7,
    /// 16-bit RG, float.
    G16R16F = 8,
    /// 32-bit RG, float.
    G32R32F = 9,
    /// 16-bit R, float.
    R16F = 10,
    /// 32-bit R, float.
    R32F = 11,
    /// BC1.
    Dxt1 = 12,
    /// BC2.
    Dxt3 = 13,
    /// BC3.
    Dxt5 = 14,
    /// 4-bit BGRA.
    A4R4G4B4 = 15,
    /// 4-bit BGR, alpha ignored.
    X4R4G4B4 = 16,
    /// 5-bit BGR with 1-bit alpha.
    A1R5G5B5 = 17,
    /// 5/6/5-bit BGR.
    R5G6B5 = 18,
    /// 16-bit luminance.
    L16 = 19,
    /// 8-bit alpha.
    A8 = 20,
    /// 8-bit red.
    R8 = 21,
    /// 8-bit luminance with alpha.
    A8L8 = 22,
    /// 16-bit RG, signed normalized.
    V16U16 = 23,
    /// BC4.
    Ati1n = 24,
    /// BC5.
    Ati2n = 25,
    /// 8-bit RG.
    R8G8 = 26,
    /// Packed 11/11/10-bit float.
    R11G11B10F = 27,
    /// BC6H.
    Bc6h = 28,
    /// BC7.
    Bc7 = 29,
    /// 8-bit R, unsigned integer. The only shading-rate format.
    R8Ui = 30,
    /// 32-bit R, unsigned integer.
    R32Ui = 31,
    /// 32-bit RG, unsigned integer.
    R32G32Ui = 32,
    /// 8-bit RGBA, unsigned normalized.
    R8G8B8A8 = 33,
    /// 24-bit depth with 8-bit stencil.
    Depth24S8 = 34,
    /// 16-bit depth.
    Depth16 = 35,
    /// 32-bit float depth.
    Depth32 = 36,
    /// 32-bit float depth with 8-bit stencil.
    Depth32S8 = 37,
}

impl TextureFormat {
    /// All formats, in code order.
    pub const ALL: [TextureFormat; 37] = [
        Self::A8R8G8B8,
        Self::A2R10G10B10,
        Self::A2B10G10R10,
        Self::A16B16G16R16,
        Self::A16B16G16R16F,
        Self::A32B32G32R32F,
        Self::G16R16,
        Self::G16R16F,
        Self::G32R32F,
        Self::R16F,
        Self::R32F,
        Self::Dxt1,
        Self::Dxt3,
        Self::Dxt5,
        Self::A4R4G4B4,
        Self::X4R4G4B4,
        Self::A1R5G5B5,
        Self::R5G6B5,
        Self::L16,
        Self::A8,
        Self::R8,
        Self::A8L8,
        Self::V16U16,
        Self::Ati1n,
        Self::Ati2n,
        Self::R8G8,
        Self::R11G11B10F,
        Self::Bc6h,
        Self::Bc7,
        Self::R8Ui,
        Self::R32Ui,
        Self::R32G32Ui,
        Self::R8G8B8A8,
        Self::Depth24S8,
        Self::Depth16,
        Self::Depth32,
        Self::Depth32S8,
    ];

    /// Look up a format by its flag code. Code 0 ("default") returns `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|format| format.code() == code)
    }

    /// The 8-bit code stored in create flags.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn info(self) -> FormatInfo {
        use Class::*;
        match self {
            Self::A8R8G8B8 => srgb(info("A8R8G8B8", 4, 1, Unorm)),
            Self::A2R10G10B10 => info("A2R10G10B10", 4, 1, Unorm),
            Self::A2B10G10R10 => info("A2B10G10R10", 4, 1, Unorm),
            Self::A16B16G16R16 => info("A16B16G16R16", 8, 1, Unorm),
            Self::A16B16G16R16F => info("A16B16G16R16F", 8, 1, Float),
            Self::A32B32G32R32F => info("A32B32G32R32F", 16, 1, Float),
            Self::G16R16 => info("G16R16", 4, 1, Unorm),
            Self::G16R16F => info("G16R16F", 4, 1, Float),
            Self::G32R32F => info("G32R32F", 8, 1, Float),
            Self::R16F => info("R16F", 2, 1, Float),
            Self::R32F => info("R32F", 4, 1, Float),
            Self::Dxt1 => srgb(info("DXT1", 8, 4, Unorm)),
            Self::Dxt3 => srgb(info("DXT3", 16, 4, Unorm)),
            Self::Dxt5 => srgb(info("DXT5", 16, 4, Unorm)),
            Self::A4R4G4B4 => info("A4R4G4B4", 2, 1, Unorm),
            Self::X4R4G4B4 => info("X4R4G4B4", 2, 1, Unorm),
            Self::A1R5G5B5 => info("A1R5G5B5", 2, 1, Unorm),
            Self::R5G6B5 => info("R5G6B5", 2, 1, Unorm),
            Self::L16 => info("L16", 2, 1, Unorm),
            Self::A8 => info("A8", 1, 1, Unorm),
            Self::R8 => info("R8", 1, 1, Unorm),
            Self::A8L8 => info("A8L8", 2, 1, Unorm),
            Self::V16U16 => info("V16U16", 4, 1, Snorm),
            Self::Ati1n => info("ATI1N", 8, 4, Unorm),
            Self::Ati2n => info("ATI2N", 16, 4, Unorm),
            Self::R8G8 => info("R8G8", 2, 1, Unorm),
            Self::R11G11B10F => info("R11G11B10F", 4, 1, Float),
            Self::Bc6h => info("BC6H", 16, 4, Float),
            Self::Bc7 => srgb(info("BC7", 16, 4, Unorm)),
            Self::R8Ui => info("R8UI", 1, 1, Uint),
            Self::R32Ui => info("R32UI", 4, 1, Uint),
            Self::R32G32Ui => info("R32G32UI", 8, 1, Uint),
            Self::R8G8B8A8 => srgb(info("R8G8B8A8", 4, 1, Unorm)),
            Self::Depth24S8 => stencil(info("DEPTH24S8", 4, 1, Depth)),
            Self::Depth16 => info("DEPTH16", 2, 1, Depth),
            Self::Depth32 => info("DEPTH32", 4, 1, Depth),
            Self::Depth32S8 => stencil(info("DEPTH32S8", 8, 1, Depth)),
        }
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Bytes per pixel, or per 4x4 block for block-compressed formats.
    pub fn bytes_per_block(self) -> u32 {
        self.info().bytes_per_block
    }

    /// Width and height of one block in texels (1 for uncompressed formats).
    pub fn block_extent(self) -> (u32, u32) {
        let block = self.info().block;
        (block, block)
    }

    /// Returns true if this is a block-compressed format.
    pub fn is_compressed(self) -> bool {
        self.info().block > 1
    }

    /// Returns true if this format has a depth component.
    pub fn is_depth(self) -> bool {
        self.info().class == Class::Depth
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        self.info().stencil
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(self) -> bool {
        self.is_depth() || self.has_stencil()
    }

    /// Returns true if the color channels are floating point.
    pub fn is_float(self) -> bool {
        self.info().class == Class::Float
    }

    /// Returns true if the channels are unsigned integers.
    pub fn is_integer(self) -> bool {
        self.info().class == Class::Uint
    }

    /// Returns true if the channels are signed normalized.
    pub fn is_signed(self) -> bool {
        self.info().class == Class::Snorm
    }

    /// Returns true if the format has an sRGB view.
    pub fn supports_srgb(self) -> bool {
        self.info().srgb
    }

    /// Number of block columns covering `width` texels.
    pub fn blocks_wide(self, width: u32) -> u32 {
        let (bw, _) = self.block_extent();
        width.max(1).div_ceil(bw)
    }

    /// Number of block rows covering `height` texels.
    pub fn blocks_high(self, height: u32) -> u32 {
        let (_, bh) = self.block_extent();
        height.max(1).div_ceil(bh)
    }

    /// Unpadded bytes of one block row covering `width` texels.
    pub fn row_bytes(self, width: u32) -> u32 {
        self.blocks_wide(width) * self.bytes_per_block()
    }

    /// Returns true if texel data of `self` can be copied into `other` unchanged.
    ///
    /// Depth formats only copy into themselves; everything else needs an equal
    /// block size and block extent.
    pub fn is_copy_convertible(self, other: TextureFormat) -> bool {
        if self == other {
            return true;
        }
        if self.is_depth_stencil() || other.is_depth_stencil() {
            return false;
        }
        self.bytes_per_block() == other.bytes_per_block()
            && self.block_extent() == other.block_extent()
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
