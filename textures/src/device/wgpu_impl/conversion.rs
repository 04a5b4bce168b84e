//! Type conversions between texture system types and wgpu types.

use crate::descriptor::{ImageDescriptor, ImageDimension, ImageUsage};
use crate::types::{Extent3d, Offset3d, TextureFormat};

/// Convert a texture format to the wgpu format with the same texel layout.
///
/// Returns `None` for formats wgpu has no equivalent for (packed 16 bit
/// colors and BGR-ordered 10 bit).
pub fn convert_texture_format(format: TextureFormat, srgb: bool) -> Option<wgpu::TextureFormat> {
    let (linear, gamma) = match format {
        TextureFormat::A8R8G8B8 => (wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb),
        TextureFormat::R8G8B8A8 => (wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb),
        TextureFormat::Dxt1 => (wgpu::TextureFormat::Bc1RgbaUnorm, wgpu::TextureFormat::Bc1RgbaUnormSrgb),
        TextureFormat::Dxt3 => (wgpu::TextureFormat::Bc2RgbaUnorm, wgpu::TextureFormat::Bc2RgbaUnormSrgb),
        TextureFormat::Dxt5 => (wgpu::TextureFormat::Bc3RgbaUnorm, wgpu::TextureFormat::Bc3RgbaUnormSrgb),
        TextureFormat::Bc7 => (wgpu::TextureFormat::Bc7RgbaUnorm, wgpu::TextureFormat::Bc7RgbaUnormSrgb),
        other => {
            let format = match other {
                TextureFormat::A2B10G10R10 => wgpu::TextureFormat::Rgb10a2Unorm,
                TextureFormat::A16B16G16R16 => wgpu::TextureFormat::Rgba16Unorm,
                TextureFormat::A16B16G16R16F => wgpu::TextureFormat::Rgba16Float,
                TextureFormat::A32B32G32R32F => wgpu::TextureFormat::Rgba32Float,
                TextureFormat::G16R16 => wgpu::TextureFormat::Rg16Unorm,
                TextureFormat::G16R16F => wgpu::TextureFormat::Rg16Float,
                TextureFormat::G32R32F => wgpu::TextureFormat::Rg32Float,
                TextureFormat::V16U16 => wgpu::TextureFormat::Rg16Snorm,
                TextureFormat::R16F => wgpu::TextureFormat::R16Float,
                TextureFormat::R32F => wgpu::TextureFormat::R32Float,
                TextureFormat::L16 => wgpu::TextureFormat::R16Unorm,
                TextureFormat::A8 | TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
                TextureFormat::A8L8 | TextureFormat::R8G8 => wgpu::TextureFormat::Rg8Unorm,
                TextureFormat::Ati1n => wgpu::TextureFormat::Bc4RUnorm,
                TextureFormat::Ati2n => wgpu::TextureFormat::Bc5RgUnorm,
                TextureFormat::Bc6h => wgpu::TextureFormat::Bc6hRgbUfloat,
                TextureFormat::R11G11B10F => wgpu::TextureFormat::Rg11b10Ufloat,
                TextureFormat::R8Ui => wgpu::TextureFormat::R8Uint,
                TextureFormat::R32Ui => wgpu::TextureFormat::R32Uint,
                TextureFormat::R32G32Ui => wgpu::TextureFormat::Rg32Uint,
                TextureFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
                TextureFormat::Depth24S8 => wgpu::TextureFormat::Depth24PlusStencil8,
                TextureFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
                TextureFormat::Depth32S8 => wgpu::TextureFormat::Depth32FloatStencil8,
                _ => return None,
            };
            (format, format)
        }
    };
    Some(if srgb { gamma } else { linear })
}

/// Convert image usage flags to wgpu texture usages.
pub fn convert_image_usage(usage: ImageUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(ImageUsage::SAMPLED) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(ImageUsage::TRANSFER_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(ImageUsage::TRANSFER_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.intersects(ImageUsage::RENDER_TARGET | ImageUsage::DEPTH_STENCIL) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(ImageUsage::STORAGE) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }

    result
}

pub fn convert_dimension(dimension: ImageDimension) -> wgpu::TextureDimension {
    match dimension {
        ImageDimension::D2 => wgpu::TextureDimension::D2,
        ImageDimension::D3 => wgpu::TextureDimension::D3,
    }
}

/// Size of the whole image: array layers for 2D, depth for volumes.
pub fn image_size(desc: &ImageDescriptor) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: desc.extent.width,
        height: desc.extent.height,
        depth_or_array_layers: match desc.dimension {
            ImageDimension::D2 => desc.array_layers,
            ImageDimension::D3 => desc.extent.depth,
        },
    }
}

/// Copy extent rounded up to whole blocks of `format`.
pub fn physical_extent(format: TextureFormat, extent: Extent3d, layers: u32) -> wgpu::Extent3d {
    let (bw, bh) = format.block_extent();
    wgpu::Extent3d {
        width: extent.width.div_ceil(bw) * bw,
        height: extent.height.div_ceil(bh) * bh,
        depth_or_array_layers: extent.depth.max(1) * layers.max(1),
    }
}

/// Origin of a copy into `layer`; 2D layers are addressed through z.
pub fn copy_origin(dimension: ImageDimension, offset: Offset3d, layer: u32) -> wgpu::Origin3d {
    wgpu::Origin3d {
        x: offset.x,
        y: offset.y,
        z: match dimension {
            ImageDimension::D2 => layer,
            ImageDimension::D3 => offset.z,
        },
    }
}
