//! Subresource footprints and staging buffer placement.
//!
//! A staging buffer holds subresources back to back. Every subresource starts at
//! a multiple of [`DATA_PLACEMENT_ALIGNMENT`] and every row at a multiple of
//! [`ROW_PITCH_ALIGNMENT`]; copies that break either rule are rejected by the
//! device.
//!
//! Subresources are addressed linearly as `mip + layer * mip_count`.

use std::ops::Range;

use crate::descriptor::ImageDescriptor;
use crate::types::{Extent3d, Offset3d, TextureFormat};

/// Alignment of a subresource's first byte inside a staging buffer.
pub const DATA_PLACEMENT_ALIGNMENT: u64 = 512;
/// Alignment of a row pitch inside a staging buffer.
pub const ROW_PITCH_ALIGNMENT: u32 = 256;

/// Align `value` up to the given power-of-two alignment.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Linear index of (mip, layer).
#[inline]
pub const fn subresource_index(mip: u32, layer: u32, mip_count: u32) -> u32 {
    mip + layer * mip_count
}

/// How one subresource's bytes are laid out in a linear buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceFootprint {
    /// Byte offset inside the staging buffer.
    pub offset: u64,
    pub format: TextureFormat,
    /// Extent in texels.
    pub extent: Extent3d,
    /// Padded bytes between rows.
    pub row_pitch: u32,
    /// Block rows per depth slice.
    pub rows: u32,
    /// Unpadded bytes of one block row.
    pub row_bytes: u32,
}

impl SubresourceFootprint {
    /// Footprint for `extent` placed at `offset`.
    pub fn new(format: TextureFormat, extent: Extent3d, offset: u64) -> Self {
        let row_bytes = format.row_bytes(extent.width);
        Self {
            offset,
            format,
            extent,
            row_pitch: align_up(u64::from(row_bytes), u64::from(ROW_PITCH_ALIGNMENT)) as u32,
            rows: format.blocks_high(extent.height),
            row_bytes,
        }
    }

    /// Bytes of one depth slice.
    pub fn slice_pitch(&self) -> u64 {
        u64::from(self.row_pitch) * u64::from(self.rows)
    }

    /// Bytes of the whole subresource.
    pub fn size(&self) -> u64 {
        self.slice_pitch() * u64::from(self.extent.depth)
    }

    /// Byte range inside the staging buffer.
    pub fn byte_range(&self) -> Range<u64> {
        self.offset..self.offset + self.size()
    }

    /// Returns true if offset and row pitch honor the placement rules.
    pub fn is_aligned(&self) -> bool {
        self.offset % DATA_PLACEMENT_ALIGNMENT == 0 && self.row_pitch % ROW_PITCH_ALIGNMENT == 0
    }
}

/// A contiguous range of mips and array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    /// Every subresource of the image.
    pub fn whole(desc: &ImageDescriptor) -> Self {
        Self {
            base_mip: 0,
            mip_count: desc.mip_levels,
            base_layer: 0,
            layer_count: desc.array_layers,
        }
    }

    /// A single subresource.
    pub fn single(mip: u32, layer: u32) -> Self {
        Self {
            base_mip: mip,
            mip_count: 1,
            base_layer: layer,
            layer_count: 1,
        }
    }

    pub fn mips(&self) -> Range<u32> {
        self.base_mip..self.base_mip + self.mip_count
    }

    pub fn layers(&self) -> Range<u32> {
        self.base_layer..self.base_layer + self.layer_count
    }
}

/// One buffer to image (or image to buffer) copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub subresource: u32,
    pub mip: u32,
    pub layer: u32,
    pub footprint: SubresourceFootprint,
    pub image_offset: Offset3d,
}

/// Placement of a set of subresources inside one staging buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagingLayout {
    /// Copies ordered layer-major, mip-minor.
    pub copies: Vec<BufferImageCopy>,
    /// Bytes needed for all copies.
    pub size: u64,
}

impl StagingLayout {
    /// Plan the placement of `range` of an image described by `desc`.
    pub fn plan(desc: &ImageDescriptor, range: SubresourceRange) -> Self {
        let mut copies = Vec::with_capacity((range.mip_count * range.layer_count) as usize);
        let mut offset = 0;
        for layer in range.layers() {
            for mip in range.mips() {
                let footprint = SubresourceFootprint::new(desc.format, desc.mip_extent(mip), offset);
                offset = align_up(offset + footprint.size(), DATA_PLACEMENT_ALIGNMENT);
                copies.push(BufferImageCopy {
                    subresource: subresource_index(mip, layer, desc.mip_levels),
                    mip,
                    layer,
                    footprint,
                    image_offset: Offset3d::ZERO,
                });
            }
        }
        Self {
            copies,
            size: offset,
        }
    }

    /// Copies targeting `layer`.
    pub fn layer_copies(&self, layer: u32) -> impl Iterator<Item = &BufferImageCopy> {
        self.copies.iter().filter(move |copy| copy.layer == layer)
    }

    /// The copy of one subresource, if planned.
    pub fn find(&self, mip: u32, layer: u32) -> Option<&BufferImageCopy> {
        self.copies
            .iter()
            .find(|copy| copy.mip == mip && copy.layer == layer)
    }

    /// Byte range covered by `copies`.
    pub fn span<'a>(copies: impl IntoIterator<Item = &'a BufferImageCopy>) -> Range<u64> {
        copies.into_iter().fold(u64::MAX..0, |acc, copy| {
            let range = copy.footprint.byte_range();
            acc.start.min(range.start)..acc.end.max(range.end)
        })
    }
}

/// Staging bytes needed for `range` of an image.
pub fn staging_buffer_size(desc: &ImageDescriptor, range: SubresourceRange) -> u64 {
    StagingLayout::plan(desc, range).size
}

/// Copy of a mip range between two images with independent level offsets.
///
/// For every `level` in `levels`, source mip `level - src_offset` is copied
/// into destination mip `level - dst_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipRangeTransfer {
    pub levels: Range<u32>,
    pub src_offset: u32,
    pub dst_offset: u32,
}

impl MipRangeTransfer {
    /// Source mips read by the transfer.
    pub fn src_levels(&self) -> Range<u32> {
        self.levels.start - self.src_offset..self.levels.end - self.src_offset
    }

    /// Destination mips written by the transfer.
    pub fn dst_levels(&self) -> Range<u32> {
        self.levels.start - self.dst_offset..self.levels.end - self.dst_offset
    }

    /// (source mip, destination mip) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.levels
            .clone()
            .map(move |level| (level - self.src_offset, level - self.dst_offset))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
