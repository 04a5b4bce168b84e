//! Device-side copies between textures.

use crate::device::ImageCopyRegion;
use crate::error::{TextureError, TextureResult};
use crate::types::{CreateFlags, Extent3d, Offset3d, TextureFormat};

use super::{TextureContext, TextureKind, TextureRecord};

/// A region of one source subresource copied into one destination subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRegionCopy {
    pub src_mip: u32,
    pub src_layer: u32,
    pub src_offset: Offset3d,
    pub extent: Extent3d,
    pub dst_mip: u32,
    pub dst_layer: u32,
    pub dst_offset: Offset3d,
}

impl SubRegionCopy {
    /// Copy `extent` texels between the origins of mip 0, layer 0.
    pub fn new(extent: Extent3d) -> Self {
        Self {
            src_mip: 0,
            src_layer: 0,
            src_offset: Offset3d::ZERO,
            extent,
            dst_mip: 0,
            dst_layer: 0,
            dst_offset: Offset3d::ZERO,
        }
    }

    pub fn with_source(mut self, mip: u32, layer: u32, offset: Offset3d) -> Self {
        self.src_mip = mip;
        self.src_layer = layer;
        self.src_offset = offset;
        self
    }

    pub fn with_destination(mut self, mip: u32, layer: u32, offset: Offset3d) -> Self {
        self.dst_mip = mip;
        self.dst_layer = layer;
        self.dst_offset = offset;
        self
    }
}

fn round_up(value: u32, block: u32) -> u32 {
    value.div_ceil(block) * block
}

/// Round x/y offsets and width/height up to whole blocks of `format`.
///
/// Returns the rounded copy and whether anything changed.
pub fn round_to_blocks(copy: &SubRegionCopy, format: TextureFormat) -> (SubRegionCopy, bool) {
    let (bw, bh) = format.block_extent();
    let mut rounded = *copy;
    rounded.src_offset.x = round_up(copy.src_offset.x, bw);
    rounded.src_offset.y = round_up(copy.src_offset.y, bh);
    rounded.extent.width = round_up(copy.extent.width, bw);
    rounded.extent.height = round_up(copy.extent.height, bh);
    rounded.dst_offset.x = round_up(copy.dst_offset.x, bw);
    rounded.dst_offset.y = round_up(copy.dst_offset.y, bh);
    let changed = rounded != *copy;
    (rounded, changed)
}

impl TextureRecord {
    fn check_copy_pair(&self, ctx: &TextureContext<'_>, src: &TextureRecord) -> TextureResult<()> {
        if self.stub || src.stub {
            return Err(ctx.precondition(format!(
                "copy between <{}> and <{}> while one is a stub",
                src.name, self.name
            )));
        }
        if self.image.is_none() || src.image.is_none() {
            return Err(ctx.precondition(format!(
                "copy between <{}> and <{}> without images",
                src.name, self.name
            )));
        }
        if !src.format.is_copy_convertible(self.format) {
            return Err(ctx.fail(TextureError::FormatMismatch {
                src: src.format,
                dst: self.format,
            }));
        }
        Ok(())
    }

    /// Overwrite every subresource with the content of `src`.
    pub(crate) fn update_from(&mut self, ctx: &TextureContext<'_>, src: &TextureRecord) -> TextureResult<()> {
        if !self.flags.intersects(
            CreateFlags::UPDATE_DESTINATION | CreateFlags::RENDER_TARGET | CreateFlags::UNORDERED_ACCESS,
        ) {
            return Err(ctx.precondition(format!(
                "<{}> is not an update destination, render target or UAV",
                self.name
            )));
        }
        for record in [&*self, src] {
            if !matches!(record.kind, TextureKind::Plain2D | TextureKind::Cube | TextureKind::Volume) {
                return Err(ctx.fail(TextureError::Unsupported(format!(
                    "<{}>: update of {:?} textures",
                    record.name, record.kind
                ))));
            }
        }
        self.check_copy_pair(ctx, src)?;
        if self.mip_levels != src.mip_levels || self.array_layers() != src.array_layers() {
            return Err(ctx.fail(TextureError::GeometryMismatch(format!(
                "<{}> has {} mips and {} layers, <{}> has {} and {}",
                src.name,
                src.mip_levels,
                src.array_layers(),
                self.name,
                self.mip_levels,
                self.array_layers()
            ))));
        }
        let blocks = |record: &TextureRecord| {
            (
                record.format.blocks_wide(record.extent.width),
                record.format.blocks_high(record.extent.height),
                record.extent.depth,
            )
        };
        if blocks(src) != blocks(self) {
            return Err(ctx.fail(TextureError::GeometryMismatch(format!(
                "<{}> is {}x{}x{}, <{}> is {}x{}x{}",
                src.name,
                src.extent.width,
                src.extent.height,
                src.extent.depth,
                self.name,
                self.extent.width,
                self.extent.height,
                self.extent.depth
            ))));
        }

        let (Some(src_image), Some(dst_image)) = (src.image.as_ref(), self.image.as_ref()) else {
            return Ok(());
        };
        if src_image.descriptor().sample_count > 1 {
            ctx.device.resolve_image(src_image, dst_image);
        } else {
            ctx.device.copy_image(src_image, dst_image, None);
        }
        self.staging_in_sync = false;
        Ok(())
    }

    /// Copy one region of `src` into this texture.
    pub(crate) fn update_sub_region_from(
        &mut self,
        ctx: &TextureContext<'_>,
        src: &TextureRecord,
        copy: &SubRegionCopy,
    ) -> TextureResult<()> {
        self.check_copy_pair(ctx, src)?;
        if copy.src_mip >= src.mip_levels
            || copy.src_layer >= src.array_layers()
            || copy.dst_mip >= self.mip_levels
            || copy.dst_layer >= self.array_layers()
        {
            return Err(ctx.fail(TextureError::InvalidParameter(format!(
                "sub region copy {:?} outside <{}> or <{}>",
                copy, src.name, self.name
            ))));
        }

        let (copy, changed) = round_to_blocks(copy, src.format);
        if changed {
            log::debug!("<{}>: sub region copy rounded to blocks: {:?}", self.name, copy);
        }

        let fits = |record: &TextureRecord, mip: u32, offset: Offset3d| {
            let extent = record.info(mip);
            let format = record.format;
            let (bw, bh) = format.block_extent();
            offset.x / bw + format.blocks_wide(copy.extent.width) <= format.blocks_wide(extent.width)
                && offset.y / bh + format.blocks_high(copy.extent.height) <= format.blocks_high(extent.height)
                && offset.z + copy.extent.depth.max(1) <= extent.depth
        };
        if !fits(src, copy.src_mip, copy.src_offset) || !fits(self, copy.dst_mip, copy.dst_offset) {
            return Err(ctx.fail(TextureError::InvalidParameter(format!(
                "sub region copy {:?} exceeds <{}> or <{}>",
                copy, src.name, self.name
            ))));
        }

        let (Some(src_image), Some(dst_image)) = (src.image.as_ref(), self.image.as_ref()) else {
            return Ok(());
        };
        let region = ImageCopyRegion {
            src_mip: copy.src_mip,
            src_layer: copy.src_layer,
            src_offset: copy.src_offset,
            dst_mip: copy.dst_mip,
            dst_layer: copy.dst_layer,
            dst_offset: copy.dst_offset,
            extent: Extent3d::new(copy.extent.width, copy.extent.height, copy.extent.depth.max(1)),
        };
        ctx.device.copy_image(src_image, dst_image, Some(&region));
        self.staging_in_sync = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_blocks_compressed() {
        let copy = SubRegionCopy::new(Extent3d::new_2d(6, 3))
            .with_source(0, 0, Offset3d::new(1, 2, 0))
            .with_destination(0, 0, Offset3d::new(5, 0, 0));
        let (rounded, changed) = round_to_blocks(&copy, TextureFormat::Dxt1);
        assert!(changed);
        assert_eq!(rounded.src_offset, Offset3d::new(4, 4, 0));
        assert_eq!(rounded.extent, Extent3d::new_2d(8, 4));
        assert_eq!(rounded.dst_offset, Offset3d::new(8, 0, 0));
    }

    #[test]
    fn test_round_to_blocks_uncompressed_is_noop() {
        let copy = SubRegionCopy::new(Extent3d::new_2d(7, 5)).with_source(0, 0, Offset3d::new(3, 1, 0));
        let (rounded, changed) = round_to_blocks(&copy, TextureFormat::A8R8G8B8);
        assert!(!changed);
        assert_eq!(rounded, copy);
    }
}
