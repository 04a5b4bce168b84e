//! Mip count changes that keep the texture's handle.
//!
//! A replacement with the new geometry is created, the overlapping mips are
//! copied on the device and the backings are swapped under the binding lock. The
//! detached backing is destroyed once the copy completed.

use std::ops::Range;

use crate::error::{TextureError, TextureResult};
use crate::layout::MipRangeTransfer;

use super::{CreateRequest, LockState, TextureContext, TextureKind, TextureRecord};

/// New geometry of a resized texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: u32,
    pub height: u32,
    /// Volume depth, or array size for array kinds; 0 keeps the current one.
    pub depth: u32,
    /// 0 selects an automatic mip count.
    pub mip_levels: u32,
    /// First mip of the old texture worth keeping.
    pub start_src_level: u32,
    /// Mips between the larger and the smaller texture's mip 0.
    pub level_offset: u32,
}

impl ResizeRequest {
    pub fn new(width: u32, height: u32, mip_levels: u32) -> Self {
        Self {
            width,
            height,
            depth: 0,
            mip_levels,
            start_src_level: 0,
            level_offset: 0,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_start_src_level(mut self, level: u32) -> Self {
        self.start_src_level = level;
        self
    }

    pub fn with_level_offset(mut self, offset: u32) -> Self {
        self.level_offset = offset;
        self
    }
}

/// Device transfer and the mips of the new texture it fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePlan {
    pub transfer: MipRangeTransfer,
    /// Visible mip range of the new texture.
    pub visible: Range<u32>,
}

/// Plan a shrink: old mip `l` lands on new mip `l - level_offset`.
pub fn plan_downsize(old_mips: u32, new_mips: u32, start_src_level: u32, level_offset: u32) -> ResizePlan {
    let start = level_offset.max(start_src_level).min(old_mips.max(level_offset));
    let end = old_mips.min(new_mips + level_offset).max(start);
    ResizePlan {
        transfer: MipRangeTransfer {
            levels: start..end,
            src_offset: 0,
            dst_offset: level_offset,
        },
        visible: start - level_offset..end - level_offset,
    }
}

/// Plan a grow: old mip `l` lands on new mip `l + level_offset`.
pub fn plan_upsize(old_mips: u32, new_mips: u32, start_src_level: u32, level_offset: u32) -> ResizePlan {
    let start = (level_offset + start_src_level).min(new_mips);
    let end = (old_mips + level_offset).min(new_mips).max(start);
    ResizePlan {
        transfer: MipRangeTransfer {
            levels: start..end,
            src_offset: level_offset,
            dst_offset: 0,
        },
        visible: start..end,
    }
}

impl TextureRecord {
    /// Replace the backing with one of a different mip count, keeping the
    /// overlapping mips.
    pub(crate) fn resize(&mut self, ctx: &TextureContext<'_>, request: &ResizeRequest, grow: bool) -> TextureResult<()> {
        if self.lock != LockState::Unlocked {
            return Err(ctx.fail(TextureError::Busy(self.name.clone())));
        }
        if self.stub || self.image.is_none() {
            return Err(ctx.precondition(format!("<{}>: resize without a loaded image", self.name)));
        }

        let depth = match (request.depth, self.kind) {
            (0, TextureKind::Volume) => self.extent.depth,
            (0, _) => self.array_size,
            (depth, _) => depth,
        };
        let mut replacement = TextureRecord::create(
            ctx,
            &CreateRequest {
                kind: self.kind,
                width: request.width,
                height: request.height,
                depth,
                mip_levels: request.mip_levels,
                flags: self.flags,
                name: &self.name,
                alias_of: None,
            },
            None,
        )?;

        let plan = if grow {
            plan_upsize(self.mip_levels, replacement.mip_levels, request.start_src_level, request.level_offset)
        } else {
            plan_downsize(self.mip_levels, replacement.mip_levels, request.start_src_level, request.level_offset)
        };
        if let (Some(src), Some(dst)) = (self.image.as_ref(), replacement.image.as_ref()) {
            if !plan.transfer.is_empty() {
                ctx.device.transfer_mips(src, dst, &plan.transfer);
            }
        }
        replacement.mip_range = plan.visible.clone();
        log::debug!(
            "<{}>: {} from {} to {} mips, keeping {:?}",
            self.name,
            if grow { "upsized" } else { "downsized" },
            self.mip_levels,
            replacement.mip_levels,
            plan.visible
        );

        self.swap_backing(ctx, &mut replacement);
        replacement.release(ctx);
        Ok(())
    }

    /// Exchange backing and geometry with `other` under the binding lock.
    pub(crate) fn swap_backing(&mut self, ctx: &TextureContext<'_>, other: &mut TextureRecord) {
        let handle = self.handle;
        ctx.tracker.with_binding_lock(&mut || {
            std::mem::swap(&mut self.image, &mut other.image);
            std::mem::swap(&mut self.staging, &mut other.staging);
            std::mem::swap(&mut self.staging_in_sync, &mut other.staging_in_sync);
            std::mem::swap(&mut self.wait_progress, &mut other.wait_progress);
            std::mem::swap(&mut self.flags, &mut other.flags);
            std::mem::swap(&mut self.format, &mut other.format);
            std::mem::swap(&mut self.extent, &mut other.extent);
            std::mem::swap(&mut self.array_size, &mut other.array_size);
            std::mem::swap(&mut self.mip_levels, &mut other.mip_levels);
            std::mem::swap(&mut self.mip_range, &mut other.mip_range);
            std::mem::swap(&mut self.stub, &mut other.stub);
            TextureRecord::notify_replace_finish(ctx.tracker, handle, &self.bindings);
        });
    }
}
