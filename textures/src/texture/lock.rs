//! CPU access to texture content through staging memory.
//!
//! ```text
//!            begin_readback            lock(READ/WRITE)
//! Unlocked ---------------> Prefetched ---------------> Locked
//!    |  ^                       |                         |
//!    |  +------- unlock --------+                         |
//!    |  +------------------------ unlock -----------------+
//!    |  |
//!    |  +-- unlock (uploads everything) --+
//!    +---- lock(COPY_TO_STAGING) ---> CopiedToStaging
//! ```
//!
//! Read locks reuse persistent staging while it is known to match the image and
//! read back otherwise. Render targets and UAVs are written by the GPU behind the
//! record's back, so they always read back.

use crate::descriptor::ImageDescriptor;
use crate::device::{DeviceQueue, FenceValue, StagingKind, StagingRegion};
use crate::error::{TextureError, TextureResult};
use crate::layout::{BufferImageCopy, StagingLayout, SubresourceRange};
use crate::types::{CreateFlags, LockFlags};

use super::{TextureContext, TextureKind, TextureRecord};

/// The lock currently held on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLock {
    pub flags: LockFlags,
    pub mip: u32,
    pub layer: u32,
    /// Placement of the locked subresource in the staging region.
    pub copy: BufferImageCopy,
    /// The staging region was allocated for this lock only.
    pub temporary: bool,
}

/// CPU access state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    /// A read back was issued ahead of a lock.
    Prefetched,
    /// The whole texture was copied into staging.
    CopiedToStaging,
    Locked(ActiveLock),
}

impl LockState {
    /// Returns true if a lock has to be released before the next one.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_) | Self::CopiedToStaging)
    }
}

/// Mapped bytes of a locked subresource.
#[derive(Debug)]
pub struct LockedRegion<'a> {
    pub data: &'a mut [u8],
    pub row_pitch: u32,
    /// Bytes between depth slices of a volume mip.
    pub slice_pitch: u32,
}

fn region<'a>(staging: &'a mut StagingRegion, copy: &BufferImageCopy) -> LockedRegion<'a> {
    let range = copy.footprint.byte_range();
    LockedRegion {
        data: &mut staging.as_mut_slice()[range.start as usize..range.end as usize],
        row_pitch: copy.footprint.row_pitch,
        slice_pitch: copy.footprint.slice_pitch() as u32,
    }
}

impl TextureRecord {
    fn lockable_descriptor(&self, ctx: &TextureContext<'_>) -> TextureResult<(ImageDescriptor, DeviceQueue)> {
        if self.stub {
            return Err(ctx.precondition(format!("<{}>: can not lock a stub texture", self.name)));
        }
        let Some(image) = self.image.as_ref() else {
            return Err(ctx.precondition(format!("<{}>: can not lock a texture without image", self.name)));
        };
        let queue = if ctx.device.is_swapchain_image(image) {
            DeviceQueue::Graphics
        } else {
            DeviceQueue::ReadBack
        };
        Ok((image.descriptor().clone(), queue))
    }

    fn read_back(
        &self,
        ctx: &TextureContext<'_>,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
    ) -> TextureResult<FenceValue> {
        match (self.image.as_ref(), self.staging.as_ref()) {
            (Some(image), Some(staging)) => Ok(ctx.device.read_back_from_image(image, staging, copies, queue)),
            _ => Err(ctx.precondition(format!("<{}>: read back without staging", self.name))),
        }
    }

    fn invalidate_staging(&mut self, ctx: &TextureContext<'_>) {
        if let Some(staging) = self.staging.as_mut() {
            ctx.device.invalidate_staging(staging);
        }
        self.staging_in_sync = !self
            .flags
            .intersects(CreateFlags::RENDER_TARGET | CreateFlags::UNORDERED_ACCESS);
    }

    /// Lock one subresource for CPU access.
    pub(crate) fn lock_subresource(
        &mut self,
        ctx: &TextureContext<'_>,
        mip: u32,
        layer: u32,
        flags: LockFlags,
    ) -> TextureResult<LockedRegion<'_>> {
        if self.lock.is_locked() {
            return Err(ctx.fail(TextureError::AlreadyLocked(self.name.clone())));
        }
        let (descriptor, queue) = self.lockable_descriptor(ctx)?;
        if !flags.intersects(LockFlags::READ | LockFlags::WRITE | LockFlags::DISCARD | LockFlags::COPY_TO_STAGING) {
            return Err(ctx.precondition(format!("<{}>: lock without read or write intent", self.name)));
        }
        if mip >= descriptor.mip_levels || layer >= descriptor.array_layers {
            return Err(ctx.fail(TextureError::InvalidParameter(format!(
                "<{}>: mip {} layer {} out of {} mips and {} layers",
                self.name, mip, layer, descriptor.mip_levels, descriptor.array_layers
            ))));
        }
        if flags.contains(LockFlags::DISCARD) && flags.reads() {
            return Err(ctx.precondition(format!("<{}>: discard lock can not read", self.name)));
        }
        if flags.reads() && descriptor.format.is_depth_stencil() && !flags.contains(LockFlags::COPY_TO_STAGING) {
            return Err(ctx.fail(TextureError::Unsupported(format!(
                "<{}>: reading {} back requires a copy to staging",
                self.name, descriptor.format
            ))));
        }

        if flags.contains(LockFlags::DISCARD) {
            let layout = StagingLayout::plan(&descriptor, SubresourceRange::single(mip, layer));
            let fresh = ctx
                .device
                .allocate_staging(layout.size, StagingKind::TemporaryUpload)
                .ok_or_else(|| ctx.fail(TextureError::StagingAllocationFailed { size: layout.size }))?;
            if let Some(old) = self.staging.take() {
                ctx.device.free_staging(old, ctx.device.current_progress());
            }
            let copy = layout.copies[0];
            self.wait_progress = None;
            self.staging_in_sync = false;
            self.lock = LockState::Locked(ActiveLock {
                flags,
                mip,
                layer,
                copy,
                temporary: true,
            });
            return Ok(region(self.staging.insert(fresh), &copy));
        }

        self.allocate_persistent_staging(ctx, &descriptor)?;
        let layout = StagingLayout::plan(&descriptor, SubresourceRange::whole(&descriptor));
        let Some(copy) = layout.find(mip, layer).copied() else {
            return Err(ctx.precondition(format!("<{}>: mip {} layer {} not planned", self.name, mip, layer)));
        };
        let always_read_back = self
            .flags
            .intersects(CreateFlags::RENDER_TARGET | CreateFlags::UNORDERED_ACCESS);

        if flags.contains(LockFlags::COPY_TO_STAGING) {
            if let Some(pending) = self.wait_progress.take() {
                ctx.device.wait_for_progress(pending);
            }
            let fence = self.read_back(ctx, &layout.copies, queue)?;
            log::debug!("<{}>: blocking copy of all subresources to staging", self.name);
            ctx.device.wait_for_progress(fence);
            self.invalidate_staging(ctx);
            self.lock = LockState::CopiedToStaging;
        } else {
            if flags.reads() && self.wait_progress.is_none() && (!self.staging_in_sync || always_read_back) {
                let fence = self.read_back(ctx, &layout.copies, queue)?;
                log::debug!(
                    "<{}>: lock of mip {} layer {} reads back without prefetch",
                    self.name,
                    mip,
                    layer
                );
                self.wait_progress = Some(fence);
            }
            if let Some(pending) = self.wait_progress {
                if ctx.device.completed_progress() < pending {
                    if flags.contains(LockFlags::NO_BLOCK) {
                        return Err(TextureError::NotReady);
                    }
                    log::debug!("<{}>: blocking until read back {} completes", self.name, pending);
                    ctx.device.wait_for_progress(pending);
                }
                self.invalidate_staging(ctx);
                self.wait_progress = None;
            }
            self.lock = LockState::Locked(ActiveLock {
                flags,
                mip,
                layer,
                copy,
                temporary: false,
            });
        }

        match self.staging.as_mut() {
            Some(staging) => Ok(region(staging, &copy)),
            None => Err(ctx.precondition(format!("<{}>: locked without staging", self.name))),
        }
    }

    /// Lock mip `level` of a plain 2D texture, or layer 0 of an array.
    pub(crate) fn lock_level(
        &mut self,
        ctx: &TextureContext<'_>,
        level: u32,
        flags: LockFlags,
    ) -> TextureResult<LockedRegion<'_>> {
        match self.kind {
            TextureKind::Plain2D | TextureKind::Array => self.lock_subresource(ctx, level, 0, flags),
            kind => Err(ctx.fail(TextureError::Unsupported(format!(
                "<{}>: lock of a {:?} texture needs a face or a box",
                self.name, kind
            )))),
        }
    }

    /// Lock mip `level` of one cube face or array layer.
    pub(crate) fn lock_face(
        &mut self,
        ctx: &TextureContext<'_>,
        layer: u32,
        level: u32,
        flags: LockFlags,
    ) -> TextureResult<LockedRegion<'_>> {
        match self.kind {
            TextureKind::Cube | TextureKind::CubeArray | TextureKind::Array => {
                self.lock_subresource(ctx, level, layer, flags)
            }
            kind => Err(ctx.fail(TextureError::Unsupported(format!(
                "<{}>: face lock of a {:?} texture",
                self.name, kind
            )))),
        }
    }

    /// Lock all depth slices of mip `level` of a volume.
    pub(crate) fn lock_box(
        &mut self,
        ctx: &TextureContext<'_>,
        level: u32,
        flags: LockFlags,
    ) -> TextureResult<LockedRegion<'_>> {
        match self.kind {
            TextureKind::Volume => self.lock_subresource(ctx, level, 0, flags),
            kind => Err(ctx.fail(TextureError::Unsupported(format!(
                "<{}>: box lock of a {:?} texture",
                self.name, kind
            )))),
        }
    }

    /// Start reading the whole texture back so a later read lock does not stall.
    pub(crate) fn begin_readback(&mut self, ctx: &TextureContext<'_>) -> TextureResult<()> {
        if self.lock.is_locked() {
            return Err(ctx.fail(TextureError::AlreadyLocked(self.name.clone())));
        }
        let (descriptor, queue) = self.lockable_descriptor(ctx)?;
        if descriptor.format.is_depth_stencil() {
            return Err(ctx.fail(TextureError::Unsupported(format!(
                "<{}>: reading {} back requires a copy to staging",
                self.name, descriptor.format
            ))));
        }
        self.allocate_persistent_staging(ctx, &descriptor)?;
        if let Some(pending) = self.wait_progress.take() {
            ctx.device.wait_for_progress(pending);
        }
        let layout = StagingLayout::plan(&descriptor, SubresourceRange::whole(&descriptor));
        let fence = self.read_back(ctx, &layout.copies, queue)?;
        log::trace!("<{}>: prefetching {} subresources until {}", self.name, layout.copies.len(), fence);
        self.wait_progress = Some(fence);
        self.lock = LockState::Prefetched;
        Ok(())
    }

    /// Release the current lock, uploading written content.
    pub(crate) fn unlock(&mut self, ctx: &TextureContext<'_>) -> TextureResult<()> {
        match std::mem::take(&mut self.lock) {
            LockState::Unlocked => Err(ctx.fail(TextureError::NotLocked(self.name.clone()))),
            LockState::Prefetched => Ok(()),
            LockState::CopiedToStaging => {
                let (Some(image), Some(staging)) = (self.image.as_ref(), self.staging.as_ref()) else {
                    return Err(ctx.precondition(format!("<{}>: staging lost while locked", self.name)));
                };
                let descriptor = image.descriptor();
                let layout = StagingLayout::plan(descriptor, SubresourceRange::whole(descriptor));
                ctx.device.flush_staging(staging, 0..layout.size);
                ctx.device
                    .upload_to_image(staging, image, &layout.copies, DeviceQueue::Upload, false);
                Ok(())
            }
            LockState::Locked(active) => self.finish_lock(ctx, &active),
        }
    }

    fn finish_lock(&mut self, ctx: &TextureContext<'_>, active: &ActiveLock) -> TextureResult<()> {
        let writes = active.flags.writes();
        let upload = writes && !active.flags.contains(LockFlags::DONT_UPDATE);
        let footprint = active.copy.footprint;

        if writes && !self.format.is_compressed() {
            if let (Some(mirror), Some(staging)) = (self.mirror.as_mut(), self.staging.as_ref()) {
                let range = footprint.byte_range();
                mirror.update_subresource(
                    active.mip,
                    active.layer,
                    &staging.as_slice()[range.start as usize..range.end as usize],
                    footprint.row_pitch,
                );
            }
        }

        let Some(image) = self.image.as_ref() else {
            return Err(ctx.precondition(format!("<{}>: image lost while locked", self.name)));
        };

        if active.temporary {
            let Some(staging) = self.staging.take() else {
                return Err(ctx.precondition(format!("<{}>: staging lost while locked", self.name)));
            };
            let fence = if upload {
                ctx.device.flush_staging(&staging, footprint.byte_range());
                ctx.device
                    .upload_to_image(&staging, image, &[active.copy], DeviceQueue::Upload, true)
            } else {
                ctx.device.current_progress()
            };
            ctx.device.free_staging(staging, fence);
            self.staging_in_sync = false;
            return Ok(());
        }

        if upload {
            if let Some(staging) = self.staging.as_ref() {
                ctx.device.flush_staging(staging, footprint.byte_range());
                ctx.device
                    .upload_to_image(staging, image, &[active.copy], DeviceQueue::Upload, false);
            }
        } else if writes {
            self.staging_in_sync = false;
        }

        if active.flags.contains(LockFlags::DELETE_SYSTEM_COPY_AFTER) && !self.flags.contains(CreateFlags::DYNAMIC) {
            if let Some(staging) = self.staging.take() {
                ctx.device.free_staging(staging, ctx.device.current_progress());
            }
            self.staging_in_sync = false;
        }
        Ok(())
    }
}
