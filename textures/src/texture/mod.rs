//! Texture records.
//!
//! A [`TextureRecord`] is the logical texture the engine references. It owns at
//! most one device image and at most one staging region, and carries the sampler,
//! binding and lock state that belong to the texture rather than to its backing
//! image. Resizing replaces the backing in place; the record itself never moves
//! between handles.

mod clear;
mod create;
mod lock;
mod resize;
mod sampler;
mod update;
mod upload;

use std::ops::Range;

use crate::binding::{BindingState, DirtyTracker};
use crate::config::TextureSystemConfig;
use crate::ddsx::SystemCopy;
use crate::device::{DeviceContext, DeviceImage, FenceValue, StagingRegion};
use crate::error::TextureError;
use crate::layout::{staging_buffer_size, SubresourceRange};
use crate::manager::TextureHandle;
use crate::types::{CreateFlags, Extent3d, SamplerState, TextureFormat};

pub(crate) use create::CreateRequest;
pub use lock::{LockState, LockedRegion};
pub use resize::{plan_downsize, plan_upsize, ResizePlan, ResizeRequest};
pub use update::{round_to_blocks, SubRegionCopy};
pub use upload::SubresourceData;

/// Resource kind of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Plain2D,
    Cube,
    Volume,
    Array,
    CubeArray,
}

impl TextureKind {
    /// Returns true for cube and cube array textures.
    pub fn is_cube(self) -> bool {
        matches!(self, Self::Cube | Self::CubeArray)
    }

    /// Array layers for `array_size` elements.
    pub fn array_layers(self, array_size: u32) -> u32 {
        match self {
            Self::Plain2D | Self::Volume => 1,
            Self::Cube => 6,
            Self::Array => array_size.max(1),
            Self::CubeArray => 6 * array_size.max(1),
        }
    }
}

/// Collaborators shared by all record operations.
#[derive(Clone, Copy)]
pub(crate) struct TextureContext<'a> {
    pub device: &'a dyn DeviceContext,
    pub tracker: &'a dyn DirtyTracker,
    pub config: &'a TextureSystemConfig,
}

impl TextureContext<'_> {
    /// Report a precondition violation.
    ///
    /// Panics in debug builds when `fatal_preconditions` is set, otherwise logs
    /// and returns the error for the caller to propagate.
    pub fn precondition(&self, message: String) -> TextureError {
        if self.config.fatal_preconditions && cfg!(debug_assertions) {
            panic!("{message}");
        }
        log::error!("{}", message);
        TextureError::Precondition(message)
    }

    /// Log a non-precondition failure and pass it through.
    pub fn fail(&self, err: TextureError) -> TextureError {
        log::error!("{}", err);
        err
    }
}

/// Snapshot of a texture's geometry at one mip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub flags: CreateFlags,
    pub width: u32,
    pub height: u32,
    /// Volume depth at the mip; 1 for other kinds.
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
}

/// The logical texture.
#[derive(Debug)]
pub struct TextureRecord {
    pub(crate) handle: TextureHandle,
    pub(crate) name: String,
    pub(crate) kind: TextureKind,
    pub(crate) flags: CreateFlags,
    pub(crate) format: TextureFormat,
    pub(crate) extent: Extent3d,
    pub(crate) array_size: u32,
    pub(crate) mip_levels: u32,
    pub(crate) mip_range: Range<u32>,
    pub(crate) sampler: SamplerState,
    pub(crate) bindings: BindingState,
    pub(crate) image: Option<DeviceImage>,
    pub(crate) staging: Option<StagingRegion>,
    /// Persistent staging bytes equal the image content.
    pub(crate) staging_in_sync: bool,
    pub(crate) lock: LockState,
    /// Read back still in flight into the staging region.
    pub(crate) wait_progress: Option<FenceValue>,
    pub(crate) mirror: Option<SystemCopy>,
    pub(crate) stub: bool,
}

impl TextureRecord {
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn flags(&self) -> CreateFlags {
        self.flags
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Mip 0 extent; depth is the volume depth.
    pub fn extent(&self) -> Extent3d {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.kind.array_layers(self.array_size)
    }

    /// Mips visible to samplers.
    pub fn mip_range(&self) -> Range<u32> {
        self.mip_range.clone()
    }

    pub fn sampler(&self) -> &SamplerState {
        &self.sampler
    }

    pub fn bindings(&self) -> &BindingState {
        &self.bindings
    }

    pub fn image(&self) -> Option<&DeviceImage> {
        self.image.as_ref()
    }

    pub fn staging(&self) -> Option<&StagingRegion> {
        self.staging.as_ref()
    }

    pub fn lock_state(&self) -> &LockState {
        &self.lock
    }

    /// CPU-side mirror of the loaded container, if kept.
    pub fn mirror(&self) -> Option<&SystemCopy> {
        self.mirror.as_ref()
    }

    /// Returns true while a placeholder image stands in for streamed content.
    pub fn is_stub(&self) -> bool {
        self.stub
    }

    /// Returns true if the image shares memory with another texture.
    pub fn is_aliased(&self) -> bool {
        self.image.as_ref().is_some_and(DeviceImage::is_aliased)
    }

    /// Geometry at `level`, clamped to the last mip.
    pub fn info(&self, level: u32) -> TextureInfo {
        let level = level.min(self.mip_levels.saturating_sub(1));
        let extent = self.extent.mip(level);
        TextureInfo {
            kind: self.kind,
            format: self.format,
            flags: self.flags,
            width: extent.width,
            height: extent.height,
            depth: if self.kind == TextureKind::Volume {
                extent.depth
            } else {
                1
            },
            array_layers: self.array_layers(),
            mip_levels: self.mip_levels,
        }
    }

    /// Device bytes counted against the resident budget.
    ///
    /// Tiled, aliased and stub textures do not own their memory and report 0.
    pub fn resident_size(&self) -> u64 {
        if self.stub || self.flags.contains(CreateFlags::TILED) {
            return 0;
        }
        match &self.image {
            Some(image) if !image.is_aliased() => {
                staging_buffer_size(image.descriptor(), SubresourceRange::whole(image.descriptor()))
            }
            _ => 0,
        }
    }

    pub(crate) fn notify_sampler_change(&self, tracker: &dyn DirtyTracker) {
        for (stage, slots) in self.bindings.srv_stages() {
            tracker.dirty_sampler(self.handle, stage, slots);
        }
    }

    pub(crate) fn notify_view_change(&self, tracker: &dyn DirtyTracker) {
        for (stage, slots) in self.bindings.srv_stages() {
            tracker.dirty_srv(self.handle, stage, slots);
        }
    }

    /// Notify after the backing changed; the caller holds the binding lock.
    pub(crate) fn notify_replace_finish(
        tracker: &dyn DirtyTracker,
        handle: TextureHandle,
        bindings: &BindingState,
    ) {
        for (stage, slots) in bindings.srv_stages() {
            tracker.dirty_srv_and_sampler_no_lock(handle, stage, slots);
        }
        for (stage, slots) in bindings.uav_stages() {
            tracker.dirty_uav_no_lock(handle, stage, slots);
        }
        if bindings.render_targets() != 0 || bindings.is_depth_stencil_bound() {
            tracker.dirty_render_targets_no_lock(handle);
        }
    }

    /// Release the image and staging memory once submitted work completed.
    pub(crate) fn release(&mut self, ctx: &TextureContext<'_>) {
        if !matches!(self.lock, LockState::Unlocked) {
            log::warn!("<{}> released while locked", self.name);
        }
        self.lock = LockState::Unlocked;
        self.wait_progress = None;
        let after = ctx.device.current_progress();
        if let Some(staging) = self.staging.take() {
            ctx.device.free_staging(staging, after);
        }
        if let Some(image) = self.image.take() {
            ctx.device.destroy_image(image, after);
        }
        self.staging_in_sync = false;
    }
}

static_assertions::assert_impl_all!(TextureRecord: Send, Sync);
