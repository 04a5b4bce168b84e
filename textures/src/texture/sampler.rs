//! Sampler and view setters.
//!
//! Every change is reported to the binding layer for each stage the texture is
//! bound to as a shader resource.

use std::ops::Range;

use crate::binding::DirtyTracker;
use crate::error::{TextureError, TextureResult};
use crate::types::{AddressMode, FilterMode, MipFilterMode, SamplerState};

use super::{TextureKind, TextureRecord};

impl TextureRecord {
    fn modify_sampler(&mut self, tracker: &dyn DirtyTracker, f: impl FnOnce(&mut SamplerState)) {
        let before = self.sampler;
        f(&mut self.sampler);
        if self.sampler != before {
            self.notify_sampler_change(tracker);
        }
    }

    pub(crate) fn set_address_mode(&mut self, tracker: &dyn DirtyTracker, mode: AddressMode) {
        let volume = self.kind == TextureKind::Volume;
        self.modify_sampler(tracker, |sampler| {
            sampler.address_u = mode;
            sampler.address_v = mode;
            if volume {
                sampler.address_w = mode;
            }
        });
    }

    pub(crate) fn set_address_mode_u(&mut self, tracker: &dyn DirtyTracker, mode: AddressMode) {
        self.modify_sampler(tracker, |sampler| sampler.address_u = mode);
    }

    pub(crate) fn set_address_mode_v(&mut self, tracker: &dyn DirtyTracker, mode: AddressMode) {
        self.modify_sampler(tracker, |sampler| sampler.address_v = mode);
    }

    /// Only volumes have a third coordinate.
    pub(crate) fn set_address_mode_w(&mut self, tracker: &dyn DirtyTracker, mode: AddressMode) -> TextureResult<()> {
        if self.kind != TextureKind::Volume {
            return Err(TextureError::Unsupported(format!(
                "<{}>: w addressing of a {:?} texture",
                self.name, self.kind
            )));
        }
        self.modify_sampler(tracker, |sampler| sampler.address_w = mode);
        Ok(())
    }

    pub(crate) fn set_border_color(&mut self, tracker: &dyn DirtyTracker, color: u32) {
        self.modify_sampler(tracker, |sampler| sampler.border_color = color);
    }

    pub(crate) fn set_filter(&mut self, tracker: &dyn DirtyTracker, filter: FilterMode) {
        self.modify_sampler(tracker, |sampler| sampler.filter = filter);
    }

    pub(crate) fn set_mip_filter(&mut self, tracker: &dyn DirtyTracker, filter: MipFilterMode) {
        self.modify_sampler(tracker, |sampler| sampler.mip_filter = filter);
    }

    pub(crate) fn set_lod_bias(&mut self, tracker: &dyn DirtyTracker, bias: f32) {
        self.modify_sampler(tracker, |sampler| sampler.lod_bias = bias);
    }

    pub(crate) fn set_anisotropy(&mut self, tracker: &dyn DirtyTracker, level: u32) {
        let level = level.clamp(1, SamplerState::MAX_ANISOTROPY);
        self.modify_sampler(tracker, |sampler| sampler.anisotropy = level);
    }

    /// Restrict the mips visible to samplers.
    pub(crate) fn set_mip_range(&mut self, tracker: &dyn DirtyTracker, range: Range<u32>) -> TextureResult<()> {
        if range.is_empty() || range.end > self.mip_levels {
            return Err(TextureError::InvalidParameter(format!(
                "<{}>: mip range {:?} outside {} mips",
                self.name, range, self.mip_levels
            )));
        }
        if self.mip_range != range {
            self.mip_range = range;
            self.notify_view_change(tracker);
        }
        Ok(())
    }
}
