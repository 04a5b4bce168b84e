//! Binding state and dirty notifications.
//!
//! A texture record remembers where it is bound (per shader stage SRV/UAV slots,
//! render target and depth/stencil attachment). When sampler or view state changes
//! the record reports every stage it is bound to through a [`DirtyTracker`], so the
//! binding layer re-resolves descriptors before the next draw or dispatch.
//!
//! Resource replacement runs while the caller already holds the tracker's binding
//! lock, so it uses the `*_no_lock` notifications.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::manager::TextureHandle;

/// Maximum simultaneously bound render targets.
pub const MAX_SIMULTANEOUS_RENDER_TARGETS: u32 = 8;

/// Maximum SRV/UAV slots per stage.
pub const MAX_SLOTS: u32 = 64;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

impl ShaderStage {
    /// All stages.
    pub const ALL: [ShaderStage; 3] = [Self::Vertex, Self::Pixel, Self::Compute];

    /// Index into per-stage arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Pixel => 1,
            Self::Compute => 2,
        }
    }
}

/// Where a texture is currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingState {
    srv: [u64; 3],
    uav: [u64; 3],
    rtv: u8,
    dsv: bool,
    /// Bound as a render target at least once.
    pub used_as_render_target: bool,
    /// Render target content changed since the last resolve.
    pub dirty_render_target: bool,
}

fn set_bit(mask: &mut u64, slot: u32, bound: bool) {
    debug_assert!(slot < MAX_SLOTS);
    if bound {
        *mask |= 1 << slot;
    } else {
        *mask &= !(1 << slot);
    }
}

impl BindingState {
    pub fn set_srv(&mut self, stage: ShaderStage, slot: u32, bound: bool) {
        set_bit(&mut self.srv[stage.index()], slot, bound);
    }

    pub fn set_uav(&mut self, stage: ShaderStage, slot: u32, bound: bool) {
        set_bit(&mut self.uav[stage.index()], slot, bound);
    }

    pub fn set_render_target(&mut self, index: u32, bound: bool) {
        debug_assert!(index < MAX_SIMULTANEOUS_RENDER_TARGETS);
        if bound {
            self.rtv |= 1 << index;
            self.used_as_render_target = true;
            self.dirty_render_target = true;
        } else {
            self.rtv &= !(1 << index);
        }
    }

    pub fn set_depth_stencil(&mut self, bound: bool) {
        self.dsv = bound;
        if bound {
            self.used_as_render_target = true;
        }
    }

    /// SRV slot mask of `stage`.
    pub fn srv_slots(&self, stage: ShaderStage) -> u64 {
        self.srv[stage.index()]
    }

    /// UAV slot mask of `stage`.
    pub fn uav_slots(&self, stage: ShaderStage) -> u64 {
        self.uav[stage.index()]
    }

    /// Render target slot mask.
    pub fn render_targets(&self) -> u8 {
        self.rtv
    }

    pub fn is_depth_stencil_bound(&self) -> bool {
        self.dsv
    }

    /// Returns true if bound anywhere.
    pub fn is_bound(&self) -> bool {
        self.srv.iter().chain(&self.uav).any(|mask| *mask != 0) || self.rtv != 0 || self.dsv
    }

    /// Stages with SRV bindings and their slot masks.
    pub fn srv_stages(&self) -> impl Iterator<Item = (ShaderStage, u64)> + '_ {
        ShaderStage::ALL
            .into_iter()
            .map(|stage| (stage, self.srv_slots(stage)))
            .filter(|(_, slots)| *slots != 0)
    }

    /// Stages with UAV bindings and their slot masks.
    pub fn uav_stages(&self) -> impl Iterator<Item = (ShaderStage, u64)> + '_ {
        ShaderStage::ALL
            .into_iter()
            .map(|stage| (stage, self.uav_slots(stage)))
            .filter(|(_, slots)| *slots != 0)
    }
}

/// Receiver of binding invalidations.
pub trait DirtyTracker: Send + Sync {
    /// Run `f` while holding the binding lock.
    fn with_binding_lock(&self, f: &mut dyn FnMut());

    /// Sampler state of SRVs in `slots` changed. Takes the binding lock.
    fn dirty_sampler(&self, texture: TextureHandle, stage: ShaderStage, slots: u64);

    /// View state of SRVs in `slots` changed. Takes the binding lock.
    fn dirty_srv(&self, texture: TextureHandle, stage: ShaderStage, slots: u64);

    fn dirty_srv_and_sampler_no_lock(&self, texture: TextureHandle, stage: ShaderStage, slots: u64);

    fn dirty_srv_no_lock(&self, texture: TextureHandle, stage: ShaderStage, slots: u64);

    fn dirty_uav_no_lock(&self, texture: TextureHandle, stage: ShaderStage, slots: u64);

    fn dirty_render_targets_no_lock(&self, texture: TextureHandle);

    /// The texture is being destroyed while still bound.
    fn notify_delete(&self, texture: TextureHandle, state: &BindingState);
}

/// Dirty masks accumulated for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyMasks {
    pub srv: u64,
    pub sampler: u64,
    pub uav: u64,
}

#[derive(Debug, Default)]
struct StageMasks {
    srv: AtomicU64,
    sampler: AtomicU64,
    uav: AtomicU64,
}

/// Dirty tracker accumulating per-stage masks until the binding layer takes them.
#[derive(Debug, Default)]
pub struct BindingTracker {
    lock: Mutex<()>,
    stages: [StageMasks; 3],
    render_targets: AtomicBool,
    deleted_while_bound: AtomicUsize,
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take and reset the dirty masks of `stage`.
    pub fn take_dirty(&self, stage: ShaderStage) -> DirtyMasks {
        let masks = &self.stages[stage.index()];
        DirtyMasks {
            srv: masks.srv.swap(0, Ordering::AcqRel),
            sampler: masks.sampler.swap(0, Ordering::AcqRel),
            uav: masks.uav.swap(0, Ordering::AcqRel),
        }
    }

    /// Take and reset the render target dirty bit.
    pub fn take_render_targets_dirty(&self) -> bool {
        self.render_targets.swap(false, Ordering::AcqRel)
    }

    /// Textures destroyed while still bound.
    pub fn deleted_while_bound(&self) -> usize {
        self.deleted_while_bound.load(Ordering::Acquire)
    }

    /// Returns true if the binding lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    fn mark(&self, stage: ShaderStage, srv: u64, sampler: u64, uav: u64) {
        let masks = &self.stages[stage.index()];
        masks.srv.fetch_or(srv, Ordering::AcqRel);
        masks.sampler.fetch_or(sampler, Ordering::AcqRel);
        masks.uav.fetch_or(uav, Ordering::AcqRel);
    }
}

impl DirtyTracker for BindingTracker {
    fn with_binding_lock(&self, f: &mut dyn FnMut()) {
        let _guard = self.lock.lock();
        f();
    }

    fn dirty_sampler(&self, texture: TextureHandle, stage: ShaderStage, slots: u64) {
        let _guard = self.lock.lock();
        log::trace!("{:?}: sampler dirty in {:?} slots {:#x}", texture, stage, slots);
        self.mark(stage, 0, slots, 0);
    }

    fn dirty_srv(&self, texture: TextureHandle, stage: ShaderStage, slots: u64) {
        let _guard = self.lock.lock();
        log::trace!("{:?}: SRV dirty in {:?} slots {:#x}", texture, stage, slots);
        self.mark(stage, slots, 0, 0);
    }

    fn dirty_srv_and_sampler_no_lock(&self, _texture: TextureHandle, stage: ShaderStage, slots: u64) {
        self.mark(stage, slots, slots, 0);
    }

    fn dirty_srv_no_lock(&self, _texture: TextureHandle, stage: ShaderStage, slots: u64) {
        self.mark(stage, slots, 0, 0);
    }

    fn dirty_uav_no_lock(&self, _texture: TextureHandle, stage: ShaderStage, slots: u64) {
        self.mark(stage, 0, 0, slots);
    }

    fn dirty_render_targets_no_lock(&self, _texture: TextureHandle) {
        self.render_targets.store(true, Ordering::Release);
    }

    fn notify_delete(&self, texture: TextureHandle, state: &BindingState) {
        if !state.is_bound() {
            return;
        }
        let _guard = self.lock.lock();
        log::debug!("{:?} destroyed while still bound", texture);
        for (stage, slots) in state.srv_stages() {
            self.mark(stage, slots, slots, 0);
        }
        for (stage, slots) in state.uav_stages() {
            self.mark(stage, 0, 0, slots);
        }
        if state.render_targets() != 0 || state.is_depth_stencil_bound() {
            self.render_targets.store(true, Ordering::Release);
        }
        self.deleted_while_bound.fetch_add(1, Ordering::AcqRel);
    }
}

static_assertions::assert_impl_all!(BindingTracker: Send, Sync);
