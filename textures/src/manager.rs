//! Texture manager: the handle table and the public texture operations.

use std::io::{Read, Seek};
use std::ops::Range;
use std::sync::Arc;

use crate::binding::{BindingState, DirtyTracker, ShaderStage};
use crate::config::TextureSystemConfig;
use crate::ddsx::{self, DdsxHeader, DdsxLayout, DdsxLoadOptions, SystemCopy};
use crate::device::DeviceContext;
use crate::error::{TextureError, TextureResult};
use crate::texture::{
    CreateRequest, LockState, LockedRegion, ResizeRequest, SubRegionCopy, SubresourceData, TextureContext,
    TextureInfo, TextureKind, TextureRecord,
};
use crate::types::{AddressMode, CreateFlags, FilterMode, LockFlags, MipFilterMode};

/// Stable reference to a texture.
///
/// Handles use a generation counter to detect stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// Index into the texture table.
    index: u32,
    /// Generation counter for validation.
    generation: u32,
}

impl TextureHandle {
    /// A handle that never refers to a texture.
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Create a handle from its raw parts.
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Get the index of this texture.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Get the generation of this handle.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Parameters of a new texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureCreateInfo {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Volume depth, or array size for array kinds.
    pub depth: u32,
    /// 0 selects an automatic mip count.
    pub mip_levels: u32,
    pub flags: CreateFlags,
    /// Debug label.
    pub label: Option<String>,
}

impl TextureCreateInfo {
    fn new(kind: TextureKind, width: u32, height: u32, depth: u32, flags: CreateFlags) -> Self {
        Self {
            kind,
            width,
            height,
            depth,
            mip_levels: 0,
            flags,
            label: None,
        }
    }

    /// Create info for a 2D texture.
    pub fn new_2d(width: u32, height: u32, flags: CreateFlags) -> Self {
        Self::new(TextureKind::Plain2D, width, height, 1, flags)
    }

    /// Create info for a cube texture with square faces.
    pub fn new_cube(size: u32, flags: CreateFlags) -> Self {
        Self::new(TextureKind::Cube, size, size, 1, flags)
    }

    /// Create info for a volume texture.
    pub fn new_volume(width: u32, height: u32, depth: u32, flags: CreateFlags) -> Self {
        Self::new(TextureKind::Volume, width, height, depth, flags)
    }

    /// Create info for a 2D array texture.
    pub fn new_array(width: u32, height: u32, layers: u32, flags: CreateFlags) -> Self {
        Self::new(TextureKind::Array, width, height, layers, flags)
    }

    /// Create info for an array of cube textures.
    pub fn new_cube_array(size: u32, cubes: u32, flags: CreateFlags) -> Self {
        Self::new(TextureKind::CubeArray, size, size, cubes, flags)
    }

    /// Set the mip count; 0 selects it automatically.
    pub fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<TextureRecord>,
}

/// Owns every texture record and hands out [`TextureHandle`]s.
///
/// Operations on one texture run on the calling thread; GPU work they submit
/// completes asynchronously on the device.
pub struct TextureManager {
    device: Arc<dyn DeviceContext>,
    tracker: Arc<dyn DirtyTracker>,
    config: TextureSystemConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl std::fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureManager")
            .field("device", &self.device.name())
            .field("textures", &self.len())
            .finish()
    }
}

impl TextureManager {
    pub fn new(device: Arc<dyn DeviceContext>, tracker: Arc<dyn DirtyTracker>, config: TextureSystemConfig) -> Self {
        log::info!("Texture manager created on {} device", device.name());
        Self {
            device,
            tracker,
            config,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn DeviceContext> {
        &self.device
    }

    pub fn tracker(&self) -> &Arc<dyn DirtyTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &TextureSystemConfig {
        &self.config
    }

    /// Number of live textures.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.record.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn context(&self) -> TextureContext<'_> {
        TextureContext {
            device: self.device.as_ref(),
            tracker: self.tracker.as_ref(),
            config: &self.config,
        }
    }

    fn insert(&mut self, mut record: TextureRecord) -> TextureHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = TextureHandle::from_raw(index, slot.generation);
        record.handle = handle;
        slot.record = Some(record);
        handle
    }

    fn take(&mut self, handle: TextureHandle) -> Option<TextureRecord> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(record)
    }

    /// Look up a texture.
    pub fn get(&self, handle: TextureHandle) -> TextureResult<&TextureRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
            .ok_or(TextureError::InvalidHandle)
    }

    /// Returns true if `handle` refers to a live texture.
    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Context and record of `handle`, borrowed together.
    fn split(&mut self, handle: TextureHandle) -> TextureResult<(TextureContext<'_>, &mut TextureRecord)> {
        let Self {
            device,
            tracker,
            config,
            slots,
            ..
        } = self;
        let ctx = TextureContext {
            device: &**device,
            tracker: &**tracker,
            config,
        };
        match slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
        {
            Some(record) => Ok((ctx, record)),
            None => Err(ctx.fail(TextureError::InvalidHandle)),
        }
    }

    /// Context, a mutable destination and a shared source.
    fn split_pair(
        &mut self,
        dst: TextureHandle,
        src: TextureHandle,
    ) -> TextureResult<(TextureContext<'_>, &mut TextureRecord, &TextureRecord)> {
        self.get(dst)?;
        self.get(src)?;
        if dst.index == src.index {
            return Err(TextureError::InvalidParameter(
                "source and destination are the same texture".to_string(),
            ));
        }
        let Self {
            device,
            tracker,
            config,
            slots,
            ..
        } = self;
        let ctx = TextureContext {
            device: &**device,
            tracker: &**tracker,
            config,
        };
        let (dst_index, src_index) = (dst.index as usize, src.index as usize);
        let (dst_slot, src_slot) = if dst_index < src_index {
            let (low, high) = slots.split_at_mut(src_index);
            (&mut low[dst_index], &high[0])
        } else {
            let (low, high) = slots.split_at_mut(dst_index);
            (&mut high[0], &low[src_index])
        };
        match (dst_slot.record.as_mut(), src_slot.record.as_ref()) {
            (Some(dst), Some(src)) => Ok((ctx, dst, src)),
            _ => Err(ctx.fail(TextureError::InvalidHandle)),
        }
    }

    fn clamp_dimensions(&self, info: &TextureCreateInfo) -> (u32, u32, u32) {
        let config = &self.config;
        let (width, height, depth) = match info.kind {
            TextureKind::Plain2D | TextureKind::Array => (
                info.width.clamp(config.min_texture_size, config.max_texture_size),
                info.height.clamp(config.min_texture_size, config.max_texture_size),
                info.depth,
            ),
            TextureKind::Cube | TextureKind::CubeArray => {
                let size = info
                    .width
                    .clamp(config.min_cube_size, config.max_cube_size)
                    .next_power_of_two();
                (size, size, info.depth)
            }
            TextureKind::Volume => (
                info.width.clamp(1, config.max_volume_size),
                info.height.clamp(1, config.max_volume_size),
                info.depth.clamp(1, config.max_volume_size),
            ),
        };
        if (width, height, depth) != (info.width, info.height, info.depth) {
            log::warn!(
                "<{}>: size {}x{}x{} adjusted to {}x{}x{}",
                info.label.as_deref().unwrap_or_default(),
                info.width,
                info.height,
                info.depth,
                width,
                height,
                depth
            );
        }
        (width, height, depth)
    }

    /// Create a texture, optionally filled with `data` indexed by subresource.
    pub fn create(
        &mut self,
        info: &TextureCreateInfo,
        data: Option<&[SubresourceData<'_>]>,
    ) -> TextureResult<TextureHandle> {
        let (width, height, depth) = self.clamp_dimensions(info);
        let ctx = self.context();
        if data.is_some() && (width, height, depth) != (info.width, info.height, info.depth) {
            return Err(ctx.fail(TextureError::InvalidParameter(format!(
                "initial data for {}x{}x{} does not fit the adjusted size {}x{}x{}",
                info.width, info.height, info.depth, width, height, depth
            ))));
        }
        let name = info.label.as_deref().unwrap_or_default();
        let mut record = TextureRecord::create(
            &ctx,
            &CreateRequest {
                kind: info.kind,
                width,
                height,
                depth,
                mip_levels: info.mip_levels,
                flags: info.flags,
                name,
                alias_of: None,
            },
            data,
        )?;
        if let Some(data) = data {
            if record.flags.contains(CreateFlags::SYSTEM_COPY) {
                record.mirror = SystemCopy::from_initial_data(&record, data);
            }
        }
        Ok(self.insert(record))
    }

    /// Create a texture sharing the memory of `base`.
    pub fn alias(&mut self, base: TextureHandle, info: &TextureCreateInfo) -> TextureResult<TextureHandle> {
        let (width, height, depth) = self.clamp_dimensions(info);
        let ctx = self.context();
        let base_record = self.get(base).map_err(|err| ctx.fail(err))?;
        let Some(base_image) = base_record.image.as_ref().filter(|_| !base_record.stub) else {
            return Err(ctx.precondition(format!("<{}> can not be aliased without an image", base_record.name)));
        };
        let name = info.label.as_deref().unwrap_or_default();
        let record = TextureRecord::create(
            &ctx,
            &CreateRequest {
                kind: info.kind,
                width,
                height,
                depth,
                mip_levels: info.mip_levels,
                flags: info.flags,
                name,
                alias_of: Some((base_image, base_record.flags)),
            },
            None,
        )?;
        Ok(self.insert(record))
    }

    /// Destroy a texture; its memory is freed once submitted work completed.
    pub fn destroy(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let Some(mut record) = self.take(handle) else {
            return Err(self.context().fail(TextureError::InvalidHandle));
        };
        let ctx = self.context();
        ctx.tracker.notify_delete(handle, &record.bindings);
        record.release(&ctx);
        log::trace!("<{}> destroyed", record.name);
        Ok(())
    }

    /// Lock mip `level` of a 2D texture (layer 0 of an array).
    pub fn lock(&mut self, handle: TextureHandle, level: u32, flags: LockFlags) -> TextureResult<LockedRegion<'_>> {
        let (ctx, record) = self.split(handle)?;
        record.lock_level(&ctx, level, flags)
    }

    /// Lock mip `level` of a cube face or array layer.
    pub fn lock_face(
        &mut self,
        handle: TextureHandle,
        layer: u32,
        level: u32,
        flags: LockFlags,
    ) -> TextureResult<LockedRegion<'_>> {
        let (ctx, record) = self.split(handle)?;
        record.lock_face(&ctx, layer, level, flags)
    }

    /// Lock mip `level` of a volume; the region carries the slice pitch.
    pub fn lock_box(&mut self, handle: TextureHandle, level: u32, flags: LockFlags) -> TextureResult<LockedRegion<'_>> {
        let (ctx, record) = self.split(handle)?;
        record.lock_box(&ctx, level, flags)
    }

    pub fn unlock(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.unlock(&ctx)
    }

    /// Start an asynchronous read back for a later read lock.
    pub fn begin_readback(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.begin_readback(&ctx)
    }

    /// Shrink to fewer mips, keeping the overlapping ones.
    pub fn downsize(&mut self, handle: TextureHandle, request: &ResizeRequest) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.resize(&ctx, request, false)
    }

    /// Grow to more mips, keeping the overlapping ones.
    pub fn upsize(&mut self, handle: TextureHandle, request: &ResizeRequest) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.resize(&ctx, request, true)
    }

    /// Move the backing of `donor` into `target` and destroy `donor`.
    pub fn replace(&mut self, target: TextureHandle, donor: TextureHandle) -> TextureResult<()> {
        for handle in [target, donor] {
            let record = self.get(handle).map_err(|err| self.context().fail(err))?;
            if record.lock != LockState::Unlocked {
                return Err(self.context().fail(TextureError::Busy(record.name.clone())));
            }
        }
        if target == donor {
            return Ok(());
        }
        let Some(mut donor_record) = self.take(donor) else {
            return Err(TextureError::InvalidHandle);
        };
        let (ctx, record) = self.split(target)?;
        record.swap_backing(&ctx, &mut donor_record);
        std::mem::swap(&mut record.mirror, &mut donor_record.mirror);
        log::debug!("<{}>: backing replaced by <{}>", record.name, donor_record.name);
        ctx.tracker.notify_delete(donor, &donor_record.bindings);
        donor_record.release(&ctx);
        Ok(())
    }

    /// Copy all of `src` into `dst`.
    pub fn update(&mut self, dst: TextureHandle, src: TextureHandle) -> TextureResult<()> {
        let (ctx, dst, src) = self.split_pair(dst, src)?;
        dst.update_from(&ctx, src)
    }

    /// Copy one region of `src` into `dst`.
    pub fn update_sub_region(
        &mut self,
        dst: TextureHandle,
        src: TextureHandle,
        copy: &SubRegionCopy,
    ) -> TextureResult<()> {
        let (ctx, dst, src) = self.split_pair(dst, src)?;
        dst.update_sub_region_from(&ctx, src, copy)
    }

    /// Geometry of `handle` at `level`, clamped to the last mip.
    pub fn info(&self, handle: TextureHandle, level: u32) -> TextureResult<TextureInfo> {
        Ok(self.get(handle)?.info(level))
    }

    /// Device bytes owned by `handle`.
    pub fn resident_size(&self, handle: TextureHandle) -> TextureResult<u64> {
        Ok(self.get(handle)?.resident_size())
    }

    /// Device bytes owned by all textures.
    pub fn total_resident_size(&self) -> u64 {
        self.records().map(TextureRecord::resident_size).sum()
    }

    /// All live textures.
    pub fn records(&self) -> impl Iterator<Item = &TextureRecord> {
        self.slots.iter().filter_map(|slot| slot.record.as_ref())
    }

    pub fn set_address_mode(&mut self, handle: TextureHandle, mode: AddressMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_address_mode(ctx.tracker, mode);
        Ok(())
    }

    pub fn set_address_mode_u(&mut self, handle: TextureHandle, mode: AddressMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_address_mode_u(ctx.tracker, mode);
        Ok(())
    }

    pub fn set_address_mode_v(&mut self, handle: TextureHandle, mode: AddressMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_address_mode_v(ctx.tracker, mode);
        Ok(())
    }

    /// Volumes only.
    pub fn set_address_mode_w(&mut self, handle: TextureHandle, mode: AddressMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_address_mode_w(ctx.tracker, mode).map_err(|err| ctx.fail(err))
    }

    pub fn set_border_color(&mut self, handle: TextureHandle, color: u32) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_border_color(ctx.tracker, color);
        Ok(())
    }

    pub fn set_filter(&mut self, handle: TextureHandle, filter: FilterMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_filter(ctx.tracker, filter);
        Ok(())
    }

    pub fn set_mip_filter(&mut self, handle: TextureHandle, filter: MipFilterMode) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_mip_filter(ctx.tracker, filter);
        Ok(())
    }

    pub fn set_lod_bias(&mut self, handle: TextureHandle, bias: f32) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_lod_bias(ctx.tracker, bias);
        Ok(())
    }

    /// Anisotropy is clamped to 1..=16.
    pub fn set_anisotropy(&mut self, handle: TextureHandle, level: u32) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_anisotropy(ctx.tracker, level);
        Ok(())
    }

    /// Restrict the mips visible to samplers.
    pub fn set_mip_range(&mut self, handle: TextureHandle, range: Range<u32>) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        record.set_mip_range(ctx.tracker, range).map_err(|err| ctx.fail(err))
    }

    /// Binding bookkeeping of `handle`, updated by the binding layer.
    pub fn bindings_mut(&mut self, handle: TextureHandle) -> TextureResult<&mut BindingState> {
        let (_, record) = self.split(handle)?;
        Ok(&mut record.bindings)
    }

    /// Record an SRV binding change.
    pub fn set_srv_binding(&mut self, handle: TextureHandle, stage: ShaderStage, slot: u32, bound: bool) -> TextureResult<()> {
        self.bindings_mut(handle)?.set_srv(stage, slot, bound);
        Ok(())
    }

    /// Record a UAV binding change.
    pub fn set_uav_binding(&mut self, handle: TextureHandle, stage: ShaderStage, slot: u32, bound: bool) -> TextureResult<()> {
        self.bindings_mut(handle)?.set_uav(stage, slot, bound);
        Ok(())
    }

    /// Create a stub texture for content streamed in later.
    pub fn allocate_ddsx(
        &mut self,
        header: &DdsxHeader,
        options: &DdsxLoadOptions,
        name: &str,
    ) -> TextureResult<TextureHandle> {
        let ctx = self.context();
        let layout = DdsxLayout::new(header, options).map_err(|err| ctx.fail(err))?;
        let record = TextureRecord::create_stub(&ctx, &layout, name)?;
        Ok(self.insert(record))
    }

    /// Load the payload following `header` into a stub created by
    /// [`allocate_ddsx`](Self::allocate_ddsx).
    pub fn load_ddsx_content<R: Read + Seek>(
        &mut self,
        handle: TextureHandle,
        header: &DdsxHeader,
        options: &DdsxLoadOptions,
        reader: &mut R,
    ) -> TextureResult<()> {
        let (ctx, record) = self.split(handle)?;
        if record.lock != LockState::Unlocked {
            return Err(ctx.fail(TextureError::Busy(record.name.clone())));
        }
        record.load_ddsx_content(&ctx, header, options, reader)
    }

    /// Read a DDSx stream into a new texture.
    ///
    /// Nothing is created when the header is invalid; a texture whose content
    /// fails to load is destroyed again.
    pub fn load_ddsx<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        options: &DdsxLoadOptions,
        name: &str,
    ) -> TextureResult<TextureHandle> {
        let header = ddsx::read_header(reader, &self.config).map_err(|err| self.context().fail(err))?;
        let handle = self.allocate_ddsx(&header, options, name)?;
        if let Err(err) = self.load_ddsx_content(handle, &header, options, reader) {
            self.destroy(handle)?;
            return Err(err);
        }
        Ok(handle)
    }
}

impl Drop for TextureManager {
    fn drop(&mut self) {
        let ctx = TextureContext {
            device: self.device.as_ref(),
            tracker: self.tracker.as_ref(),
            config: &self.config,
        };
        for slot in &mut self.slots {
            if let Some(mut record) = slot.record.take() {
                record.release(&ctx);
            }
        }
    }
}

static_assertions::assert_impl_all!(TextureManager: Send, Sync);
