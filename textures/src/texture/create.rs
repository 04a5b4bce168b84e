//! Image allocation and aliasing.

use crate::binding::BindingState;
use crate::descriptor::{ImageDescriptor, ImageDescriptorBuilder};
use crate::device::{DeviceImage, ImageRequest, StagingKind};
use crate::error::{TextureError, TextureResult};
use crate::layout::{staging_buffer_size, SubresourceRange};
use crate::manager::TextureHandle;
use crate::resolve::resolve_parameters;
use crate::types::{CreateFlags, Extent3d, SamplerState};

use super::upload::{validate_initial_data, SubresourceData};
use super::{LockState, TextureContext, TextureKind, TextureRecord};

/// Everything needed to create a record, after size clamping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CreateRequest<'a> {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Volume depth, or array size for array kinds.
    pub depth: u32,
    /// 0 selects an automatic mip count.
    pub mip_levels: u32,
    pub flags: CreateFlags,
    pub name: &'a str,
    /// Base image and flags of the texture being aliased.
    pub alias_of: Option<(&'a DeviceImage, CreateFlags)>,
}

/// Reconcile fast-pool placement of an alias with its base.
fn alias_flags(ctx: &TextureContext<'_>, flags: CreateFlags, base: CreateFlags, name: &str) -> CreateFlags {
    if !ctx.device.capabilities().fast_memory_pool {
        return flags;
    }
    let fast = CreateFlags::FAST_POOL;
    if base.contains(CreateFlags::FAST_POOL_MOVABLE) {
        log::warn!("<{}> aliases a texture that can move out of the fast pool", name);
    }
    if flags & fast != base & fast {
        log::warn!(
            "<{}> fast pool flags {:?} differ from the aliased base {:?}, using the base's",
            name,
            flags & fast,
            base & fast
        );
        return flags.difference(fast) | (base & fast);
    }
    flags
}

impl TextureRecord {
    fn build_descriptor(
        ctx: &TextureContext<'_>,
        request: &CreateRequest<'_>,
        flags: CreateFlags,
    ) -> TextureResult<ImageDescriptor> {
        let resolved = resolve_parameters(request.width, request.height, flags, request.mip_levels);
        let builder = match request.kind {
            TextureKind::Volume => {
                ImageDescriptorBuilder::new_3d(request.width, request.height, request.depth, &resolved)
            }
            TextureKind::Plain2D => ImageDescriptorBuilder::new_2d(request.width, request.height, &resolved),
            TextureKind::Cube => {
                ImageDescriptorBuilder::new_2d(request.width, request.height, &resolved).with_cube(true)
            }
            TextureKind::Array => ImageDescriptorBuilder::new_2d(request.width, request.height, &resolved)
                .with_array_size(request.depth),
            TextureKind::CubeArray => ImageDescriptorBuilder::new_2d(request.width, request.height, &resolved)
                .with_cube(true)
                .with_array_size(request.depth),
        };
        builder
            .with_label(request.name)
            .build(&ctx.device.capabilities())
            .map_err(|err| ctx.fail(err))
    }

    /// Create a record with its image and, optionally, initial content.
    ///
    /// Without initial data the clear policy runs. Any failure releases what was
    /// already reserved.
    pub(crate) fn create(
        ctx: &TextureContext<'_>,
        request: &CreateRequest<'_>,
        data: Option<&[SubresourceData<'_>]>,
    ) -> TextureResult<TextureRecord> {
        let mut flags = request.flags;
        if flags.contains(CreateFlags::RENDER_TARGET | CreateFlags::DYNAMIC) {
            return Err(ctx.precondition(format!(
                "<{}>: dynamic render targets are not supported",
                request.name
            )));
        }
        if let Some((_, base_flags)) = request.alias_of {
            flags = alias_flags(ctx, flags, base_flags, request.name);
        }

        let descriptor = Self::build_descriptor(ctx, request, flags)?;
        if let Some(data) = data {
            validate_initial_data(&descriptor, data).map_err(|err| ctx.fail(err))?;
        }

        let image = ctx
            .device
            .create_image(&ImageRequest {
                descriptor: &descriptor,
                alias_of: request.alias_of.map(|(base, _)| base),
                name: request.name,
            })
            .ok_or_else(|| ctx.fail(TextureError::ImageAllocationFailed(request.name.to_string())))?;

        let kind = request.kind;
        let mip_levels = descriptor.mip_levels;
        let mut record = TextureRecord {
            handle: TextureHandle::INVALID,
            name: request.name.to_string(),
            kind,
            flags: flags.with_format(descriptor.format),
            format: descriptor.format,
            extent: Extent3d::new(
                request.width,
                request.height,
                if kind == TextureKind::Volume {
                    request.depth.max(1)
                } else {
                    1
                },
            ),
            array_size: match kind {
                TextureKind::Array | TextureKind::CubeArray => request.depth.max(1),
                _ => 1,
            },
            mip_levels,
            mip_range: 0..mip_levels,
            sampler: SamplerState::new(
                kind.is_cube(),
                ctx.config.default_lod_bias,
                ctx.config.default_anisotropy,
            ),
            bindings: BindingState::default(),
            image: Some(image),
            staging: None,
            staging_in_sync: false,
            lock: LockState::Unlocked,
            wait_progress: None,
            mirror: None,
            stub: false,
        };

        if let Err(err) = record.initialize(ctx, &descriptor, data) {
            record.release(ctx);
            return Err(err);
        }
        Ok(record)
    }

    fn initialize(
        &mut self,
        ctx: &TextureContext<'_>,
        descriptor: &ImageDescriptor,
        data: Option<&[SubresourceData<'_>]>,
    ) -> TextureResult<()> {
        if self
            .flags
            .intersects(CreateFlags::SYSTEM_MEMORY | CreateFlags::READABLE)
        {
            self.allocate_persistent_staging(ctx, descriptor)?;
        }
        match data {
            Some(data) => self.upload_initial_data(ctx, descriptor, data),
            None => self.apply_clear_policy(ctx, descriptor),
        }
    }

    /// Ensure a persistent staging region covering every subresource.
    pub(crate) fn allocate_persistent_staging(
        &mut self,
        ctx: &TextureContext<'_>,
        descriptor: &ImageDescriptor,
    ) -> TextureResult<()> {
        if let Some(staging) = &self.staging {
            if staging.kind() == StagingKind::PersistentBidirectional {
                return Ok(());
            }
        }
        let size = staging_buffer_size(descriptor, SubresourceRange::whole(descriptor));
        let staging = ctx
            .device
            .allocate_staging(size, StagingKind::PersistentBidirectional)
            .ok_or_else(|| ctx.fail(TextureError::StagingAllocationFailed { size }))?;
        if let Some(old) = self.staging.replace(staging) {
            ctx.device.free_staging(old, ctx.device.current_progress());
        }
        self.staging_in_sync = false;
        Ok(())
    }
}
