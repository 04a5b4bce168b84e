//! Clear-on-create policy.

use crate::descriptor::{ImageDescriptor, ImageDimension};
use crate::device::{ClearValue, StagingKind, StorageView};
use crate::error::{TextureError, TextureResult};
use crate::layout::{BufferImageCopy, StagingLayout, SubresourceFootprint, SubresourceRange};
use crate::types::CreateFlags;

use super::upload::submit_uploads;
use super::{TextureContext, TextureRecord};

impl TextureRecord {
    /// Give a freshly created image defined content when no data was supplied.
    ///
    /// Render targets are always cleared. Other textures are cleared only with
    /// `CLEAR_ON_CREATE`: through storage views when they allow unordered access,
    /// otherwise by uploading zeroed staging memory.
    pub(crate) fn apply_clear_policy(
        &mut self,
        ctx: &TextureContext<'_>,
        descriptor: &ImageDescriptor,
    ) -> TextureResult<()> {
        let Some(image) = self.image.as_ref() else {
            return Ok(());
        };
        let whole = SubresourceRange::whole(descriptor);

        if self.flags.contains(CreateFlags::RENDER_TARGET) {
            if descriptor.format.is_depth_stencil() {
                ctx.device.clear_depth_stencil_image(image, whole, 0.0, 0);
            } else {
                ctx.device
                    .clear_color_image(image, whole, ClearValue::zero_for(descriptor.format));
            }
            return Ok(());
        }

        if !self.flags.contains(CreateFlags::CLEAR_ON_CREATE) {
            return Ok(());
        }

        if self.flags.contains(CreateFlags::UNORDERED_ACCESS) {
            let value = ClearValue::zero_for(descriptor.format);
            for mip in 0..descriptor.mip_levels {
                let layer_count = if descriptor.dimension == ImageDimension::D3 {
                    descriptor.mip_extent(mip).depth.max(1)
                } else {
                    descriptor.array_layers
                };
                ctx.device.clear_storage_image(
                    image,
                    StorageView {
                        mip,
                        first_layer: 0,
                        layer_count,
                    },
                    value,
                );
            }
            return Ok(());
        }

        if let Some(staging) = self.staging.as_mut() {
            let layout = StagingLayout::plan(descriptor, whole);
            staging.as_mut_slice().fill(0);
            submit_uploads(ctx, staging, image, &layout.copies);
            self.staging_in_sync = true;
            return Ok(());
        }

        // One zeroed region the size of mip 0 is the source of every upload.
        let base = SubresourceFootprint::new(descriptor.format, descriptor.mip_extent(0), 0);
        let size = base.size();
        let staging = ctx
            .device
            .allocate_staging(size, StagingKind::TemporaryUpload)
            .ok_or_else(|| ctx.fail(TextureError::StagingAllocationFailed { size }))?;
        let copies: Vec<BufferImageCopy> = StagingLayout::plan(descriptor, whole)
            .copies
            .into_iter()
            .map(|mut copy| {
                copy.footprint.offset = 0;
                copy
            })
            .collect();
        let fence = submit_uploads(ctx, &staging, image, &copies);
        log::trace!("<{}>: cleared through {} bytes of zeroed staging", self.name, size);
        ctx.device.free_staging(staging, fence);
        Ok(())
    }
}
