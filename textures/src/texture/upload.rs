//! Staging and upload pipeline.
//!
//! Source data is copied row by row from the caller's pitch into the device pitch
//! of each subresource footprint. 2D, cube and array textures are uploaded with
//! one command per array layer; volumes upload their whole mip chain at once.

use crate::descriptor::{ImageDescriptor, ImageDimension};
use crate::device::{DeviceImage, DeviceQueue, FenceValue, StagingKind, StagingRegion};
use crate::error::{TextureError, TextureResult};
use crate::layout::{BufferImageCopy, StagingLayout, SubresourceFootprint, SubresourceRange};

use super::{TextureContext, TextureRecord};

/// Initial content of one subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    /// Bytes between block rows.
    pub row_pitch: u32,
    /// Bytes between depth slices; 0 means `row_pitch` times the block rows.
    pub slice_pitch: u32,
}

impl<'a> SubresourceData<'a> {
    pub fn new(data: &'a [u8], row_pitch: u32) -> Self {
        Self {
            data,
            row_pitch,
            slice_pitch: 0,
        }
    }

    pub fn with_slice_pitch(mut self, slice_pitch: u32) -> Self {
        self.slice_pitch = slice_pitch;
        self
    }

    fn slice_pitch_for(&self, footprint: &SubresourceFootprint) -> u64 {
        if self.slice_pitch == 0 {
            u64::from(self.row_pitch) * u64::from(footprint.rows)
        } else {
            u64::from(self.slice_pitch)
        }
    }

    /// Bytes needed to read `footprint` with this pitch.
    fn required_len(&self, footprint: &SubresourceFootprint) -> u64 {
        let slices = u64::from(footprint.extent.depth);
        (slices - 1) * self.slice_pitch_for(footprint)
            + u64::from(footprint.rows - 1) * u64::from(self.row_pitch)
            + u64::from(footprint.row_bytes)
    }
}

/// Check that `data` covers every subresource of `descriptor`.
pub(crate) fn validate_initial_data(
    descriptor: &ImageDescriptor,
    data: &[SubresourceData<'_>],
) -> TextureResult<()> {
    let count = descriptor.subresource_count() as usize;
    if data.len() < count {
        return Err(TextureError::InvalidParameter(format!(
            "initial data for {} of {} subresources",
            data.len(),
            count
        )));
    }
    let layout = StagingLayout::plan(descriptor, SubresourceRange::whole(descriptor));
    for copy in &layout.copies {
        let source = &data[copy.subresource as usize];
        if source.row_pitch < copy.footprint.row_bytes {
            return Err(TextureError::InvalidParameter(format!(
                "row pitch {} of subresource {} is smaller than a row ({} bytes)",
                source.row_pitch, copy.subresource, copy.footprint.row_bytes
            )));
        }
        let required = source.required_len(&copy.footprint);
        if (source.data.len() as u64) < required {
            return Err(TextureError::InvalidParameter(format!(
                "subresource {} has {} bytes, {} needed",
                copy.subresource,
                source.data.len(),
                required
            )));
        }
    }
    Ok(())
}

/// Copy one subresource from source pitch into staging pitch.
pub(crate) fn write_subresource(staging: &mut [u8], copy: &BufferImageCopy, source: &SubresourceData<'_>) {
    let fp = &copy.footprint;
    let row_bytes = fp.row_bytes as usize;
    let src_slice = source.slice_pitch_for(fp);
    for z in 0..u64::from(fp.extent.depth) {
        for row in 0..u64::from(fp.rows) {
            let src_at = (z * src_slice + row * u64::from(source.row_pitch)) as usize;
            let dst_at = (fp.offset + z * fp.slice_pitch() + row * u64::from(fp.row_pitch)) as usize;
            staging[dst_at..dst_at + row_bytes].copy_from_slice(&source.data[src_at..src_at + row_bytes]);
        }
    }
}

/// Flush and upload `copies`, one command per array layer (one for volumes).
pub(crate) fn submit_uploads(
    ctx: &TextureContext<'_>,
    staging: &StagingRegion,
    image: &DeviceImage,
    copies: &[BufferImageCopy],
) -> FenceValue {
    let descriptor = image.descriptor();
    if descriptor.dimension == ImageDimension::D3 {
        ctx.device
            .flush_staging(staging, StagingLayout::span(copies.iter()));
        return ctx
            .device
            .upload_to_image(staging, image, copies, DeviceQueue::Upload, false);
    }

    let mut fence = ctx.device.current_progress();
    for layer in 0..descriptor.array_layers {
        let layer_copies: Vec<BufferImageCopy> =
            copies.iter().filter(|copy| copy.layer == layer).copied().collect();
        if layer_copies.is_empty() {
            continue;
        }
        ctx.device
            .flush_staging(staging, StagingLayout::span(layer_copies.iter()));
        fence = ctx
            .device
            .upload_to_image(staging, image, &layer_copies, DeviceQueue::Upload, false);
    }
    fence
}

impl TextureRecord {
    /// Fill the image from caller data through persistent or temporary staging.
    pub(crate) fn upload_initial_data(
        &mut self,
        ctx: &TextureContext<'_>,
        descriptor: &ImageDescriptor,
        data: &[SubresourceData<'_>],
    ) -> TextureResult<()> {
        let layout = StagingLayout::plan(descriptor, SubresourceRange::whole(descriptor));
        let (persistent, mut staging) = match self.staging.take() {
            Some(staging) => (true, staging),
            None => {
                let staging = ctx
                    .device
                    .allocate_staging(layout.size, StagingKind::TemporaryUpload)
                    .ok_or_else(|| ctx.fail(TextureError::StagingAllocationFailed { size: layout.size }))?;
                (false, staging)
            }
        };

        for copy in &layout.copies {
            write_subresource(staging.as_mut_slice(), copy, &data[copy.subresource as usize]);
        }

        let Some(image) = self.image.as_ref() else {
            ctx.device.free_staging(staging, ctx.device.current_progress());
            return Err(ctx.precondition(format!("<{}>: upload without an image", self.name)));
        };
        let fence = submit_uploads(ctx, &staging, image, &layout.copies);
        log::trace!(
            "<{}>: uploaded {} subresources ({} staging bytes), progress {}",
            self.name,
            layout.copies.len(),
            layout.size,
            fence
        );

        if persistent {
            self.staging = Some(staging);
            self.staging_in_sync = true;
        } else {
            ctx.device.free_staging(staging, fence);
        }
        Ok(())
    }
}
