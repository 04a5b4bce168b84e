//! wgpu device implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.
//!
//! wgpu has a single queue, so upload and read back queue requests are
//! recorded on it in submission order. Progress values count submissions and
//! complete through `on_submitted_work_done`. Memory aliasing is not exposed by
//! wgpu; aliased images get their own allocation. Clears copy from a zeroed
//! buffer, except depth/stencil images which are cleared by an empty render
//! pass.

pub(crate) mod conversion;

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;

use crate::descriptor::{ImageDescriptor, ImageDimension};
use crate::error::{TextureError, TextureResult};
use crate::layout::{align_up, BufferImageCopy, MipRangeTransfer, StagingLayout, SubresourceRange};

use self::conversion::{
    convert_dimension, convert_image_usage, convert_texture_format, copy_origin, image_size,
    physical_extent,
};
use super::{
    ClearValue, DeviceCapabilities, DeviceContext, DeviceImage, DeviceQueue, FenceValue, GpuImage,
    GpuStaging, ImageCopyRegion, ImageRequest, StagingKind, StagingRegion, StorageView,
};

/// Time a blocking wait may take before it is reported.
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resources dropped once a progress value completed.
#[allow(dead_code)]
enum Retired {
    Image(DeviceImage),
    Staging(StagingRegion),
}

#[derive(Default)]
struct WgpuState {
    next_id: u64,
    submitted: u64,
    submissions: VecDeque<(u64, wgpu::SubmissionIndex)>,
    retired: Vec<(u64, Retired)>,
}

/// wgpu-based texture device.
pub struct WgpuDevice {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    completed: Arc<AtomicU64>,
    state: Mutex<WgpuState>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuDevice {
    /// Create a device on the default adapter.
    pub fn new() -> TextureResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| TextureError::DeviceCreationFailed(format!("No compatible GPU adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let wanted = wgpu::Features::TEXTURE_COMPRESSION_BC
            | wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
            | wgpu::Features::DEPTH32FLOAT_STENCIL8;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("RedLilium Texture Device"),
            required_features: adapter.features() & wanted,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| TextureError::DeviceCreationFailed(format!("Device creation failed: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            completed: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(WgpuState::default()),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) -> FenceValue {
        let mut state = self.state.lock();
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        state.submitted += 1;
        let progress = state.submitted;
        state.submissions.push_back((progress, index));
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(progress, Ordering::AcqRel);
        });
        FenceValue(progress)
    }

    fn current(&self) -> FenceValue {
        FenceValue(self.state.lock().submitted)
    }

    /// Drop retired resources and submission indices that completed.
    fn collect(&self) {
        let completed = self.completed.load(Ordering::Acquire);
        let mut state = self.state.lock();
        while state.submissions.front().is_some_and(|(progress, _)| *progress <= completed) {
            state.submissions.pop_front();
        }
        state.retired.retain(|(after, _)| *after > completed);
    }

    fn retire(&self, after: FenceValue, resource: Retired) {
        if after.0 <= self.completed.load(Ordering::Acquire) {
            return;
        }
        self.state.lock().retired.push((after.0, resource));
    }

    fn texture<'a>(&self, image: &'a DeviceImage) -> Option<&'a wgpu::Texture> {
        match image.gpu() {
            GpuImage::Wgpu(texture) => Some(texture),
            GpuImage::Dummy => {
                log::error!("WgpuDevice: image {} was not created by this device", image.id());
                None
            }
        }
    }

    fn buffer_copy<'a>(
        buffer: &'a wgpu::Buffer,
        texture: &'a wgpu::Texture,
        desc: &ImageDescriptor,
        copy: &BufferImageCopy,
    ) -> (wgpu::TexelCopyBufferInfo<'a>, wgpu::TexelCopyTextureInfo<'a>, wgpu::Extent3d) {
        let footprint = &copy.footprint;
        (
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: footprint.offset,
                    bytes_per_row: Some(footprint.row_pitch),
                    rows_per_image: Some(footprint.rows * footprint.format.block_extent().1),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: copy.mip,
                origin: copy_origin(desc.dimension, copy.image_offset, copy.layer),
                aspect: wgpu::TextureAspect::All,
            },
            physical_extent(footprint.format, footprint.extent, 1),
        )
    }

    /// Fill `range` with zeros by copying from a zero initialized buffer.
    fn zero_fill(&self, image: &DeviceImage, range: SubresourceRange, label: &str) -> FenceValue {
        let Some(texture) = self.texture(image) else {
            return self.current();
        };
        let desc = image.descriptor();
        let layout = StagingLayout::plan(desc, range);
        if layout.copies.is_empty() {
            return self.current();
        }
        let zeros = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: align_up(layout.size.max(4), 4),
            usage: wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let mut encoder = self.encoder(label);
        for copy in &layout.copies {
            let (src, dst, extent) = Self::buffer_copy(&zeros, texture, desc, copy);
            encoder.copy_buffer_to_texture(src, dst, extent);
        }
        self.submit(encoder)
    }
}

impl DeviceContext for WgpuDevice {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }

    fn create_image(&self, request: &ImageRequest<'_>) -> Option<DeviceImage> {
        let desc = request.descriptor;
        let Some(format) = convert_texture_format(desc.format, desc.srgb_read) else {
            log::warn!("WgpuDevice: {} has no wgpu equivalent for <{}>", desc.format, request.name);
            return None;
        };
        if !self.device.features().contains(format.required_features()) {
            log::warn!("WgpuDevice: {:?} needs features {:?}", format, format.required_features());
            return None;
        }
        let usage = convert_image_usage(desc.usage);
        let allowed = self.adapter.get_texture_format_features(format).allowed_usages;
        if !allowed.contains(usage) {
            log::warn!(
                "WgpuDevice: {:?} does not allow {:?} for <{}>",
                format,
                usage.difference(allowed),
                request.name
            );
            return None;
        }
        if request.alias_of.is_some() {
            log::debug!("WgpuDevice: <{}> aliasing emulated with a separate allocation", request.name);
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(request.name),
            size: image_size(desc),
            mip_level_count: desc.mip_levels,
            sample_count: desc.sample_count,
            dimension: convert_dimension(desc.dimension),
            format,
            usage,
            view_formats: &[],
        });
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            state.next_id
        };
        log::trace!("WgpuDevice: created image {} <{}>", id, request.name);
        Some(DeviceImage::new(
            id,
            desc.clone(),
            request.alias_of.is_some(),
            GpuImage::Wgpu(texture),
        ))
    }

    fn destroy_image(&self, image: DeviceImage, after: FenceValue) {
        log::trace!("WgpuDevice: destroying image {} after {}", image.id(), after);
        self.retire(after, Retired::Image(image));
    }

    fn allocate_staging(&self, size: u64, kind: StagingKind) -> Option<StagingRegion> {
        let buffer_size = align_up(size.max(4), 4);
        let upload = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Staging Upload"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let readback = (kind == StagingKind::PersistentBidirectional).then(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Texture Staging Readback"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            state.next_id
        };
        Some(StagingRegion::new(id, kind, size, GpuStaging::Wgpu { upload, readback }))
    }

    fn free_staging(&self, region: StagingRegion, after: FenceValue) {
        self.retire(after, Retired::Staging(region));
    }

    fn flush_staging(&self, region: &StagingRegion, range: Range<u64>) {
        let GpuStaging::Wgpu { upload, .. } = region.gpu() else {
            return;
        };
        let start = range.start - range.start % 4;
        let end = align_up(range.end, 4).min(align_up(region.size(), 4));
        if start >= end || start >= region.size() {
            return;
        }
        let mut bytes = vec![0u8; (end - start) as usize];
        let available = (region.size().min(end) - start) as usize;
        bytes[..available].copy_from_slice(&region.as_slice()[start as usize..start as usize + available]);
        self.queue.write_buffer(upload, start, &bytes);
    }

    fn invalidate_staging(&self, region: &mut StagingRegion) {
        let GpuStaging::Wgpu {
            readback: Some(readback),
            ..
        } = region.gpu()
        else {
            return;
        };
        let readback = readback.clone();
        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        if let Ok(Ok(())) = rx.recv() {
            {
                let mapped = slice.get_mapped_range();
                let len = region.as_slice().len().min(mapped.len());
                region.as_mut_slice()[..len].copy_from_slice(&mapped[..len]);
            }
            readback.unmap();
        } else {
            log::error!("WgpuDevice: mapping staging {} failed", region.id());
        }
    }

    fn upload_to_image(
        &self,
        staging: &StagingRegion,
        image: &DeviceImage,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
        discard: bool,
    ) -> FenceValue {
        let (Some(texture), GpuStaging::Wgpu { upload, .. }) = (self.texture(image), staging.gpu()) else {
            return self.current();
        };
        if copies.is_empty() {
            return self.current();
        }
        let desc = image.descriptor();
        let mut encoder = self.encoder("Texture Upload");
        for copy in copies {
            let (src, dst, extent) = Self::buffer_copy(upload, texture, desc, copy);
            encoder.copy_buffer_to_texture(src, dst, extent);
        }
        log::trace!(
            "WgpuDevice: {} copies into image {} ({:?}, discard {})",
            copies.len(),
            image.id(),
            queue,
            discard
        );
        self.submit(encoder)
    }

    fn read_back_from_image(
        &self,
        image: &DeviceImage,
        staging: &StagingRegion,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
    ) -> FenceValue {
        let (
            Some(texture),
            GpuStaging::Wgpu {
                readback: Some(readback),
                ..
            },
        ) = (self.texture(image), staging.gpu())
        else {
            log::error!("WgpuDevice: read back of image {} needs persistent staging", image.id());
            return self.current();
        };
        let desc = image.descriptor();
        if desc.format.is_depth_stencil() {
            log::warn!("WgpuDevice: read back of {} images is not supported", desc.format);
            return self.current();
        }
        if copies.is_empty() {
            return self.current();
        }
        let mut encoder = self.encoder("Texture Read Back");
        for copy in copies {
            let (dst, src, extent) = Self::buffer_copy(readback, texture, desc, copy);
            encoder.copy_texture_to_buffer(src, dst, extent);
        }
        log::trace!("WgpuDevice: read back of image {} ({:?})", image.id(), queue);
        self.submit(encoder)
    }

    fn clear_color_image(&self, image: &DeviceImage, range: SubresourceRange, _value: ClearValue) -> FenceValue {
        self.zero_fill(image, range, "Texture Clear")
    }

    fn clear_depth_stencil_image(
        &self,
        image: &DeviceImage,
        range: SubresourceRange,
        depth: f32,
        stencil: u8,
    ) -> FenceValue {
        let Some(texture) = self.texture(image) else {
            return self.current();
        };
        let has_stencil = image.descriptor().format.has_stencil();
        let mut encoder = self.encoder("Depth Stencil Clear");
        for mip in range.mips() {
            for layer in range.layers() {
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Depth Stencil Clear"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(depth),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: has_stencil.then_some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(u32::from(stencil)),
                            store: wgpu::StoreOp::Store,
                        }),
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
            }
        }
        self.submit(encoder)
    }

    fn clear_storage_image(&self, image: &DeviceImage, view: StorageView, _value: ClearValue) -> FenceValue {
        let desc = image.descriptor();
        let (base_layer, layer_count) = match desc.dimension {
            ImageDimension::D2 => (view.first_layer, view.layer_count),
            ImageDimension::D3 => (0, 1),
        };
        let range = SubresourceRange {
            base_mip: view.mip,
            mip_count: 1,
            base_layer,
            layer_count,
        };
        self.zero_fill(image, range, "Storage Clear")
    }

    fn copy_image(&self, src: &DeviceImage, dst: &DeviceImage, region: Option<&ImageCopyRegion>) -> FenceValue {
        let (Some(src_texture), Some(dst_texture)) = (self.texture(src), self.texture(dst)) else {
            return self.current();
        };
        let src_desc = src.descriptor();
        let dst_desc = dst.descriptor();
        let mut encoder = self.encoder("Texture Copy");
        match region {
            Some(region) => encoder.copy_texture_to_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: src_texture,
                    mip_level: region.src_mip,
                    origin: copy_origin(src_desc.dimension, region.src_offset, region.src_layer),
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyTextureInfo {
                    texture: dst_texture,
                    mip_level: region.dst_mip,
                    origin: copy_origin(dst_desc.dimension, region.dst_offset, region.dst_layer),
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: region.extent.width,
                    height: region.extent.height,
                    depth_or_array_layers: region.extent.depth.max(1),
                },
            ),
            None => {
                for mip in 0..src_desc.mip_levels.min(dst_desc.mip_levels) {
                    encode_mip_copy(&mut encoder, src_texture, dst_texture, src_desc, mip, mip);
                }
            }
        }
        self.submit(encoder)
    }

    fn resolve_image(&self, src: &DeviceImage, dst: &DeviceImage) -> FenceValue {
        let (Some(src_texture), Some(dst_texture)) = (self.texture(src), self.texture(dst)) else {
            return self.current();
        };
        let src_view = src_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let dst_view = dst_texture.create_view(&wgpu::TextureViewDescriptor {
            mip_level_count: Some(1),
            ..Default::default()
        });
        let mut encoder = self.encoder("Texture Resolve");
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Texture Resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &src_view,
                    resolve_target: Some(&dst_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.submit(encoder)
    }

    fn transfer_mips(&self, src: &DeviceImage, dst: &DeviceImage, transfer: &MipRangeTransfer) -> FenceValue {
        let (Some(src_texture), Some(dst_texture)) = (self.texture(src), self.texture(dst)) else {
            return self.current();
        };
        if transfer.is_empty() {
            return self.current();
        }
        let mut encoder = self.encoder("Mip Transfer");
        for (src_mip, dst_mip) in transfer.pairs() {
            encode_mip_copy(&mut encoder, src_texture, dst_texture, src.descriptor(), src_mip, dst_mip);
        }
        self.submit(encoder)
    }

    fn current_progress(&self) -> FenceValue {
        self.current()
    }

    fn completed_progress(&self) -> FenceValue {
        let _ = self.device.poll(wgpu::PollType::Poll);
        self.collect();
        FenceValue(self.completed.load(Ordering::Acquire))
    }

    fn wait_for_progress(&self, progress: FenceValue) {
        if progress.0 <= self.completed.load(Ordering::Acquire) {
            return;
        }
        let index = self
            .state
            .lock()
            .submissions
            .iter()
            .find(|(value, _)| *value >= progress.0)
            .map(|(_, index)| index.clone());
        log::debug!("WgpuDevice: stalling on progress {}", progress);
        if let Err(e) = self.device.poll(wgpu::PollType::Wait {
            submission_index: index,
            timeout: Some(WAIT_TIMEOUT),
        }) {
            log::warn!("WgpuDevice: wait for progress {} failed: {}", progress, e);
        }
        self.completed.fetch_max(progress.0, Ordering::AcqRel);
        self.collect();
    }
}

/// Copy every layer of one mip between two images of the same format.
fn encode_mip_copy(
    encoder: &mut wgpu::CommandEncoder,
    src: &wgpu::Texture,
    dst: &wgpu::Texture,
    src_desc: &ImageDescriptor,
    src_mip: u32,
    dst_mip: u32,
) {
    let layers = match src_desc.dimension {
        ImageDimension::D2 => src_desc.array_layers,
        ImageDimension::D3 => 1,
    };
    encoder.copy_texture_to_texture(
        wgpu::TexelCopyTextureInfo {
            texture: src,
            mip_level: src_mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyTextureInfo {
            texture: dst,
            mip_level: dst_mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        physical_extent(src_desc.format, src_desc.mip_extent(src_mip), layers),
    );
}

static_assertions::assert_impl_all!(WgpuDevice: Send, Sync);
