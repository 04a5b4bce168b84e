//! Dummy device for testing and development.
//!
//! Images live in host memory, one tightly packed byte vector per subresource.
//! Submitted commands are queued with their progress value and execute when the
//! progress completes: immediately by default, or under test control after
//! [`DummyDevice::set_auto_complete`]`(false)`.
//!
//! Staging regions keep a separate device-side copy of their bytes, so a missing
//! flush or invalidate shows up as stale data just like on real hardware.
//! Clears always write zero bytes.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::{ImageDescriptor, ImageDimension};
use crate::layout::{BufferImageCopy, MipRangeTransfer, SubresourceRange, subresource_index};
use crate::types::TextureFormat;

use super::{
    ClearValue, DeviceCapabilities, DeviceContext, DeviceImage, DeviceQueue, FenceValue, GpuImage,
    GpuStaging, ImageCopyRegion, ImageRequest, StagingKind, StagingRegion, StorageView,
};

/// Observable record of a device call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    CreateImage {
        image: u64,
        name: String,
        aliased: bool,
    },
    DestroyImage {
        image: u64,
    },
    Upload {
        image: u64,
        subresources: Vec<u32>,
        offsets: Vec<u64>,
        queue: DeviceQueue,
        discard: bool,
    },
    ReadBack {
        image: u64,
        subresources: Vec<u32>,
        queue: DeviceQueue,
    },
    ClearColor {
        image: u64,
        range: SubresourceRange,
        value: ClearValue,
    },
    ClearDepthStencil {
        image: u64,
        range: SubresourceRange,
    },
    ClearStorage {
        image: u64,
        view: StorageView,
        value: ClearValue,
    },
    CopyImage {
        src: u64,
        dst: u64,
        region: Option<ImageCopyRegion>,
    },
    Resolve {
        src: u64,
        dst: u64,
    },
    TransferMips {
        src: u64,
        dst: u64,
        transfer: MipRangeTransfer,
    },
    Wait {
        progress: FenceValue,
    },
}

#[derive(Debug)]
struct DummyImage {
    descriptor: Arc<ImageDescriptor>,
    subresources: Vec<Vec<u8>>,
}

impl DummyImage {
    fn new(descriptor: ImageDescriptor) -> Self {
        let subresources = (0..descriptor.array_layers)
            .flat_map(|_| 0..descriptor.mip_levels)
            .map(|mip| vec![0; packed_size(&descriptor, mip)])
            .collect();
        Self {
            descriptor: Arc::new(descriptor),
            subresources,
        }
    }
}

fn packed_size(desc: &ImageDescriptor, mip: u32) -> usize {
    let extent = desc.mip_extent(mip);
    (desc.format.row_bytes(extent.width) * desc.format.blocks_high(extent.height) * extent.depth)
        as usize
}

#[derive(Debug)]
enum Pending {
    Upload {
        image: u64,
        staging: u64,
        copies: Vec<BufferImageCopy>,
    },
    ReadBack {
        image: u64,
        staging: u64,
        copies: Vec<BufferImageCopy>,
    },
    Zero {
        image: u64,
        subresources: Vec<u32>,
    },
    Copy {
        src: u64,
        dst: u64,
        region: Option<ImageCopyRegion>,
    },
    Transfer {
        src: u64,
        dst: u64,
        transfer: MipRangeTransfer,
    },
    DestroyImage(u64),
    FreeStaging(u64),
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    submitted: u64,
    completed: u64,
    auto_complete: bool,
    pending: Vec<(u64, Pending)>,
    images: HashMap<u64, DummyImage>,
    staging: HashMap<u64, Vec<u8>>,
    fail_images: u32,
    fail_staging: u32,
    images_created: u64,
    log: Vec<RecordedCommand>,
}

impl DummyState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn submit(&mut self, command: Pending) -> FenceValue {
        self.submitted += 1;
        let fence = self.submitted;
        self.pending.push((fence, command));
        if self.auto_complete {
            self.complete_until(fence);
        }
        FenceValue(fence)
    }

    fn defer(&mut self, after: FenceValue, command: Pending) {
        if after.0 <= self.completed {
            self.execute(command);
        } else {
            self.pending.push((after.0, command));
        }
    }

    fn complete_until(&mut self, progress: u64) {
        let progress = progress.min(self.submitted);
        let pending = std::mem::take(&mut self.pending);
        let (mut ready, rest): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|(fence, _)| *fence <= progress);
        self.pending = rest;
        ready.sort_by_key(|(fence, _)| *fence);
        for (_, command) in ready {
            self.execute(command);
        }
        self.completed = self.completed.max(progress);
    }

    fn execute(&mut self, command: Pending) {
        match command {
            Pending::Upload {
                image,
                staging,
                copies,
            } => self.execute_upload(image, staging, &copies),
            Pending::ReadBack {
                image,
                staging,
                copies,
            } => self.execute_read_back(image, staging, &copies),
            Pending::Zero {
                image,
                subresources,
            } => {
                if let Some(image) = self.images.get_mut(&image) {
                    for index in subresources {
                        if let Some(bytes) = image.subresources.get_mut(index as usize) {
                            bytes.fill(0);
                        }
                    }
                }
            }
            Pending::Copy { src, dst, region } => self.execute_copy(src, dst, region),
            Pending::Transfer { src, dst, transfer } => self.execute_transfer(src, dst, &transfer),
            Pending::DestroyImage(id) => {
                self.images.remove(&id);
            }
            Pending::FreeStaging(id) => {
                self.staging.remove(&id);
            }
        }
    }

    fn execute_upload(&mut self, image: u64, staging: u64, copies: &[BufferImageCopy]) {
        let (Some(image), Some(staging)) = (self.images.get_mut(&image), self.staging.get(&staging))
        else {
            log::error!("DummyDevice: upload references a destroyed image or staging region");
            return;
        };
        for copy in copies {
            let fp = copy.footprint;
            let row_bytes = fp.row_bytes as usize;
            let Some(dst) = image.subresources.get_mut(copy.subresource as usize) else {
                continue;
            };
            for z in 0..fp.extent.depth as u64 {
                for row in 0..fp.rows as u64 {
                    let src_at = (fp.offset + z * fp.slice_pitch() + row * fp.row_pitch as u64) as usize;
                    let dst_at = ((z * fp.rows as u64 + row) as usize) * row_bytes;
                    if let (Some(src), Some(dst)) = (
                        staging.get(src_at..src_at + row_bytes),
                        dst.get_mut(dst_at..dst_at + row_bytes),
                    ) {
                        dst.copy_from_slice(src);
                    }
                }
            }
        }
    }

    fn execute_read_back(&mut self, image: u64, staging: u64, copies: &[BufferImageCopy]) {
        let (Some(image), Some(staging)) = (self.images.get(&image), self.staging.get_mut(&staging))
        else {
            log::error!("DummyDevice: read back references a destroyed image or staging region");
            return;
        };
        for copy in copies {
            let fp = copy.footprint;
            let row_bytes = fp.row_bytes as usize;
            let Some(src) = image.subresources.get(copy.subresource as usize) else {
                continue;
            };
            for z in 0..fp.extent.depth as u64 {
                for row in 0..fp.rows as u64 {
                    let dst_at = (fp.offset + z * fp.slice_pitch() + row * fp.row_pitch as u64) as usize;
                    let src_at = ((z * fp.rows as u64 + row) as usize) * row_bytes;
                    if let (Some(src), Some(dst)) = (
                        src.get(src_at..src_at + row_bytes),
                        staging.get_mut(dst_at..dst_at + row_bytes),
                    ) {
                        dst.copy_from_slice(src);
                    }
                }
            }
        }
    }

    fn subresource(&self, image: u64, index: u32) -> Option<(Arc<ImageDescriptor>, Vec<u8>)> {
        let image = self.images.get(&image)?;
        let bytes = image.subresources.get(index as usize)?.clone();
        Some((image.descriptor.clone(), bytes))
    }

    fn execute_copy(&mut self, src: u64, dst: u64, region: Option<ImageCopyRegion>) {
        let Some(src_image) = self.images.get(&src) else {
            return;
        };
        let src_desc = src_image.descriptor.clone();
        match region {
            None => {
                let contents = src_image.subresources.clone();
                if let Some(dst_image) = self.images.get_mut(&dst) {
                    for (dst_bytes, src_bytes) in dst_image.subresources.iter_mut().zip(contents) {
                        if dst_bytes.len() == src_bytes.len() {
                            *dst_bytes = src_bytes;
                        }
                    }
                }
            }
            Some(region) => {
                let src_index = subresource_index(region.src_mip, region.src_layer, src_desc.mip_levels);
                let Some((_, src_bytes)) = self.subresource(src, src_index) else {
                    return;
                };
                let Some(dst_image) = self.images.get_mut(&dst) else {
                    return;
                };
                let dst_desc = dst_image.descriptor.clone();
                let dst_index = subresource_index(region.dst_mip, region.dst_layer, dst_desc.mip_levels);
                let Some(dst_bytes) = dst_image.subresources.get_mut(dst_index as usize) else {
                    return;
                };
                copy_region(&src_desc, &src_bytes, &dst_desc, dst_bytes, &region);
            }
        }
    }

    fn execute_transfer(&mut self, src: u64, dst: u64, transfer: &MipRangeTransfer) {
        let (Some(src_image), Some(dst_image)) = (self.images.get(&src), self.images.get(&dst)) else {
            return;
        };
        let src_desc = src_image.descriptor.clone();
        let dst_desc = dst_image.descriptor.clone();
        let layers = src_desc.array_layers.min(dst_desc.array_layers);
        for (src_mip, dst_mip) in transfer.pairs() {
            if src_desc.mip_extent(src_mip) != dst_desc.mip_extent(dst_mip) {
                log::error!(
                    "DummyDevice: mip transfer {} -> {} with different extents",
                    src_mip,
                    dst_mip
                );
                continue;
            }
            for layer in 0..layers {
                let src_index = subresource_index(src_mip, layer, src_desc.mip_levels);
                let dst_index = subresource_index(dst_mip, layer, dst_desc.mip_levels);
                let Some((_, bytes)) = self.subresource(src, src_index) else {
                    continue;
                };
                if let Some(dst_bytes) = self
                    .images
                    .get_mut(&dst)
                    .and_then(|image| image.subresources.get_mut(dst_index as usize))
                {
                    *dst_bytes = bytes;
                }
            }
        }
    }
}

fn copy_region(
    src_desc: &ImageDescriptor,
    src: &[u8],
    dst_desc: &ImageDescriptor,
    dst: &mut [u8],
    region: &ImageCopyRegion,
) {
    let format: TextureFormat = src_desc.format;
    let bpb = format.bytes_per_block() as usize;
    let (bw, bh) = format.block_extent();
    let src_extent = src_desc.mip_extent(region.src_mip);
    let dst_extent = dst_desc.mip_extent(region.dst_mip);
    let src_pitch = format.row_bytes(src_extent.width) as usize;
    let dst_pitch = dst_desc.format.row_bytes(dst_extent.width) as usize;
    let src_rows = format.blocks_high(src_extent.height) as usize;
    let dst_rows = dst_desc.format.blocks_high(dst_extent.height) as usize;

    let blocks_wide = format.blocks_wide(region.extent.width) as usize;
    let blocks_high = format.blocks_high(region.extent.height) as usize;
    let row_len = blocks_wide * bpb;
    for z in 0..region.extent.depth as usize {
        for row in 0..blocks_high {
            let src_row = (region.src_offset.y / bh) as usize + row;
            let dst_row = (region.dst_offset.y / bh) as usize + row;
            let src_at = ((region.src_offset.z as usize + z) * src_rows + src_row) * src_pitch
                + (region.src_offset.x / bw) as usize * bpb;
            let dst_at = ((region.dst_offset.z as usize + z) * dst_rows + dst_row) * dst_pitch
                + (region.dst_offset.x / bw) as usize * bpb;
            if let (Some(from), Some(to)) = (
                src.get(src_at..src_at + row_len),
                dst.get_mut(dst_at..dst_at + row_len),
            ) {
                to.copy_from_slice(from);
            }
        }
    }
}

/// In-memory device.
#[derive(Debug)]
pub struct DummyDevice {
    capabilities: DeviceCapabilities,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a device that completes work as soon as it is submitted.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a device reporting the given capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(DummyState {
                auto_complete: true,
                ..Default::default()
            }),
        }
    }

    /// Toggle immediate completion. While off, work only completes through
    /// [`advance_to`](Self::advance_to), [`complete_all`](Self::complete_all) or a wait.
    pub fn set_auto_complete(&self, auto_complete: bool) {
        let mut state = self.state.lock();
        state.auto_complete = auto_complete;
        if auto_complete {
            let submitted = state.submitted;
            state.complete_until(submitted);
        }
    }

    /// Complete work up to `progress`.
    pub fn advance_to(&self, progress: FenceValue) {
        self.state.lock().complete_until(progress.0);
    }

    /// Complete all submitted work.
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        let submitted = state.submitted;
        state.complete_until(submitted);
    }

    /// Make the next `count` image allocations fail.
    pub fn fail_next_images(&self, count: u32) {
        self.state.lock().fail_images = count;
    }

    /// Make the next `count` staging allocations fail.
    pub fn fail_next_staging(&self, count: u32) {
        self.state.lock().fail_staging = count;
    }

    /// Images currently alive.
    pub fn live_images(&self) -> usize {
        self.state.lock().images.len()
    }

    /// Staging regions currently alive.
    pub fn live_staging(&self) -> usize {
        self.state.lock().staging.len()
    }

    /// Images created since the device was made.
    pub fn images_created(&self) -> u64 {
        self.state.lock().images_created
    }

    /// Packed bytes of one subresource.
    pub fn image_contents(&self, image: u64, subresource: u32) -> Option<Vec<u8>> {
        self.state.lock().subresource(image, subresource).map(|(_, bytes)| bytes)
    }

    /// Recorded device calls.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().log.clone()
    }

    /// Forget recorded device calls.
    pub fn clear_commands(&self) {
        self.state.lock().log.clear();
    }

    fn check_descriptor(descriptor: &ImageDescriptor) -> bool {
        if descriptor.dimension == ImageDimension::D3
            && (descriptor.format.is_depth_stencil() || descriptor.sample_count > 1)
        {
            log::error!(
                "DummyDevice: {} volumes with {} samples are not supported",
                descriptor.format,
                descriptor.sample_count
            );
            return false;
        }
        true
    }

    fn zero(&self, image: &DeviceImage, subresources: Vec<u32>, command: RecordedCommand) -> FenceValue {
        let mut state = self.state.lock();
        state.log.push(command);
        state.submit(Pending::Zero {
            image: image.id(),
            subresources,
        })
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn range_subresources(desc: &ImageDescriptor, range: SubresourceRange) -> Vec<u32> {
    range
        .layers()
        .flat_map(|layer| range.mips().map(move |mip| subresource_index(mip, layer, desc.mip_levels)))
        .collect()
}

fn assert_placement(copies: &[BufferImageCopy]) {
    for copy in copies {
        assert!(
            copy.footprint.is_aligned(),
            "misaligned staging copy: offset {} row pitch {}",
            copy.footprint.offset,
            copy.footprint.row_pitch
        );
    }
}

impl DeviceContext for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_image(&self, request: &ImageRequest<'_>) -> Option<DeviceImage> {
        let mut state = self.state.lock();
        if state.fail_images > 0 {
            state.fail_images -= 1;
            log::trace!("DummyDevice: failing image allocation for <{}>", request.name);
            return None;
        }
        if !Self::check_descriptor(request.descriptor) {
            return None;
        }
        let id = state.next_id();
        let aliased = request.alias_of.is_some();
        log::trace!(
            "DummyDevice: creating image {} <{}> ({}x{}x{}, {} mips, {} layers)",
            id,
            request.name,
            request.descriptor.extent.width,
            request.descriptor.extent.height,
            request.descriptor.extent.depth,
            request.descriptor.mip_levels,
            request.descriptor.array_layers
        );
        state
            .images
            .insert(id, DummyImage::new(request.descriptor.clone()));
        state.images_created += 1;
        state.log.push(RecordedCommand::CreateImage {
            image: id,
            name: request.name.to_string(),
            aliased,
        });
        Some(DeviceImage::new(
            id,
            request.descriptor.clone(),
            aliased,
            GpuImage::Dummy,
        ))
    }

    fn destroy_image(&self, image: DeviceImage, after: FenceValue) {
        let mut state = self.state.lock();
        log::trace!("DummyDevice: destroying image {} after {}", image.id(), after);
        state.log.push(RecordedCommand::DestroyImage { image: image.id() });
        state.defer(after, Pending::DestroyImage(image.id()));
    }

    fn allocate_staging(&self, size: u64, kind: StagingKind) -> Option<StagingRegion> {
        let mut state = self.state.lock();
        if state.fail_staging > 0 {
            state.fail_staging -= 1;
            log::trace!("DummyDevice: failing staging allocation of {} bytes", size);
            return None;
        }
        let id = state.next_id();
        state.staging.insert(id, vec![0; size as usize]);
        Some(StagingRegion::new(id, kind, size, GpuStaging::Dummy))
    }

    fn free_staging(&self, region: StagingRegion, after: FenceValue) {
        self.state
            .lock()
            .defer(after, Pending::FreeStaging(region.id()));
    }

    fn flush_staging(&self, region: &StagingRegion, range: Range<u64>) {
        let mut state = self.state.lock();
        if let Some(device_bytes) = state.staging.get_mut(&region.id()) {
            let range = range.start as usize..(range.end as usize).min(device_bytes.len());
            if let Some(host) = region.as_slice().get(range.clone()) {
                device_bytes[range].copy_from_slice(host);
            }
        }
    }

    fn invalidate_staging(&self, region: &mut StagingRegion) {
        let state = self.state.lock();
        if let Some(device_bytes) = state.staging.get(&region.id()) {
            let len = device_bytes.len().min(region.as_slice().len());
            region.as_mut_slice()[..len].copy_from_slice(&device_bytes[..len]);
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
        assert_placement(copies);
        let mut state = self.state.lock();
        state.log.push(RecordedCommand::Upload {
            image: image.id(),
            subresources: copies.iter().map(|c| c.subresource).collect(),
            offsets: copies.iter().map(|c| c.footprint.offset).collect(),
            queue,
            discard,
        });
        state.submit(Pending::Upload {
            image: image.id(),
            staging: staging.id(),
            copies: copies.to_vec(),
        })
    }

    fn read_back_from_image(
        &self,
        image: &DeviceImage,
        staging: &StagingRegion,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
    ) -> FenceValue {
        assert_placement(copies);
        let mut state = self.state.lock();
        state.log.push(RecordedCommand::ReadBack {
            image: image.id(),
            subresources: copies.iter().map(|c| c.subresource).collect(),
            queue,
        });
        state.submit(Pending::ReadBack {
            image: image.id(),
            staging: staging.id(),
            copies: copies.to_vec(),
        })
    }

    fn clear_color_image(
        &self,
        image: &DeviceImage,
        range: SubresourceRange,
        value: ClearValue,
    ) -> FenceValue {
        let subresources = range_subresources(image.descriptor(), range);
        self.zero(
            image,
            subresources,
            RecordedCommand::ClearColor {
                image: image.id(),
                range,
                value,
            },
        )
    }

    fn clear_depth_stencil_image(
        &self,
        image: &DeviceImage,
        range: SubresourceRange,
        _depth: f32,
        _stencil: u8,
    ) -> FenceValue {
        let subresources = range_subresources(image.descriptor(), range);
        self.zero(
            image,
            subresources,
            RecordedCommand::ClearDepthStencil {
                image: image.id(),
                range,
            },
        )
    }

    fn clear_storage_image(
        &self,
        image: &DeviceImage,
        view: StorageView,
        value: ClearValue,
    ) -> FenceValue {
        let desc = image.descriptor();
        let layers = if desc.dimension == ImageDimension::D3 {
            0..1
        } else {
            view.first_layer..view.first_layer + view.layer_count
        };
        let subresources = layers
            .map(|layer| subresource_index(view.mip, layer, desc.mip_levels))
            .collect();
        self.zero(
            image,
            subresources,
            RecordedCommand::ClearStorage {
                image: image.id(),
                view,
                value,
            },
        )
    }

    fn copy_image(
        &self,
        src: &DeviceImage,
        dst: &DeviceImage,
        region: Option<&ImageCopyRegion>,
    ) -> FenceValue {
        let mut state = self.state.lock();
        state.log.push(RecordedCommand::CopyImage {
            src: src.id(),
            dst: dst.id(),
            region: region.copied(),
        });
        state.submit(Pending::Copy {
            src: src.id(),
            dst: dst.id(),
            region: region.copied(),
        })
    }

    fn resolve_image(&self, src: &DeviceImage, dst: &DeviceImage) -> FenceValue {
        let mut state = self.state.lock();
        state.log.push(RecordedCommand::Resolve {
            src: src.id(),
            dst: dst.id(),
        });
        state.submit(Pending::Copy {
            src: src.id(),
            dst: dst.id(),
            region: None,
        })
    }

    fn transfer_mips(
        &self,
        src: &DeviceImage,
        dst: &DeviceImage,
        transfer: &MipRangeTransfer,
    ) -> FenceValue {
        let mut state = self.state.lock();
        state.log.push(RecordedCommand::TransferMips {
            src: src.id(),
            dst: dst.id(),
            transfer: transfer.clone(),
        });
        state.submit(Pending::Transfer {
            src: src.id(),
            dst: dst.id(),
            transfer: transfer.clone(),
        })
    }

    fn current_progress(&self) -> FenceValue {
        FenceValue(self.state.lock().submitted)
    }

    fn completed_progress(&self) -> FenceValue {
        FenceValue(self.state.lock().completed)
    }

    fn wait_for_progress(&self, progress: FenceValue) {
        let mut state = self.state.lock();
        if progress.0 > state.completed {
            log::debug!("DummyDevice: stalling on progress {}", progress);
            state.log.push(RecordedCommand::Wait { progress });
            state.complete_until(progress.0);
        }
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ImageDescriptorBuilder;
    use crate::layout::StagingLayout;
    use crate::resolve::resolve_parameters;
    use crate::types::CreateFlags;

    fn descriptor(width: u32, height: u32) -> ImageDescriptor {
        let resolved = resolve_parameters(width, height, CreateFlags::empty(), 1);
        ImageDescriptorBuilder::new_2d(width, height, &resolved)
            .build(&DeviceCapabilities::default())
            .unwrap()
    }

    fn create(device: &DummyDevice, desc: &ImageDescriptor) -> DeviceImage {
        device
            .create_image(&ImageRequest {
                descriptor: desc,
                alias_of: None,
                name: "test",
            })
            .unwrap()
    }

    #[test]
    fn test_upload_then_read_back() {
        let device = DummyDevice::new();
        let desc = descriptor(4, 2);
        let image = create(&device, &desc);
        let layout = StagingLayout::plan(&desc, SubresourceRange::whole(&desc));

        let mut staging = device
            .allocate_staging(layout.size, StagingKind::PersistentBidirectional)
            .unwrap();
        let pitch = layout.copies[0].footprint.row_pitch as usize;
        staging.as_mut_slice()[..16].fill(7);
        staging.as_mut_slice()[pitch..pitch + 16].fill(9);
        device.flush_staging(&staging, 0..layout.size);
        device.upload_to_image(&staging, &image, &layout.copies, DeviceQueue::Upload, false);

        let contents = device.image_contents(image.id(), 0).unwrap();
        assert_eq!(&contents[..16], &[7; 16]);
        assert_eq!(&contents[16..], &[9; 16]);

        staging.as_mut_slice().fill(0);
        device.flush_staging(&staging, 0..layout.size);
        device.read_back_from_image(&image, &staging, &layout.copies, DeviceQueue::ReadBack);
        assert_eq!(staging.as_slice()[0], 0);
        device.invalidate_staging(&mut staging);
        assert_eq!(&staging.as_slice()[pitch..pitch + 16], &[9; 16]);
    }

    #[test]
    fn test_unflushed_writes_are_not_uploaded() {
        let device = DummyDevice::new();
        let desc = descriptor(4, 1);
        let image = create(&device, &desc);
        let layout = StagingLayout::plan(&desc, SubresourceRange::whole(&desc));
        let mut staging = device
            .allocate_staging(layout.size, StagingKind::TemporaryUpload)
            .unwrap();
        staging.as_mut_slice().fill(1);
        device.upload_to_image(&staging, &image, &layout.copies, DeviceQueue::Upload, true);
        assert_eq!(device.image_contents(image.id(), 0).unwrap(), vec![0; 16]);
    }

    #[test]
    fn test_manual_progress() {
        let device = DummyDevice::new();
        device.set_auto_complete(false);
        let desc = descriptor(4, 4);
        let image = create(&device, &desc);
        let fence = device.clear_color_image(
            &image,
            SubresourceRange::whole(&desc),
            ClearValue::Uint([0; 4]),
        );
        assert_eq!(device.current_progress(), fence);
        assert!(device.completed_progress() < fence);

        device.destroy_image(image, fence);
        assert_eq!(device.live_images(), 1);
        device.wait_for_progress(fence);
        assert_eq!(device.completed_progress(), fence);
        assert_eq!(device.live_images(), 0);
        assert!(device.commands().contains(&RecordedCommand::Wait { progress: fence }));
    }

    #[test]
    fn test_failure_injection() {
        let device = DummyDevice::new();
        device.fail_next_images(1);
        let desc = descriptor(4, 4);
        assert!(device
            .create_image(&ImageRequest {
                descriptor: &desc,
                alias_of: None,
                name: "fail",
            })
            .is_none());
        assert!(device
            .create_image(&ImageRequest {
                descriptor: &desc,
                alias_of: None,
                name: "ok",
            })
            .is_some());

        device.fail_next_staging(1);
        assert!(device
            .allocate_staging(64, StagingKind::TemporaryUpload)
            .is_none());
    }

    #[test]
    #[should_panic(expected = "misaligned staging copy")]
    fn test_misaligned_copy_is_fatal() {
        let device = DummyDevice::new();
        let desc = descriptor(4, 4);
        let image = create(&device, &desc);
        let mut layout = StagingLayout::plan(&desc, SubresourceRange::whole(&desc));
        layout.copies[0].footprint.offset = 100;
        let staging = device
            .allocate_staging(4096, StagingKind::TemporaryUpload)
            .unwrap();
        device.upload_to_image(&staging, &image, &layout.copies, DeviceQueue::Upload, false);
    }
}
