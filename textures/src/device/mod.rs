//! Device abstraction layer.
//!
//! The texture system never talks to a GPU API directly. Image allocation,
//! staging memory and command submission go through the [`DeviceContext`] trait,
//! which reports completion through monotonically increasing [`FenceValue`]s.
//!
//! # Available Backends
//!
//! - dummy: in-memory device, always available
//! - `wgpu-backend`: cross-platform backend using wgpu

pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_impl;

use std::ops::Range;
use std::sync::Arc;

use crate::descriptor::ImageDescriptor;
use crate::layout::{BufferImageCopy, MipRangeTransfer, SubresourceRange};
use crate::types::{Extent3d, Offset3d, TextureFormat};

pub use dummy::{DummyDevice, RecordedCommand};

/// Position on the device timeline. Larger values complete later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(pub u64);

impl FenceValue {
    /// Already completed before any submission.
    pub const ZERO: Self = Self(0);
}

impl std::fmt::Display for FenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue a command is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceQueue {
    Graphics,
    /// Dedicated upload queue; does not serialize with rendering.
    Upload,
    /// Dedicated read back queue.
    ReadBack,
}

/// Optional device features that change control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// A fast on-chip memory pool exists.
    pub fast_memory_pool: bool,
    /// Images can use linear layout and be mapped directly.
    pub linear_layout: bool,
}

/// Kind of staging memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingKind {
    /// Lives as long as the texture; used for uploads and read backs.
    PersistentBidirectional,
    /// Short lived upload source.
    TemporaryUpload,
}

/// Zero or typed clear value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Float([f32; 4]),
    Uint([u32; 4]),
}

impl ClearValue {
    /// Zero of the type matching `format`: float zero for float formats,
    /// integer zero for integer and normalized formats.
    pub fn zero_for(format: TextureFormat) -> Self {
        if format.is_float() {
            Self::Float([0.0; 4])
        } else {
            Self::Uint([0; 4])
        }
    }
}

/// One-mip view used for storage clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageView {
    pub mip: u32,
    pub first_layer: u32,
    /// Array layers, or depth slices of a volume mip.
    pub layer_count: u32,
}

/// Region of one subresource copied into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopyRegion {
    pub src_mip: u32,
    pub src_layer: u32,
    pub src_offset: Offset3d,
    pub dst_mip: u32,
    pub dst_layer: u32,
    pub dst_offset: Offset3d,
    pub extent: Extent3d,
}

/// Backend specific image object.
#[allow(clippy::large_enum_variant)]
pub enum GpuImage {
    /// Dummy backend, content lives in the device state.
    Dummy,
    /// wgpu backend texture.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::Texture),
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuImage::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(texture) => f.debug_tuple("GpuImage::Wgpu").field(texture).finish(),
        }
    }
}

/// A device image. Move-only: exactly one owner destroys it.
#[derive(Debug)]
pub struct DeviceImage {
    id: u64,
    descriptor: Arc<ImageDescriptor>,
    aliased: bool,
    gpu: GpuImage,
}

impl DeviceImage {
    /// Wrap a backend image.
    pub fn new(id: u64, descriptor: ImageDescriptor, aliased: bool, gpu: GpuImage) -> Self {
        Self {
            id,
            descriptor: Arc::new(descriptor),
            aliased,
            gpu,
        }
    }

    /// Device unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The descriptor the image was created from.
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    /// Returns true if the image shares memory with another image.
    pub fn is_aliased(&self) -> bool {
        self.aliased
    }

    /// Backend object.
    pub fn gpu(&self) -> &GpuImage {
        &self.gpu
    }
}

/// Backend specific staging buffers.
pub enum GpuStaging {
    Dummy,
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        /// Source of uploads, filled on flush.
        upload: wgpu::Buffer,
        /// Destination of read backs (persistent regions only).
        readback: Option<wgpu::Buffer>,
    },
}

impl std::fmt::Debug for GpuStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuStaging::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { upload, .. } => f.debug_tuple("GpuStaging::Wgpu").field(upload).finish(),
        }
    }
}

/// Host-visible memory shared with the device.
///
/// CPU writes become visible to the device after [`DeviceContext::flush_staging`];
/// device writes become visible to the CPU after [`DeviceContext::invalidate_staging`].
#[derive(Debug)]
pub struct StagingRegion {
    id: u64,
    kind: StagingKind,
    data: Vec<u8>,
    gpu: GpuStaging,
}

impl StagingRegion {
    /// Wrap backend staging memory of `size` zeroed bytes.
    pub fn new(id: u64, kind: StagingKind, size: u64, gpu: GpuStaging) -> Self {
        Self {
            id,
            kind,
            data: vec![0; size as usize],
            gpu,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> StagingKind {
        self.kind
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// CPU view of the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable CPU view of the bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Backend object.
    pub fn gpu(&self) -> &GpuStaging {
        &self.gpu
    }
}

/// Request for a new device image.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub descriptor: &'a ImageDescriptor,
    /// Place the image in the memory of this image.
    pub alias_of: Option<&'a DeviceImage>,
    pub name: &'a str,
}

/// Device the texture system submits work to.
///
/// Commands execute asynchronously; each returns the progress value that is
/// reached once it completed.
pub trait DeviceContext: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Allocate an image. `None` means out of memory or unsupported.
    fn create_image(&self, request: &ImageRequest<'_>) -> Option<DeviceImage>;

    /// Destroy an image once `after` completed.
    fn destroy_image(&self, image: DeviceImage, after: FenceValue);

    /// Allocate zeroed staging memory. `None` means out of memory.
    fn allocate_staging(&self, size: u64, kind: StagingKind) -> Option<StagingRegion>;

    /// Free staging memory once `after` completed.
    fn free_staging(&self, region: StagingRegion, after: FenceValue);

    /// Make CPU writes in `range` visible to the device.
    fn flush_staging(&self, region: &StagingRegion, range: Range<u64>);

    /// Make completed device writes visible to the CPU.
    fn invalidate_staging(&self, region: &mut StagingRegion);

    /// Copy staging bytes into image subresources.
    ///
    /// A `discard` upload overwrites whole subresources and may be scheduled on
    /// the upload queue without ordering against the graphics queue.
    fn upload_to_image(
        &self,
        staging: &StagingRegion,
        image: &DeviceImage,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
        discard: bool,
    ) -> FenceValue;

    /// Copy image subresources into staging bytes.
    fn read_back_from_image(
        &self,
        image: &DeviceImage,
        staging: &StagingRegion,
        copies: &[BufferImageCopy],
        queue: DeviceQueue,
    ) -> FenceValue;

    fn clear_color_image(
        &self,
        image: &DeviceImage,
        range: SubresourceRange,
        value: ClearValue,
    ) -> FenceValue;

    fn clear_depth_stencil_image(
        &self,
        image: &DeviceImage,
        range: SubresourceRange,
        depth: f32,
        stencil: u8,
    ) -> FenceValue;

    /// Clear one mip through an unordered access view.
    fn clear_storage_image(
        &self,
        image: &DeviceImage,
        view: StorageView,
        value: ClearValue,
    ) -> FenceValue;

    /// Copy all subresources, or a single region.
    fn copy_image(
        &self,
        src: &DeviceImage,
        dst: &DeviceImage,
        region: Option<&ImageCopyRegion>,
    ) -> FenceValue;

    /// Resolve a multisampled image into a single sampled one.
    fn resolve_image(&self, src: &DeviceImage, dst: &DeviceImage) -> FenceValue;

    /// Copy a mip range between two images of different mip counts.
    fn transfer_mips(
        &self,
        src: &DeviceImage,
        dst: &DeviceImage,
        transfer: &MipRangeTransfer,
    ) -> FenceValue;

    /// Latest submitted progress.
    fn current_progress(&self) -> FenceValue;

    /// Latest completed progress.
    fn completed_progress(&self) -> FenceValue;

    /// Block until `progress` completed.
    fn wait_for_progress(&self, progress: FenceValue);

    /// Returns true for images owned by a swapchain; read backs of those go
    /// through the graphics queue.
    fn is_swapchain_image(&self, _image: &DeviceImage) -> bool {
        false
    }
}

static_assertions::assert_impl_all!(DeviceImage: Send, Sync);
static_assertions::assert_impl_all!(StagingRegion: Send, Sync);

/// Create the best available device.
///
/// Tries the wgpu backend first when enabled and falls back to the dummy device.
pub fn create_device() -> Arc<dyn DeviceContext> {
    #[cfg(feature = "wgpu-backend")]
    {
        match wgpu_impl::WgpuDevice::new() {
            Ok(device) => {
                log::info!("Using wgpu texture device");
                return Arc::new(device);
            }
            Err(e) => {
                log::warn!("Failed to create wgpu texture device: {}", e);
            }
        }
    }

    log::info!("Using dummy texture device");
    Arc::new(DummyDevice::new())
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_value_for_format() {
        assert_eq!(
            ClearValue::zero_for(TextureFormat::R32F),
            ClearValue::Float([0.0; 4])
        );
        assert_eq!(
            ClearValue::zero_for(TextureFormat::A8R8G8B8),
            ClearValue::Uint([0; 4])
        );
        assert_eq!(ClearValue::zero_for(TextureFormat::R32Ui), ClearValue::Uint([0; 4]));
    }

    #[test]
    fn test_fence_ordering() {
        assert!(FenceValue(3) > FenceValue(2));
        assert_eq!(FenceValue::default(), FenceValue::ZERO);
    }

    #[test]
    fn test_create_device_falls_back() {
        let device = create_device();
        assert!(!device.name().is_empty());
    }
}
