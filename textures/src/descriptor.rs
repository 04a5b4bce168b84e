//! Device image descriptors.

use bitflags::bitflags;

use crate::device::DeviceCapabilities;
use crate::error::{TextureError, TextureResult, VariableRateViolation};
use crate::resolve::ResolvedParameters;
use crate::types::{CreateFlags, Extent3d, TextureFormat};

/// Image dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    /// 2D image, possibly layered (arrays and cube maps).
    D2,
    /// Volume image.
    D3,
}

/// Memory heap class an image is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryClass {
    /// Regular device-local memory.
    DeviceResident,
    /// Host-resident memory readable and writable by the CPU.
    HostResident,
    /// Reserved address range backed by tiles on demand.
    Reserved,
}

/// Texel layout in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    /// Driver chosen layout.
    Opaque,
    /// 64 KiB tiles with an undefined swizzle, used for tiled resources.
    UndefinedSwizzle64K,
    /// Row-major layout, only on devices that map images directly.
    Linear,
}

bitflags! {
    /// How the device image is used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Sampled from shaders.
        const SAMPLED = 1 << 0;
        /// Copy source.
        const TRANSFER_SRC = 1 << 1;
        /// Copy destination.
        const TRANSFER_DST = 1 << 2;
        /// Color render attachment.
        const RENDER_TARGET = 1 << 3;
        /// Depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 4;
        /// Unordered access (storage) view.
        const STORAGE = 1 << 5;
        /// Concurrently accessed from several queues.
        const SIMULTANEOUS_ACCESS = 1 << 6;
    }
}

/// Complete description of a device image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    pub dimension: ImageDimension,
    pub format: TextureFormat,
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub usage: ImageUsage,
    pub memory_class: MemoryClass,
    pub layout: MemoryLayout,
    /// Per-subresource state tracking must be allocated.
    pub subresource_tracking: bool,
    pub cube: bool,
    pub srgb_read: bool,
    pub srgb_write: bool,
    pub label: Option<String>,
}

impl ImageDescriptor {
    /// Number of addressable subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_layers
    }

    /// Extent of mip `level`.
    pub fn mip_extent(&self, level: u32) -> Extent3d {
        let extent = self.extent.mip(level);
        match self.dimension {
            ImageDimension::D2 => Extent3d::new_2d(extent.width, extent.height),
            ImageDimension::D3 => extent,
        }
    }
}

/// Strip linear layout requests the device or format can not honor.
pub fn update_flags_for_linear_layout(
    flags: CreateFlags,
    format: TextureFormat,
    capabilities: &DeviceCapabilities,
) -> CreateFlags {
    let linear = CreateFlags::LINEAR_LAYOUT | CreateFlags::CPU_CACHED;
    if !capabilities.linear_layout {
        return flags;
    }
    if flags.contains(CreateFlags::RENDER_TARGET | CreateFlags::LINEAR_LAYOUT) {
        log::debug!("linear layout is not supported for render targets, ignored");
        return flags.difference(linear);
    }
    if flags.contains(CreateFlags::LINEAR_LAYOUT) && format.is_compressed() {
        return flags.difference(linear);
    }
    flags
}

/// Memory class for the given flags.
pub fn memory_class(flags: CreateFlags, capabilities: &DeviceCapabilities) -> MemoryClass {
    if capabilities.linear_layout
        && flags.contains(CreateFlags::LINEAR_LAYOUT | CreateFlags::CPU_CACHED)
    {
        return MemoryClass::HostResident;
    }
    if flags.contains(CreateFlags::TILED) {
        MemoryClass::Reserved
    } else {
        MemoryClass::DeviceResident
    }
}

/// Builder producing an [`ImageDescriptor`] from resolved parameters.
#[derive(Debug, Clone)]
pub struct ImageDescriptorBuilder {
    flags: CreateFlags,
    format: TextureFormat,
    extent: Extent3d,
    mip_levels: u32,
    array_size: u32,
    cube: bool,
    volume: bool,
    label: Option<String>,
}

impl ImageDescriptorBuilder {
    /// Start a 2D descriptor.
    pub fn new_2d(width: u32, height: u32, resolved: &ResolvedParameters) -> Self {
        Self {
            flags: resolved.flags,
            format: resolved.format,
            extent: Extent3d::new_2d(width, height),
            mip_levels: resolved.mip_levels.max(1),
            array_size: 1,
            cube: false,
            volume: false,
            label: None,
        }
    }

    /// Start a volume descriptor.
    pub fn new_3d(width: u32, height: u32, depth: u32, resolved: &ResolvedParameters) -> Self {
        Self {
            extent: Extent3d::new(width, height, depth.max(1)),
            volume: true,
            ..Self::new_2d(width, height, resolved)
        }
    }

    /// Set the number of array elements (cubes for cube arrays).
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size.max(1);
        self
    }

    /// Mark the image as a cube map (6 layers per array element).
    pub fn with_cube(mut self, cube: bool) -> Self {
        self.cube = cube;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of array layers the descriptor will have.
    pub fn array_layers(&self) -> u32 {
        (if self.cube { 6 } else { 1 }) * self.array_size
    }

    fn check_variable_rate(&self) -> Result<(), VariableRateViolation> {
        let samples = self.flags.sample_count();
        if self.format != TextureFormat::R8Ui {
            Err(VariableRateViolation::Format(self.format))
        } else if self.flags.contains(CreateFlags::RENDER_TARGET) {
            Err(VariableRateViolation::RenderTarget)
        } else if samples > 1 {
            Err(VariableRateViolation::Multisampled(samples))
        } else if self.array_size != 1 {
            Err(VariableRateViolation::Arrayed(self.array_size))
        } else if self.cube {
            Err(VariableRateViolation::Cube)
        } else if self.volume {
            Err(VariableRateViolation::Volume)
        } else if self.mip_levels != 1 {
            Err(VariableRateViolation::MipLevels(self.mip_levels))
        } else {
            Ok(())
        }
    }

    /// Validate and produce the descriptor.
    pub fn build(self, capabilities: &DeviceCapabilities) -> TextureResult<ImageDescriptor> {
        if self.flags.contains(CreateFlags::VARIABLE_RATE) {
            self.check_variable_rate().map_err(TextureError::VariableRate)?;
        }

        let flags = update_flags_for_linear_layout(self.flags, self.format, capabilities);
        let render_target = flags.contains(CreateFlags::RENDER_TARGET);
        let unordered = flags.contains(CreateFlags::UNORDERED_ACCESS);

        let mut usage = ImageUsage::SAMPLED | ImageUsage::TRANSFER_SRC | ImageUsage::TRANSFER_DST;
        if render_target {
            usage |= if self.format.is_depth_stencil() {
                ImageUsage::DEPTH_STENCIL
            } else {
                ImageUsage::RENDER_TARGET
            };
        }
        if unordered {
            usage |= ImageUsage::STORAGE;
        }
        if flags.contains(CreateFlags::MULTI_QUEUE) {
            if !(render_target || unordered) || self.format.is_depth_stencil() {
                return Err(TextureError::MultiQueueUsage {
                    format: self.format,
                });
            }
            usage |= ImageUsage::SIMULTANEOUS_ACCESS;
        }

        let layout = if flags.contains(CreateFlags::TILED) {
            MemoryLayout::UndefinedSwizzle64K
        } else if capabilities.linear_layout && flags.contains(CreateFlags::LINEAR_LAYOUT) {
            MemoryLayout::Linear
        } else {
            MemoryLayout::Opaque
        };

        Ok(ImageDescriptor {
            dimension: if self.volume {
                ImageDimension::D3
            } else {
                ImageDimension::D2
            },
            format: self.format,
            extent: self.extent,
            mip_levels: self.mip_levels,
            array_layers: if self.volume { 1 } else { self.array_layers() },
            sample_count: flags.sample_count(),
            usage,
            memory_class: memory_class(flags, capabilities),
            layout,
            subresource_tracking: flags.needs_subresource_tracking(),
            cube: self.cube,
            srgb_read: flags.contains(CreateFlags::SRGB_READ),
            srgb_write: flags.contains(CreateFlags::SRGB_WRITE),
            label: self.label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve_parameters;

    fn resolved(flags: CreateFlags, levels: u32) -> ResolvedParameters {
        resolve_parameters(64, 64, flags, levels)
    }

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities::default()
    }

    #[test]
    fn test_variable_rate_rules() {
        let vrs = CreateFlags::VARIABLE_RATE.with_format(TextureFormat::R8Ui);
        let ok = ImageDescriptorBuilder::new_2d(64, 64, &resolved(vrs, 1)).build(&caps());
        assert!(ok.is_ok());

        let err = ImageDescriptorBuilder::new_2d(64, 64, &resolved(vrs, 2))
            .build(&caps())
            .unwrap_err();
        assert_eq!(err, TextureError::VariableRate(VariableRateViolation::MipLevels(2)));

        let err = ImageDescriptorBuilder::new_2d(64, 64, &resolved(vrs, 1))
            .with_cube(true)
            .build(&caps())
            .unwrap_err();
        assert_eq!(err, TextureError::VariableRate(VariableRateViolation::Cube));

        let err = ImageDescriptorBuilder::new_2d(64, 64, &resolved(vrs, 1))
            .with_array_size(4)
            .build(&caps())
            .unwrap_err();
        assert_eq!(err, TextureError::VariableRate(VariableRateViolation::Arrayed(4)));

        let wrong_format = CreateFlags::VARIABLE_RATE.with_format(TextureFormat::R8);
        let err = ImageDescriptorBuilder::new_2d(64, 64, &resolved(wrong_format, 1))
            .build(&caps())
            .unwrap_err();
        assert_eq!(
            err,
            TextureError::VariableRate(VariableRateViolation::Format(TextureFormat::R8))
        );
    }

    #[test]
    fn test_multi_queue_requires_color_target() {
        let flags = CreateFlags::MULTI_QUEUE;
        let err = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1)).build(&caps());
        assert!(matches!(err, Err(TextureError::MultiQueueUsage { .. })));

        let flags = (CreateFlags::MULTI_QUEUE | CreateFlags::RENDER_TARGET)
            .with_format(TextureFormat::Depth32);
        let err = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1)).build(&caps());
        assert!(matches!(err, Err(TextureError::MultiQueueUsage { .. })));

        let flags = CreateFlags::MULTI_QUEUE | CreateFlags::UNORDERED_ACCESS;
        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1))
            .build(&caps())
            .unwrap();
        assert!(desc.usage.contains(ImageUsage::SIMULTANEOUS_ACCESS | ImageUsage::STORAGE));
    }

    #[test]
    fn test_usage_and_tracking() {
        let flags = CreateFlags::RENDER_TARGET.with_format(TextureFormat::Depth24S8);
        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1))
            .build(&caps())
            .unwrap();
        assert!(desc.usage.contains(ImageUsage::DEPTH_STENCIL));
        assert!(!desc.usage.contains(ImageUsage::RENDER_TARGET));
        assert!(desc.subresource_tracking);

        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(CreateFlags::empty(), 1))
            .build(&caps())
            .unwrap();
        assert!(!desc.subresource_tracking);
        assert_eq!(desc.layout, MemoryLayout::Opaque);
        assert_eq!(desc.memory_class, MemoryClass::DeviceResident);
    }

    #[test]
    fn test_tiled_layout() {
        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(CreateFlags::TILED, 1))
            .build(&caps())
            .unwrap();
        assert_eq!(desc.layout, MemoryLayout::UndefinedSwizzle64K);
        assert_eq!(desc.memory_class, MemoryClass::Reserved);
    }

    #[test]
    fn test_cube_array_layers() {
        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(CreateFlags::empty(), 1))
            .with_cube(true)
            .with_array_size(3)
            .build(&caps())
            .unwrap();
        assert_eq!(desc.array_layers, 18);
        assert_eq!(desc.subresource_count(), 18);
    }

    #[test]
    fn test_linear_layout_rules() {
        let linear = DeviceCapabilities {
            linear_layout: true,
            ..Default::default()
        };
        let flags = CreateFlags::LINEAR_LAYOUT | CreateFlags::CPU_CACHED;
        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1))
            .build(&linear)
            .unwrap();
        assert_eq!(desc.layout, MemoryLayout::Linear);
        assert_eq!(desc.memory_class, MemoryClass::HostResident);

        let stripped = update_flags_for_linear_layout(
            flags | CreateFlags::RENDER_TARGET,
            TextureFormat::A8R8G8B8,
            &linear,
        );
        assert!(!stripped.intersects(flags));

        let stripped = update_flags_for_linear_layout(flags, TextureFormat::Dxt5, &linear);
        assert!(!stripped.intersects(flags));

        let desc = ImageDescriptorBuilder::new_2d(8, 8, &resolved(flags, 1))
            .build(&caps())
            .unwrap();
        assert_eq!(desc.layout, MemoryLayout::Opaque);
    }
}
