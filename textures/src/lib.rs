//! # RedLilium Textures
//!
//! GPU texture resources for the RedLilium engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`TextureManager`] - Handle table owning every texture and its operations
//! - [`DeviceContext`] - Trait for the device that allocates images and staging memory
//! - [`ddsx`] - Loader for the DDSx texture container
//! - Backend support: wgpu and Dummy (for testing)
//!
//! Textures are created from resolved parameters, backed by one device image and
//! optionally by a persistent staging region. CPU access goes through
//! lock/unlock, emulated with staging copies and fence waits. Sampler and binding
//! changes are reported to a [`DirtyTracker`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_textures::*;
//!
//! let mut textures = TextureManager::new(
//!     create_device(),
//!     Arc::new(BindingTracker::new()),
//!     TextureSystemConfig::default(),
//! );
//! let handle = textures.create(&TextureCreateInfo::new_2d(256, 256, CreateFlags::empty()), None)?;
//! let region = textures.lock(handle, 0, LockFlags::WRITE)?;
//! region.data.fill(0xff);
//! textures.unlock(handle)?;
//! ```

pub mod binding;
pub mod config;
pub mod ddsx;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod layout;
pub mod manager;
pub mod resolve;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use binding::{BindingState, BindingTracker, DirtyTracker, ShaderStage};
pub use config::TextureSystemConfig;
pub use ddsx::{DdsxHeader, DdsxLoadOptions, SystemCopy};
pub use descriptor::{ImageDescriptor, ImageDescriptorBuilder};
pub use device::{create_device, DeviceContext, DummyDevice, FenceValue};
pub use error::{TextureError, TextureResult};
pub use manager::{TextureCreateInfo, TextureHandle, TextureManager};
pub use resolve::{resolve_parameters, ResolvedParameters};
pub use texture::{
    LockState, LockedRegion, ResizeRequest, SubRegionCopy, SubresourceData, TextureInfo, TextureKind,
    TextureRecord,
};
pub use types::{
    AddressMode, CreateFlags, Extent3d, FilterMode, LockFlags, MipFilterMode, Offset3d, SamplerState,
    TextureFormat,
};

/// Texture library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the texture subsystem.
///
/// This should be called before using any texture functionality.
pub fn init() {
    log::info!("RedLilium Textures v{} initialized", VERSION);
}
