//! Common utilities for texture integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different device implementations.

use std::sync::Arc;

use redlilium_textures::device::DeviceCapabilities;
use redlilium_textures::{
    BindingTracker, DeviceContext, DummyDevice, LockFlags, TextureHandle, TextureManager,
    TextureSystemConfig,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available devices for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy device (host memory, no GPU).
    Dummy,
    /// WebGPU device (via wgpu).
    WebGpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => false,
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning a texture manager on one device.
pub struct TestContext {
    /// The backend being tested.
    #[allow(dead_code)]
    pub backend: Backend,
    /// Set for the dummy backend, for inspecting recorded commands.
    #[allow(dead_code)]
    pub dummy: Option<Arc<DummyDevice>>,
    pub tracker: Arc<BindingTracker>,
    pub textures: TextureManager,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_config(backend, TextureSystemConfig::default())
    }

    /// Create a test context with a custom configuration.
    pub fn with_config(backend: Backend, config: TextureSystemConfig) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        let _ = env_logger::builder().is_test(true).try_init();

        let (device, dummy): (Arc<dyn DeviceContext>, Option<Arc<DummyDevice>>) = match backend {
            Backend::Dummy => {
                let dummy = Arc::new(DummyDevice::new());
                let device: Arc<dyn DeviceContext> = dummy.clone();
                (device, Some(dummy))
            }
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => {
                let device = redlilium_textures::device::wgpu_impl::WgpuDevice::new().ok()?;
                (Arc::new(device), None)
            }
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => return None,
        };
        let tracker = Arc::new(BindingTracker::new());
        let textures = TextureManager::new(device, tracker.clone(), config);
        Some(Self {
            backend,
            dummy,
            tracker,
            textures,
        })
    }

    /// Create a dummy-device context reporting `capabilities`.
    #[allow(dead_code)]
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dummy = Arc::new(DummyDevice::with_capabilities(capabilities));
        let device: Arc<dyn DeviceContext> = dummy.clone();
        let tracker = Arc::new(BindingTracker::new());
        let textures = TextureManager::new(device, tracker.clone(), TextureSystemConfig::default());
        Self {
            backend: Backend::Dummy,
            dummy: Some(dummy),
            tracker,
            textures,
        }
    }

    /// The dummy device; panics for other backends.
    #[allow(dead_code)]
    pub fn dummy(&self) -> &DummyDevice {
        self.dummy.as_deref().expect("test requires the dummy backend")
    }

    /// Write tightly packed rows of `bytes` into mip `level` of a 2D texture.
    #[allow(dead_code)]
    pub fn write_level(&mut self, handle: TextureHandle, level: u32, row_bytes: usize, bytes: &[u8]) {
        {
            let region = self
                .textures
                .lock(handle, level, LockFlags::WRITE)
                .expect("write lock should succeed");
            copy_rows_in(region.data, region.row_pitch as usize, row_bytes, bytes);
        }
        self.textures.unlock(handle).expect("unlock should succeed");
    }

    /// Read mip `level` of a 2D texture as tightly packed rows.
    #[allow(dead_code)]
    pub fn read_level(&mut self, handle: TextureHandle, level: u32, row_bytes: usize, rows: usize) -> Vec<u8> {
        let bytes = {
            let region = self
                .textures
                .lock(handle, level, LockFlags::READ)
                .expect("read lock should succeed");
            copy_rows_out(region.data, region.row_pitch as usize, row_bytes, rows)
        };
        self.textures.unlock(handle).expect("unlock should succeed");
        bytes
    }
}

// ============================================================================
// Data Helpers
// ============================================================================

/// Copy packed rows into a pitched destination.
pub fn copy_rows_in(dst: &mut [u8], row_pitch: usize, row_bytes: usize, src: &[u8]) {
    for (row, chunk) in src.chunks(row_bytes).enumerate() {
        dst[row * row_pitch..row * row_pitch + chunk.len()].copy_from_slice(chunk);
    }
}

/// Copy `rows` pitched rows out as packed bytes.
pub fn copy_rows_out(src: &[u8], row_pitch: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    (0..rows)
        .flat_map(|row| src[row * row_pitch..row * row_pitch + row_bytes].iter().copied())
        .collect()
}

/// Generate a deterministic byte pattern starting at `seed`.
#[allow(dead_code)]
pub fn generate_test_pattern(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_add(seed)).collect()
}

/// A8R8G8B8 checkerboard of `cell` sized squares with `row_pitch` bytes per row.
#[allow(dead_code)]
pub fn checkerboard(width: u32, height: u32, cell: u32, row_pitch: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; row_pitch * height as usize];
    for y in 0..height {
        for x in 0..width {
            let white = ((x / cell) + (y / cell)) % 2 == 0;
            let texel = if white {
                [0xff, 0xff, 0xff, 0xff]
            } else {
                [0x00, 0x00, 0x00, 0xff]
            };
            let at = y as usize * row_pitch + x as usize * 4;
            bytes[at..at + 4].copy_from_slice(&texel);
        }
    }
    bytes
}
