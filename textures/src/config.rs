//! Texture system configuration.

use std::time::Duration;

/// Limits and defaults applied by the [`TextureManager`](crate::TextureManager).
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSystemConfig {
    /// Smallest allowed width/height of 2D textures.
    pub min_texture_size: u32,
    /// Largest allowed width/height of 2D textures.
    pub max_texture_size: u32,
    /// Smallest allowed cube face size.
    pub min_cube_size: u32,
    /// Largest allowed cube face size.
    pub max_cube_size: u32,
    /// Largest allowed volume dimension.
    pub max_volume_size: u32,
    /// LOD bias of newly created samplers.
    pub default_lod_bias: f32,
    /// Anisotropy of newly created samplers.
    pub default_anisotropy: u32,
    /// How often a DDSx read that reports `WouldBlock` is retried.
    pub ddsx_retry_attempts: u32,
    /// Pause between DDSx read attempts.
    pub ddsx_retry_interval: Duration,
    /// Panic on precondition violations in debug builds instead of returning an error.
    pub fatal_preconditions: bool,
}

impl Default for TextureSystemConfig {
    fn default() -> Self {
        Self {
            min_texture_size: 1,
            max_texture_size: 16384,
            min_cube_size: 1,
            max_cube_size: 16384,
            max_volume_size: 2048,
            default_lod_bias: 0.0,
            default_anisotropy: 1,
            ddsx_retry_attempts: 5,
            ddsx_retry_interval: Duration::from_millis(1),
            fatal_preconditions: false,
        }
    }
}

impl TextureSystemConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the 2D texture size limits.
    pub fn with_texture_size_limits(mut self, min: u32, max: u32) -> Self {
        self.min_texture_size = min.max(1);
        self.max_texture_size = max.max(self.min_texture_size);
        self
    }

    /// Set the cube face size limits.
    pub fn with_cube_size_limits(mut self, min: u32, max: u32) -> Self {
        self.min_cube_size = min.max(1);
        self.max_cube_size = max.max(self.min_cube_size);
        self
    }

    /// Set the largest volume dimension.
    pub fn with_max_volume_size(mut self, max: u32) -> Self {
        self.max_volume_size = max.max(1);
        self
    }

    /// Set the default sampler LOD bias.
    pub fn with_default_lod_bias(mut self, bias: f32) -> Self {
        self.default_lod_bias = bias;
        self
    }

    /// Set the default sampler anisotropy.
    pub fn with_default_anisotropy(mut self, anisotropy: u32) -> Self {
        self.default_anisotropy = anisotropy;
        self
    }

    /// Set how DDSx reads are retried.
    pub fn with_ddsx_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.ddsx_retry_attempts = attempts.max(1);
        self.ddsx_retry_interval = interval;
        self
    }

    /// Panic on precondition violations in debug builds.
    pub fn with_fatal_preconditions(mut self, fatal: bool) -> Self {
        self.fatal_preconditions = fatal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TextureSystemConfig::default();
        assert_eq!(config.ddsx_retry_attempts, 5);
        assert!(!config.fatal_preconditions);
        assert_eq!(config.default_anisotropy, 1);
    }

    #[test]
    fn test_builders_keep_limits_ordered() {
        let config = TextureSystemConfig::new()
            .with_texture_size_limits(64, 16)
            .with_ddsx_retry(0, Duration::ZERO);
        assert_eq!(config.min_texture_size, 64);
        assert_eq!(config.max_texture_size, 64);
        assert_eq!(config.ddsx_retry_attempts, 1);
    }
}
