//! Texture system error types.

use thiserror::Error;

use crate::types::TextureFormat;

/// Result alias used throughout the crate.
pub type TextureResult<T> = Result<T, TextureError>;

/// A single broken rule of a variable-rate-shading texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRateViolation {
    /// Only `R8UI` can hold shading rates.
    Format(TextureFormat),
    /// Shading-rate images cannot be rendered to.
    RenderTarget,
    /// Shading-rate images must be single sampled.
    Multisampled(u32),
    /// Shading-rate images cannot be arrays.
    Arrayed(u32),
    /// Shading-rate images cannot be cube maps.
    Cube,
    /// Shading-rate images cannot be volumes.
    Volume,
    /// Shading-rate images must have exactly one mip.
    MipLevels(u32),
}

impl std::fmt::Display for VariableRateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(format) => write!(f, "format must be R8UI, got {format}"),
            Self::RenderTarget => write!(f, "can not be used as render target"),
            Self::Multisampled(count) => write!(f, "can not be multisampled ({count} samples)"),
            Self::Arrayed(size) => write!(f, "can not be an array (array size {size})"),
            Self::Cube => write!(f, "can not be a cube map"),
            Self::Volume => write!(f, "can not be a volume"),
            Self::MipLevels(levels) => write!(f, "must have exactly one mip level, got {levels}"),
        }
    }
}

/// Errors that can occur in the texture system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextureError {
    /// An invalid flag combination or call sequence.
    #[error("precondition violated: {0}")]
    Precondition(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Variable-rate-shading texture rules were broken.
    #[error("variable rate shading texture {0}")]
    VariableRate(VariableRateViolation),
    /// Multi-queue simultaneous access requested for an unsupported resource.
    #[error("simultaneous multi queue use requires a color render target or UAV, format {format}")]
    MultiQueueUsage {
        /// Format of the offending texture.
        format: TextureFormat,
    },
    /// The operation is not supported for this texture.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// No usable GPU device could be created.
    #[error("device creation failed: {0}")]
    DeviceCreationFailed(String),
    /// The device returned no image.
    #[error("image allocation failed for <{0}>")]
    ImageAllocationFailed(String),
    /// The device returned no staging memory.
    #[error("staging allocation of {size} bytes failed")]
    StagingAllocationFailed {
        /// Requested size in bytes.
        size: u64,
    },
    /// Source and destination formats can not be copied into each other.
    #[error("format mismatch: {src} can not be copied to {dst}")]
    FormatMismatch {
        /// Source format.
        src: TextureFormat,
        /// Destination format.
        dst: TextureFormat,
    },
    /// Source and destination geometry differ.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),
    /// A no-block lock found the read back still in flight.
    #[error("read back not ready")]
    NotReady,
    /// The texture is already locked.
    #[error("texture <{0}> is already locked")]
    AlreadyLocked(String),
    /// Unlock without a lock.
    #[error("texture <{0}> is not locked")]
    NotLocked(String),
    /// The texture is locked and can not be resized or replaced.
    #[error("texture <{0}> is busy")]
    Busy(String),
    /// The handle does not refer to a live texture.
    #[error("invalid texture handle")]
    InvalidHandle,
    /// The stream does not start with the DDSx label.
    #[error("bad DDSx label {0:?}")]
    BadLabel([u8; 4]),
    /// The stream ended before the payload was complete.
    #[error("truncated stream: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes expected.
        expected: u64,
        /// Bytes available.
        actual: u64,
    },
    /// Reading the stream failed.
    #[error("io error ({kind:?}): {message}")]
    Io {
        /// Kind of the underlying error.
        kind: std::io::ErrorKind,
        /// Message of the underlying error.
        message: String,
    },
}

impl From<std::io::Error> for TextureError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TextureError::NotReady;
        assert_eq!(err.to_string(), "read back not ready");

        let err = TextureError::VariableRate(VariableRateViolation::MipLevels(3));
        assert_eq!(
            err.to_string(),
            "variable rate shading texture must have exactly one mip level, got 3"
        );

        let err = TextureError::StagingAllocationFailed { size: 512 };
        assert_eq!(err.to_string(), "staging allocation of 512 bytes failed");
    }

    #[test]
    fn test_io_conversion() {
        let err: TextureError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(
            err,
            TextureError::Io {
                kind: std::io::ErrorKind::UnexpectedEof,
                ..
            }
        ));
    }
}
