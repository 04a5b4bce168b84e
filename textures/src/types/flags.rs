//! Texture creation and lock flags.

use bitflags::bitflags;

use super::TextureFormat;

bitflags! {
    /// Legacy texture creation bitmask.
    ///
    /// The high byte holds a [`TextureFormat`] code and bits 20..23 the log2 of the
    /// sample count; use the accessors instead of touching those bits directly.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Texture can be rendered to.
        const RENDER_TARGET = 1 << 0;
        /// Texture can be bound as an unordered access view.
        const UNORDERED_ACCESS = 1 << 1;
        /// Content is rewritten by the CPU frequently.
        const DYNAMIC = 1 << 2;
        /// Keep a persistent host-visible copy of the whole texture.
        const SYSTEM_MEMORY = 1 << 3;
        /// Texture is read back by the CPU.
        const READABLE = 1 << 4;
        /// Keep the loaded container bytes as a CPU-side mirror.
        const SYSTEM_COPY = 1 << 5;
        /// Content is loaded exactly once.
        const LOAD_ONCE = 1 << 6;
        /// Texture is the destination of update copies.
        const UPDATE_DESTINATION = 1 << 7;
        /// Zero initialize when created without data.
        const CLEAR_ON_CREATE = 1 << 8;
        /// Sample through an sRGB view.
        const SRGB_READ = 1 << 9;
        /// Render through an sRGB view.
        const SRGB_WRITE = 1 << 10;
        /// Reserved (tiled) resource.
        const TILED = 1 << 11;
        /// Accessed from several queues at the same time.
        const MULTI_QUEUE = 1 << 12;
        /// Variable-rate-shading rate image.
        const VARIABLE_RATE = 1 << 13;
        /// Linear memory layout on devices that can map images directly.
        const LINEAR_LAYOUT = 1 << 14;
        /// CPU-cached memory for linear layout images.
        const CPU_CACHED = 1 << 15;
        /// Must live in the fast on-chip pool.
        const FAST_POOL_ONLY = 1 << 16;
        /// May be moved in and out of the fast on-chip pool.
        const FAST_POOL_MOVABLE = 1 << 17;

        /// Sample count field (log2).
        const SAMPLES_MASK = 0x0070_0000;
        /// Format code field.
        const FORMAT_MASK = 0xFF00_0000;
    }
}

const SAMPLES_SHIFT: u32 = 20;
const FORMAT_SHIFT: u32 = 24;

impl CreateFlags {
    /// Fast-pool placement bits.
    pub const FAST_POOL: Self = Self::FAST_POOL_ONLY.union(Self::FAST_POOL_MOVABLE);

    /// Format stored in the flags, `None` for the default format.
    pub fn format(self) -> Option<TextureFormat> {
        let code = ((self.bits() & Self::FORMAT_MASK.bits()) >> FORMAT_SHIFT) as u8;
        TextureFormat::from_code(code)
    }

    /// Returns the flags with the format field replaced.
    pub fn with_format(self, format: TextureFormat) -> Self {
        let bits = (self.bits() & !Self::FORMAT_MASK.bits()) | (u32::from(format.code()) << FORMAT_SHIFT);
        Self::from_bits_retain(bits)
    }

    /// Sample count encoded in the flags (1 when unset).
    pub fn sample_count(self) -> u32 {
        1 << ((self.bits() & Self::SAMPLES_MASK.bits()) >> SAMPLES_SHIFT)
    }

    /// Returns the flags with the sample count replaced. `count` is rounded down
    /// to a power of two and capped at 64.
    pub fn with_sample_count(self, count: u32) -> Self {
        let log2 = count.max(1).ilog2().min(6);
        let bits = (self.bits() & !Self::SAMPLES_MASK.bits()) | (log2 << SAMPLES_SHIFT);
        Self::from_bits_retain(bits)
    }

    /// Flags without the format and sample fields.
    pub fn usage_bits(self) -> Self {
        self.difference(Self::FORMAT_MASK | Self::SAMPLES_MASK)
    }

    /// Returns true if the texture needs per-subresource state tracking.
    ///
    /// These resources may be rewritten several times within one submission.
    pub fn needs_subresource_tracking(self) -> bool {
        self.intersects(
            Self::RENDER_TARGET | Self::UNORDERED_ACCESS | Self::UPDATE_DESTINATION | Self::DYNAMIC,
        )
    }
}

bitflags! {
    /// Flags for CPU locks.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LockFlags: u32 {
        /// CPU reads the content.
        const READ = 1 << 0;
        /// CPU writes the content.
        const WRITE = 1 << 1;
        /// Previous content is irrelevant.
        const DISCARD = 1 << 2;
        /// Fail with `NotReady` instead of waiting for a read back.
        const NO_BLOCK = 1 << 3;
        /// Copy the whole texture into staging; unlock uploads all of it.
        const COPY_TO_STAGING = 1 << 4;
        /// Release the staging copy on unlock.
        const DELETE_SYSTEM_COPY_AFTER = 1 << 5;
        /// Do not upload on unlock.
        const DONT_UPDATE = 1 << 6;

        /// Read and write.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl LockFlags {
    /// Returns true if the lock carries write intent.
    pub fn writes(self) -> bool {
        self.intersects(Self::WRITE | Self::DISCARD)
    }

    /// Returns true if the lock reads content.
    pub fn reads(self) -> bool {
        self.contains(Self::READ)
    }
}
