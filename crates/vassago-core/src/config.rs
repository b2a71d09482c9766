//! Configuration for stream buffers.

/// Default buffer size for stream stages (32 KB).
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Minimum buffer size allowed.
///
/// Deliberately tiny so per-byte interpreter loops can be exercised with
/// many refills.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Maximum buffer size allowed (1 MB).
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Clamp buffer size to the valid range.
#[inline]
pub fn clamp_buffer_size(size: usize) -> usize {
    size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
}

/// Configuration for a stream registry.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Buffer size for stages that allocate their own storage.
    pub buffer_size: usize,
}

impl StreamConfig {
    /// Create a configuration with a clamped buffer size.
    pub fn with_buffer_size(size: usize) -> Self {
        StreamConfig {
            buffer_size: clamp_buffer_size(size),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
