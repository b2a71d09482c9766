//! Error types for stream operations.
//!
//! End of data is deliberately *not* an error: readers report it through
//! [`EndStatus::EndOfData`](crate::EndStatus) and `Ok(None)` sentinels, so a
//! normal end of input never takes the error path.

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Stream error types.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying file or device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not provided by this stream kind.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Seek offset or confinement window outside the valid range.
    #[error("range error in {what}: {value} not within [{min}, {max}]")]
    Range {
        what: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// A filter needs an out-of-band decision before it can continue.
    /// Take the payload, service it, and reinvoke the operation.
    #[error("callout pending")]
    CalloutPending,

    /// The stream previously failed; the same failure is reported for every
    /// operation until `reset` or `close`.
    #[error("stream failed: {0}")]
    Faulted(String),

    /// The handle refers to a stream that has been closed (or was never
    /// opened in this registry).
    #[error("stale stream handle")]
    StaleHandle,
}

impl Error {
    /// Create a range error.
    pub fn range(what: &'static str, value: u64, min: u64, max: u64) -> Self {
        Error::Range {
            what,
            value,
            min,
            max,
        }
    }

    /// Create an I/O error with a custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io(std::io::Error::other(message.into()))
    }

    /// The message a faulted stream replays for subsequent operations.
    pub fn fault_message(&self) -> String {
        match self {
            Error::Faulted(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Get error category for diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Unsupported(_) => "unsupported",
            Error::Range { .. } => "range_error",
            Error::CalloutPending => "callout_pending",
            Error::Faulted(_) => "faulted",
            Error::StaleHandle => "stale_handle",
        }
    }
}
