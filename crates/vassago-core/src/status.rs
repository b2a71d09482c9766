//! The end-of-buffer status state machine.

/// What happens when a client reaches the end of a stream's buffer.
///
/// The status is sticky for terminal states: once a stream reports
/// [`EndOfData`](EndStatus::EndOfData) or [`Error`](EndStatus::Error),
/// repeated reads return the same sentinel without re-entering the
/// transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndStatus {
    /// Normal case - more data may be produced on demand.
    #[default]
    Normal,

    /// No more data; a read stream has consumed its source, or a write
    /// stream has emitted its end marker.
    EndOfData,

    /// An error terminated the last transfer from or to the underlying
    /// source or sink. Sticky until `reset` or `close`.
    Error,

    /// The last transfer was interrupted. Reserved; never produced.
    Interrupted,

    /// The transform needs an out-of-band decision from the caller before it
    /// can proceed; the caller resumes by reinvoking the operation.
    CalloutRequired,
}

impl EndStatus {
    /// Check if the status is terminal (no further data will ever arrive).
    pub fn is_terminal(self) -> bool {
        matches!(self, EndStatus::EndOfData | EndStatus::Error)
    }

    /// Check if the buffer may be refilled (or drained) on demand.
    pub fn can_transfer(self) -> bool {
        matches!(self, EndStatus::Normal)
    }

    /// Status name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            EndStatus::Normal => "normal",
            EndStatus::EndOfData => "end_of_data",
            EndStatus::Error => "error",
            EndStatus::Interrupted => "interrupted",
            EndStatus::CalloutRequired => "callout_required",
        }
    }
}
