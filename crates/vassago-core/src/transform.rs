//! The transform contract filter stages implement.
//!
//! A filter stage owns no buffering policy of its own: the engine hands it
//! an input slice (the target's readable bytes) and an output slice (the
//! stage's writable bytes) and the transform reports how much of each it
//! used, plus an outcome. Everything else - refilling the target, draining
//! the output, chaining, teardown - belongs to the engine.

use std::any::Any;

use crate::error::Result;

/// Opaque payload accompanying a callout.
///
/// Its concrete type is a contract between one filter and its caller; the
/// engine only ferries it.
pub type CalloutPayload = Box<dyn Any>;

/// Outcome of one `process` step.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The transform consumed what it could and needs more input before it
    /// can produce anything further.
    NeedInput,

    /// Output was produced (and possibly the output slice filled); call
    /// again once the output has been drained.
    Produced,

    /// The transform has produced its final byte; the stage is at end of
    /// data once its buffered output is consumed.
    Finished,

    /// The transform cannot continue without an out-of-band decision from
    /// the caller. The payload is surfaced on the stream; the caller
    /// resumes by reinvoking the operation.
    Callout(CalloutPayload),
}

/// A byte transform applied while data crosses a pipeline stage.
///
/// Implementations must be restartable after returning
/// [`ProcessOutcome::Callout`] and must tolerate empty input slices (the
/// engine probes with whatever the target currently holds).
pub trait Transform {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Process one step.
    ///
    /// # Arguments
    /// * `input` - bytes available from the stage's target
    /// * `output` - free space in the stage's own buffer
    /// * `last` - true once the target has reached end of data
    ///
    /// # Returns
    /// Tuple of (bytes_consumed, bytes_produced, outcome).
    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)>;

    /// Minimum look-ahead (in bytes) this transform needs from its target's
    /// buffer. The engine inserts an extra buffering stage when the target
    /// cannot provide it.
    fn min_lookahead(&self) -> usize {
        0
    }
}
