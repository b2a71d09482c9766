//! Built-in transforms.

use vassago_core::{ProcessOutcome, Result, Transform};

/// Identity transform: passes bytes through unchanged.
///
/// The engine inserts one as a buffering stage when a transform needs more
/// look-ahead than the adjacent buffer provides; it is also handy as a
/// pipeline placeholder.
#[derive(Debug, Default)]
pub struct NullTransform;

impl Transform for NullTransform {
    fn name(&self) -> &'static str {
        "null"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        let outcome = if n == input.len() {
            if last {
                ProcessOutcome::Finished
            } else {
                ProcessOutcome::NeedInput
            }
        } else {
            ProcessOutcome::Produced
        };
        Ok((n, n, outcome))
    }
}
