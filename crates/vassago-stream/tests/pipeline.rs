//! Filter pipeline behavior: composition, transforms, callouts, faults,
//! and teardown.

use std::cell::Cell;
use std::rc::Rc;

use vassago_stream::{
    EndStatus, Error, Modes, ProcessOutcome, Result, StreamRegistry, Transform,
};

/// Repeats every input byte twice.
struct Doubling;

impl Transform for Doubling {
    fn name(&self) -> &'static str {
        "doubling"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        let n = input.len().min(output.len() / 2);
        for (i, &b) in input[..n].iter().enumerate() {
            output[2 * i] = b;
            output[2 * i + 1] = b;
        }
        let outcome = if last && n == input.len() {
            ProcessOutcome::Finished
        } else if n < input.len() {
            ProcessOutcome::Produced
        } else {
            ProcessOutcome::NeedInput
        };
        Ok((n, 2 * n, outcome))
    }
}

/// Passes bytes through, then appends a `!` trailer at the end of input.
struct Trailing {
    done: bool,
}

impl Transform for Trailing {
    fn name(&self) -> &'static str {
        "trailing"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        if input.is_empty() && last && !self.done {
            output[0] = b'!';
            self.done = true;
            return Ok((0, 1, ProcessOutcome::Finished));
        }
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        let outcome = if n < input.len() {
            ProcessOutcome::Produced
        } else {
            ProcessOutcome::NeedInput
        };
        Ok((n, n, outcome))
    }
}

/// Fails on its `fail_on`-th invocation, passing bytes through before that.
struct FailingAt {
    calls: usize,
    fail_on: usize,
}

impl Transform for FailingAt {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        _last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        self.calls += 1;
        if self.calls >= self.fail_on {
            return Err(Error::io("simulated transform failure"));
        }
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok((n, n, ProcessOutcome::Produced))
    }
}

/// Raises one callout before passing anything through.
struct Gated {
    asked: bool,
}

impl Transform for Gated {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        if !self.asked {
            self.asked = true;
            let payload: Box<String> = Box::new("need-key".to_string());
            return Ok((0, 0, ProcessOutcome::Callout(payload)));
        }
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        let outcome = if last && n == input.len() {
            ProcessOutcome::Finished
        } else if n < input.len() {
            ProcessOutcome::Produced
        } else {
            ProcessOutcome::NeedInput
        };
        Ok((n, n, outcome))
    }
}

/// Finishes immediately, counting how often the engine re-enters it.
struct FinishOnce {
    calls: Rc<Cell<usize>>,
}

impl Transform for FinishOnce {
    fn name(&self) -> &'static str {
        "finish-once"
    }

    fn process(
        &mut self,
        _input: &[u8],
        _output: &mut [u8],
        _last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        self.calls.set(self.calls.get() + 1);
        Ok((0, 0, ProcessOutcome::Finished))
    }
}

/// Consumes input only in whole two-byte blocks until the end of input.
struct Pairs {
    calls: Rc<Cell<usize>>,
}

impl Transform for Pairs {
    fn name(&self) -> &'static str {
        "pairs"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        self.calls.set(self.calls.get() + 1);
        let mut n = input.len().min(output.len());
        if !last {
            n -= n % 2;
        }
        output[..n].copy_from_slice(&input[..n]);
        let outcome = if last && n == input.len() {
            ProcessOutcome::Finished
        } else if n == 0 {
            ProcessOutcome::NeedInput
        } else {
            ProcessOutcome::Produced
        };
        Ok((n, n, outcome))
    }

    fn min_lookahead(&self) -> usize {
        2
    }
}

/// Identity transform that declares a large look-ahead requirement.
struct WideLookahead;

impl Transform for WideLookahead {
    fn name(&self) -> &'static str {
        "wide"
    }

    fn process(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        last: bool,
    ) -> Result<(usize, usize, ProcessOutcome)> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        let outcome = if last && n == input.len() {
            ProcessOutcome::Finished
        } else if n < input.len() {
            ProcessOutcome::Produced
        } else {
            ProcessOutcome::NeedInput
        };
        Ok((n, n, outcome))
    }

    fn min_lookahead(&self) -> usize {
        1024
    }
}

#[test]
fn test_read_filter_decodes_source() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"abc".to_vec());
    let front = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (6, EndStatus::EndOfData));
    assert_eq!(&out[..6], b"aabbcc");

    reg.close_filters(front, None).unwrap();
    assert!(reg.is_empty());
}

#[test]
fn test_write_filter_encodes_into_leaf() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_writer(vec![0u8; 32].into_boxed_slice());
    let front = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();

    let (n, status) = reg.write(front, b"abc").unwrap();
    assert_eq!((n, status), (3, EndStatus::Normal));

    reg.close_filters(front, Some(leaf)).unwrap();
    assert!(!reg.contains(front));

    let storage = reg.close(leaf).unwrap().unwrap();
    assert_eq!(&storage[..6], b"aabbcc");
}

#[test]
fn test_write_filter_emits_trailer_on_close() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_writer(vec![0u8; 32].into_boxed_slice());
    let front = reg
        .attach_filter(leaf, Box::new(Trailing { done: false }), None)
        .unwrap();

    reg.write(front, b"payload").unwrap();
    reg.close_filters(front, Some(leaf)).unwrap();

    let storage = reg.close(leaf).unwrap().unwrap();
    assert_eq!(&storage[..8], b"payload!");
}

#[test]
fn test_bytes_before_failure_stay_readable() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"abcd".to_vec());
    let front = reg
        .attach_filter(leaf, Box::new(FailingAt { calls: 0, fail_on: 2 }), None)
        .unwrap();

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (4, EndStatus::Error));
    assert_eq!(&out[..4], b"abcd");

    // the fault replays without re-entering the transform
    let err = reg.read_byte(front).unwrap_err();
    assert!(matches!(&err, Error::Faulted(m) if m.contains("simulated transform failure")));
    let err = reg.read_byte(front).unwrap_err();
    assert!(matches!(err, Error::Faulted(_)));
}

#[test]
fn test_reset_clears_fault() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"abcd".to_vec());
    let front = reg
        .attach_filter(leaf, Box::new(FailingAt { calls: 0, fail_on: 1 }), None)
        .unwrap();

    assert!(reg.read_byte(front).is_err());
    assert_eq!(reg.status(front).unwrap(), EndStatus::Error);

    reg.reset(front).unwrap();
    assert_eq!(reg.status(front).unwrap(), EndStatus::Normal);
}

#[test]
fn test_callout_surfaces_payload_and_resumes() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"secret".to_vec());
    let front = reg
        .attach_filter(leaf, Box::new(Gated { asked: false }), None)
        .unwrap();

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (0, EndStatus::CalloutRequired));

    let payload = reg.take_callout(front).unwrap().expect("payload present");
    let msg = payload.downcast::<String>().expect("string payload");
    assert_eq!(*msg, "need-key");

    // reinvoking the operation resumes the transform
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (6, EndStatus::EndOfData));
    assert_eq!(&out[..6], b"secret");
}

#[test]
fn test_end_of_data_is_sticky_without_reentry() {
    let calls = Rc::new(Cell::new(0));
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(Vec::new());
    let front = reg
        .attach_filter(
            leaf,
            Box::new(FinishOnce {
                calls: Rc::clone(&calls),
            }),
            None,
        )
        .unwrap();

    assert_eq!(reg.read_byte(front).unwrap(), None);
    assert_eq!(reg.read_byte(front).unwrap(), None);
    assert_eq!(reg.read_byte(front).unwrap(), None);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_teardown_stops_at_boundary() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"xy".to_vec());
    let mid = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();
    let front = reg.attach_filter(mid, Box::new(Doubling), None).unwrap();

    reg.close_filters(front, Some(mid)).unwrap();
    assert!(!reg.contains(front));
    assert!(reg.contains(mid));
    assert!(reg.contains(leaf));

    // the boundary stream is still functional
    let mut out = vec![0u8; 8];
    let (n, _) = reg.read(mid, &mut out).unwrap();
    assert_eq!(&out[..n], b"xxyy");

    reg.close_filters(mid, None).unwrap();
    assert!(reg.is_empty());
}

#[test]
fn test_teardown_boundary_is_a_no_op_at_front() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"z".to_vec());
    let front = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();

    reg.close_filters(front, Some(front)).unwrap();
    assert!(reg.contains(front));
    assert!(reg.contains(leaf));
}

#[test]
fn test_teardown_rejects_foreign_boundary() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"z".to_vec());
    let front = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();
    let other = reg.open_memory_transient(b"q".to_vec());

    assert!(reg.close_filters(front, Some(other)).is_err());
    // nothing was closed
    assert!(reg.contains(front));
    assert!(reg.contains(leaf));
}

#[test]
fn test_lookahead_inserts_buffering_stage() {
    let mut reg = StreamRegistry::new();
    // tiny source buffer, far below the declared look-ahead
    let leaf = reg.open_memory_transient(b"pass through".to_vec());
    let front = reg
        .attach_filter(leaf, Box::new(WideLookahead), None)
        .unwrap();

    let stage = reg.target(front).unwrap().expect("front is a filter");
    assert_ne!(stage, leaf);
    assert_eq!(reg.target(stage).unwrap(), Some(leaf));

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (12, EndStatus::EndOfData));
    assert_eq!(&out[..n], b"pass through");

    reg.close_filters(front, None).unwrap();
    assert!(reg.is_empty());
}

#[test]
fn test_block_transform_gets_short_tail_as_last() {
    let calls = Rc::new(Cell::new(0));
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"abc".to_vec());
    let front = reg
        .attach_filter(
            leaf,
            Box::new(Pairs {
                calls: Rc::clone(&calls),
            }),
            None,
        )
        .unwrap();

    let mut out = vec![0u8; 8];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (3, EndStatus::EndOfData));
    assert_eq!(&out[..3], b"abc");
    // the odd tail arrived once the source reported its end, without the
    // engine spinning on the transform
    assert!(calls.get() <= 4, "transform re-entered {} times", calls.get());
}

#[test]
fn test_block_transform_drains_file_with_small_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("odd.bin");
    let data: Vec<u8> = (0..33u8).collect();
    std::fs::write(&path, &data).unwrap();

    let calls = Rc::new(Cell::new(0));
    let mut reg = StreamRegistry::new();
    // odd buffer size, so every refill leaves an unconsumed tail to carry
    let leaf = reg.open_file_with(&path, Modes::READ, 17).unwrap();
    let front = reg
        .attach_filter(
            leaf,
            Box::new(Pairs {
                calls: Rc::clone(&calls),
            }),
            None,
        )
        .unwrap();

    let mut out = vec![0u8; 64];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (33, EndStatus::EndOfData));
    assert_eq!(&out[..n], &data[..]);
}

#[test]
fn test_read_stage_accepts_small_caller_storage() {
    // a read stage's storage is its output buffer; the look-ahead
    // requirement concerns the target side only
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"pass through".to_vec());
    let front = reg
        .attach_filter(
            leaf,
            Box::new(WideLookahead),
            Some(vec![0u8; 8].into_boxed_slice()),
        )
        .unwrap();

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (12, EndStatus::EndOfData));
    assert_eq!(&out[..n], b"pass through");
}

#[test]
fn test_filter_refuses_seek_and_confinement() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"data".to_vec());
    let front = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();

    assert!(matches!(reg.seek(front, 0), Err(Error::Unsupported(_))));
    assert!(matches!(
        reg.confine(front, 0, 2),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        reg.switch_mode(front, true),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_chained_decode_applies_stages_in_order() {
    let mut reg = StreamRegistry::new();
    let leaf = reg.open_memory_transient(b"ab".to_vec());
    let mid = reg.attach_filter(leaf, Box::new(Doubling), None).unwrap();
    let front = reg.attach_filter(mid, Box::new(Doubling), None).unwrap();

    let mut out = vec![0u8; 16];
    let (n, status) = reg.read(front, &mut out).unwrap();
    assert_eq!((n, status), (8, EndStatus::EndOfData));
    assert_eq!(&out[..8], b"aaaabbbb");
}
