//! The write path: per-byte fast path, bulk writes, and buffer drain.
//!
//! Draining visits pipeline stages back-to-front: a filter consumes its own
//! buffered bytes through the transform into the target's buffer, draining
//! the target when it fills, bottoming out at a leaf performing real I/O.

use std::io::Write;

use vassago_core::{EndStatus, Error, ProcessOutcome, Result};

use crate::registry::{StreamId, StreamRegistry};
use crate::stream::{Backend, Stream};

impl StreamRegistry {
    /// Write one byte. The hot case is a direct cursor store.
    #[inline]
    pub fn write_byte(&mut self, id: StreamId, byte: u8) -> Result<()> {
        let s = self.get_mut(id)?;
        if s.modes.is_writing() && s.status == EndStatus::Normal && s.buf.put_byte_fast(byte) {
            return Ok(());
        }
        self.write_byte_slow(id, byte)
    }

    fn write_byte_slow(&mut self, id: StreamId, byte: u8) -> Result<()> {
        {
            let s = self.get_mut(id)?;
            if !s.modes.is_writing() {
                return Err(Error::Unsupported("write on a non-writing stream"));
            }
            if s.status == EndStatus::CalloutRequired {
                s.status = EndStatus::Normal;
            }
        }
        loop {
            let s = self.get_mut(id)?;
            match s.status {
                EndStatus::Normal => {}
                EndStatus::EndOfData => return Err(Error::io("write past end of stream")),
                EndStatus::Error => return Err(s.fault_error()),
                EndStatus::CalloutRequired => return Err(Error::CalloutPending),
                EndStatus::Interrupted => return Err(Error::io("transfer interrupted")),
            }
            if s.buf.put_byte_fast(byte) {
                return Ok(());
            }
            self.drain_write(id)?;
            let s = self.get(id)?;
            if s.status == EndStatus::Normal && s.buf.remaining() == 0 {
                return Err(Error::io("stream buffer cannot accept data"));
            }
        }
    }

    /// Bulk write.
    ///
    /// Returns the accepted count and the completion status: `Normal` when
    /// everything was accepted, otherwise whatever stopped the transfer
    /// (e.g. `EndOfData` for a full fixed memory range).
    pub fn write(&mut self, id: StreamId, data: &[u8]) -> Result<(usize, EndStatus)> {
        {
            let s = self.get_mut(id)?;
            if !s.modes.is_writing() {
                return Err(Error::Unsupported("write on a non-writing stream"));
            }
            if s.status == EndStatus::CalloutRequired {
                s.status = EndStatus::Normal;
            }
        }
        let mut written = 0;
        loop {
            let s = self.get_mut(id)?;
            match s.status {
                EndStatus::Normal => {}
                status => return Ok((written, status)),
            }
            written += s.buf.put_slice(&data[written..]);
            s.buf.check_invariant();
            if written == data.len() {
                return Ok((written, EndStatus::Normal));
            }
            self.drain_write(id)?;
            let s = self.get(id)?;
            if s.status == EndStatus::Normal && s.buf.remaining() == 0 {
                return Ok((written, EndStatus::Normal));
            }
        }
    }

    // ---- drain ----

    /// Drain a write stream's buffered bytes toward the sink (non-final).
    pub(crate) fn drain_write(&mut self, id: StreamId) -> Result<()> {
        let mut s = self.take(id)?;
        let result = self.drain_stream_write(&mut s, false);
        self.put_back(id, s);
        result
    }

    /// Final drain at close time: emits the transform's trailer.
    pub(crate) fn finish_write(&mut self, s: &mut Stream) -> Result<()> {
        self.drain_stream_write(s, true)
    }

    pub(crate) fn drain_stream_write(&mut self, s: &mut Stream, last: bool) -> Result<()> {
        if matches!(s.backend, Backend::Filter(_)) {
            return self.run_filter_write(s, last);
        }
        if matches!(s.backend, Backend::Memory(_)) {
            // Data is already in place; a full fixed range simply ends.
            if s.buf.remaining() == 0 && !last {
                s.status = EndStatus::EndOfData;
            }
        } else {
            drain_file_write(s, last);
        }
        Ok(())
    }

    /// Push a filter stage's buffered bytes through the transform into the
    /// target's buffer. With `last` set, loops until the transform reports
    /// `Finished` so trailers get emitted.
    fn run_filter_write(&mut self, s: &mut Stream, last: bool) -> Result<()> {
        let tid = match &s.backend {
            Backend::Filter(stage) => stage.target,
            _ => unreachable!("filter drain on a leaf"),
        };

        loop {
            if s.buf.written().is_empty() && !last {
                return Ok(());
            }

            // Make room in the target before running the transform.
            {
                let t = self.get(tid)?;
                match t.status {
                    EndStatus::Normal | EndStatus::Interrupted => {}
                    EndStatus::EndOfData => {
                        s.set_fault("write target reached end of data".to_string());
                        return Ok(());
                    }
                    EndStatus::Error => {
                        let fault = self.get(tid)?.fault.clone().unwrap_or_default();
                        s.set_fault(fault);
                        return Ok(());
                    }
                    EndStatus::CalloutRequired => {
                        self.get_mut(tid)?.status = EndStatus::Normal;
                    }
                }
            }
            if self.get(tid)?.buf.remaining() == 0 {
                self.drain_write(tid)?;
                let t = self.get(tid)?;
                if t.buf.remaining() == 0 {
                    match t.status {
                        EndStatus::Error => {
                            let fault = t.fault.clone().unwrap_or_default();
                            s.set_fault(fault);
                        }
                        _ => s.set_fault("write target cannot accept data".to_string()),
                    }
                    return Ok(());
                }
            }

            let t = self.get_mut(tid)?;
            let step = {
                let Backend::Filter(stage) = &mut s.backend else {
                    unreachable!()
                };
                stage.transform.process(s.buf.written(), t.buf.writable(), last)
            };
            match step {
                Err(e) => {
                    s.set_fault(e.to_string());
                    return Ok(());
                }
                Ok((consumed, produced, outcome)) => {
                    t.buf.advance_written(produced);
                    s.buf.drain_written(consumed);
                    t.buf.check_invariant();
                    s.buf.check_invariant();
                    match outcome {
                        ProcessOutcome::Finished => {
                            s.status = EndStatus::EndOfData;
                            return Ok(());
                        }
                        ProcessOutcome::Callout(payload) => {
                            s.callout = Some(payload);
                            s.status = EndStatus::CalloutRequired;
                            return Ok(());
                        }
                        ProcessOutcome::Produced => {}
                        ProcessOutcome::NeedInput => {
                            if consumed == 0 && produced == 0 {
                                if !last {
                                    if s.buf.remaining() > 0 {
                                        // More input wanted than buffered;
                                        // return to the caller for it.
                                        return Ok(());
                                    }
                                    s.set_fault(
                                        "transform needs more look-ahead than its buffer holds"
                                            .to_string(),
                                    );
                                    return Ok(());
                                }
                                // The transform ignored the end marker.
                                s.status = EndStatus::EndOfData;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Write a file leaf's buffered bytes to the OS handle. I/O failures become
/// the sticky error state and surface on the next operation.
fn drain_file_write(s: &mut Stream, last: bool) {
    let data_len = s.buf.written().len();
    let Backend::File(leaf) = &mut s.backend else {
        unreachable!("file drain on a non-file stream")
    };
    if data_len > 0 {
        if let Err(e) = leaf.file.write_all(s.buf.written()) {
            s.set_fault(format!("I/O error: {e}"));
            return;
        }
        s.position += data_len as u64;
        s.buf.drain_written(data_len);
        s.buf.check_invariant();
    }
    if last {
        if let Err(e) = leaf.file.flush() {
            s.set_fault(format!("I/O error: {e}"));
        }
    }
}
