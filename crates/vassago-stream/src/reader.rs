//! The read path: per-byte fast path, bulk reads, and buffer refill.
//!
//! Refill bottoms out at a leaf adapter performing real I/O; filter stages
//! pull from their target's buffer recursively. Terminal statuses are set by
//! the stage that hits them and observed by stages above only once their own
//! buffered look-ahead is exhausted.

use std::io::Read;

use vassago_core::{EndStatus, Error, ProcessOutcome, Result};

use crate::registry::{StreamId, StreamRegistry};
use crate::stream::{Backend, Stream};

impl StreamRegistry {
    /// Read one byte.
    ///
    /// `Ok(None)` is the end-of-data sentinel; a faulted stream replays its
    /// failure as `Err`. The hot case is a direct cursor hit with no
    /// dispatch; everything else falls through to the generic path, which
    /// delivers identical bytes with identical cursor movement.
    #[inline]
    pub fn read_byte(&mut self, id: StreamId) -> Result<Option<u8>> {
        let s = self.get_mut(id)?;
        if s.modes.is_reading() {
            if let Some(b) = s.buf.get_byte_fast() {
                return Ok(Some(b));
            }
        }
        self.read_byte_slow(id)
    }

    fn read_byte_slow(&mut self, id: StreamId) -> Result<Option<u8>> {
        {
            let s = self.get_mut(id)?;
            if !s.modes.is_reading() {
                return Err(Error::Unsupported("read on a non-reading stream"));
            }
            // Reinvocation after a callout resumes the transform.
            if s.status == EndStatus::CalloutRequired && s.buf.remaining() == 0 {
                s.status = EndStatus::Normal;
            }
        }
        loop {
            let s = self.get_mut(id)?;
            if s.buf.remaining() > 0 {
                let b = s.buf.take_byte();
                s.buf.check_invariant();
                return Ok(Some(b));
            }
            match s.status {
                EndStatus::Normal => self.fill_read(id)?,
                EndStatus::EndOfData => return Ok(None),
                EndStatus::Error => return Err(s.fault_error()),
                EndStatus::CalloutRequired => return Err(Error::CalloutPending),
                EndStatus::Interrupted => return Err(Error::io("transfer interrupted")),
            }
        }
    }

    /// Bulk read into `out`.
    ///
    /// Returns the transferred count and the completion status: `Normal`
    /// when the request was satisfied, otherwise whatever stopped the
    /// transfer early. Bytes buffered before a failure are still delivered.
    pub fn read(&mut self, id: StreamId, out: &mut [u8]) -> Result<(usize, EndStatus)> {
        {
            let s = self.get_mut(id)?;
            if !s.modes.is_reading() {
                return Err(Error::Unsupported("read on a non-reading stream"));
            }
            if s.status == EndStatus::CalloutRequired && s.buf.remaining() == 0 {
                s.status = EndStatus::Normal;
            }
        }
        let mut n = 0;
        loop {
            let s = self.get_mut(id)?;
            n += s.buf.copy_out(&mut out[n..]);
            s.buf.check_invariant();
            if n == out.len() {
                return Ok((n, EndStatus::Normal));
            }
            match s.status {
                EndStatus::Normal => self.fill_read(id)?,
                status => return Ok((n, status)),
            }
        }
    }

    /// Discard up to `count` bytes. Seekable streams reposition without
    /// touching the bytes in between; everything else reads through the
    /// pipeline and drops them.
    ///
    /// Returns how many bytes were actually skipped and the status that
    /// stopped the skip short, if any.
    pub fn skip(&mut self, id: StreamId, count: u64) -> Result<(u64, EndStatus)> {
        {
            let s = self.get_mut(id)?;
            if !s.modes.is_reading() {
                return Err(Error::Unsupported("skip on a non-reading stream"));
            }
            if s.status == EndStatus::CalloutRequired && s.buf.remaining() == 0 {
                s.status = EndStatus::Normal;
            }
        }
        {
            let s = self.get(id)?;
            if s.modes.can_seek() && s.status == EndStatus::Normal {
                return self.skip_by_seeking(id, count);
            }
        }
        let mut left = count;
        loop {
            let s = self.get_mut(id)?;
            let take = (s.buf.remaining() as u64).min(left);
            s.buf.consume(take as usize);
            left -= take;
            if left == 0 {
                return Ok((count, EndStatus::Normal));
            }
            match s.status {
                EndStatus::Normal => self.fill_read(id)?,
                status => return Ok((count - left, status)),
            }
        }
    }

    fn skip_by_seeking(&mut self, id: StreamId, count: u64) -> Result<(u64, EndStatus)> {
        let pos = self.get(id)?.logical_pos();
        // Seekable streams are leaves, so the remainder is always known.
        let left = self.available(id)?.unwrap_or(0);
        if count <= left {
            self.seek(id, pos + count)?;
            Ok((count, EndStatus::Normal))
        } else {
            self.seek(id, pos + left)?;
            self.get_mut(id)?.status = EndStatus::EndOfData;
            Ok((left, EndStatus::EndOfData))
        }
    }

    /// Move the read cursor back one delivered byte. Valid at most once per
    /// byte and never across a refill.
    pub fn unread_byte(&mut self, id: StreamId) -> Result<()> {
        let s = self.get_mut(id)?;
        if !s.modes.is_reading() {
            return Err(Error::Unsupported("unread on a non-reading stream"));
        }
        let base = match &s.backend {
            Backend::Memory(m) => m.base,
            _ => 0,
        };
        if s.buf.pos() > base {
            s.buf.unread();
            Ok(())
        } else {
            Err(Error::io("no byte to unread"))
        }
    }

    /// Bytes known ready without blocking, or `None` if unknown (filter
    /// stages cannot predict their transform's output).
    pub fn available(&self, id: StreamId) -> Result<Option<u64>> {
        let s = self.get(id)?;
        if !s.modes.is_reading() {
            return Err(Error::Unsupported("available on a non-reading stream"));
        }
        match &s.backend {
            Backend::Memory(_) => Ok(Some(s.buf.remaining() as u64)),
            Backend::Filter(_) => Ok(None),
            Backend::File(leaf) => {
                let buffered = s.buf.remaining() as u64;
                let past_buffer = s.position + s.buf.limit() as u64;
                let window = match leaf.window_len() {
                    Some(len) => len,
                    None => leaf.file.metadata()?.len().saturating_sub(leaf.start),
                };
                Ok(Some(buffered + window.saturating_sub(past_buffer)))
            }
        }
    }

    // ---- refill ----

    /// Refill a read buffer from the stream's source, updating the end
    /// status from the outcome. Unread bytes are kept: a call with a
    /// partially consumed buffer tops it up, so a transform that needs
    /// deeper look-ahead can see a longer run.
    pub(crate) fn fill_read(&mut self, id: StreamId) -> Result<()> {
        if matches!(self.get(id)?.backend, Backend::Filter(_)) {
            return self.fill_filter_read(id);
        }
        let s = self.get_mut(id)?;
        if matches!(s.backend, Backend::Memory(_)) {
            // The buffer is the whole source; no more bytes will arrive.
            s.status = EndStatus::EndOfData;
        } else {
            fill_file_read(s);
        }
        Ok(())
    }

    fn fill_filter_read(&mut self, id: StreamId) -> Result<()> {
        let mut s = self.take(id)?;
        let result = self.run_filter_read(&mut s);
        self.put_back(id, s);
        result
    }

    /// One refill step for a filter stage: pull from the target, run the
    /// transform into our own buffer, derive the end status.
    fn run_filter_read(&mut self, s: &mut Stream) -> Result<()> {
        s.position += s.buf.pos() as u64;
        s.buf.compact();
        let tid = match &s.backend {
            Backend::Filter(stage) => stage.target,
            _ => unreachable!("filter refill on a leaf"),
        };

        loop {
            if self.get(tid)?.buf.remaining() == 0 {
                match self.get(tid)?.status {
                    EndStatus::Normal => {
                        self.fill_read(tid)?;
                        let t = self.get_mut(tid)?;
                        if t.buf.remaining() == 0 {
                            match t.status {
                                EndStatus::Error => {
                                    let fault = t.fault.clone().unwrap_or_default();
                                    s.set_fault(fault);
                                    return Ok(());
                                }
                                EndStatus::CalloutRequired => {
                                    s.callout = t.callout.take();
                                    s.status = EndStatus::CalloutRequired;
                                    return Ok(());
                                }
                                _ => {}
                            }
                        }
                    }
                    // A callout observed on a previous invocation: the
                    // caller has reinvoked us, so resume the target.
                    EndStatus::CalloutRequired => {
                        self.get_mut(tid)?.status = EndStatus::Normal;
                        continue;
                    }
                    EndStatus::Error => {
                        let fault = self.get(tid)?.fault.clone().unwrap_or_default();
                        s.set_fault(fault);
                        return Ok(());
                    }
                    EndStatus::EndOfData | EndStatus::Interrupted => {}
                }
            }

            let t = self.get_mut(tid)?;
            let last = t.status == EndStatus::EndOfData;
            let step = {
                let Backend::Filter(stage) = &mut s.backend else {
                    unreachable!()
                };
                stage.transform.process(t.buf.readable(), s.buf.free_space(), last)
            };
            match step {
                Err(e) => {
                    s.set_fault(e.to_string());
                    return Ok(());
                }
                Ok((consumed, produced, outcome)) => {
                    t.buf.consume(consumed);
                    s.buf.extend_filled(produced);
                    t.buf.check_invariant();
                    s.buf.check_invariant();
                    match outcome {
                        ProcessOutcome::Produced => {
                            if s.buf.remaining() > 0 {
                                return Ok(());
                            }
                        }
                        ProcessOutcome::NeedInput => {
                            if s.buf.remaining() > 0 {
                                return Ok(());
                            }
                            if consumed == 0 && produced == 0 {
                                if last {
                                    // The transform ignored the end marker;
                                    // stop rather than spin.
                                    s.status = EndStatus::EndOfData;
                                    return Ok(());
                                }
                                // A short tail: the transform wants more
                                // look-ahead than the target holds right
                                // now. Top the target up in place so new
                                // bytes append to the unconsumed remainder.
                                match self.get(tid)?.status {
                                    EndStatus::Normal => {
                                        let before = self.get(tid)?.buf.remaining();
                                        self.fill_read(tid)?;
                                        let t = self.get(tid)?;
                                        if t.status == EndStatus::Normal
                                            && t.buf.remaining() == before
                                        {
                                            s.set_fault(
                                                "transform needs more look-ahead than its buffer holds"
                                                    .to_string(),
                                            );
                                            return Ok(());
                                        }
                                    }
                                    EndStatus::Error => {
                                        let fault =
                                            self.get(tid)?.fault.clone().unwrap_or_default();
                                        s.set_fault(fault);
                                        return Ok(());
                                    }
                                    EndStatus::CalloutRequired => {
                                        let t = self.get_mut(tid)?;
                                        match t.callout.take() {
                                            Some(payload) => {
                                                s.callout = Some(payload);
                                                s.status = EndStatus::CalloutRequired;
                                                return Ok(());
                                            }
                                            // Already serviced; resume the
                                            // target on the next pass.
                                            None => t.status = EndStatus::Normal,
                                        }
                                    }
                                    EndStatus::EndOfData | EndStatus::Interrupted => {}
                                }
                            }
                        }
                        ProcessOutcome::Finished => {
                            s.status = EndStatus::EndOfData;
                            return Ok(());
                        }
                        ProcessOutcome::Callout(payload) => {
                            s.callout = Some(payload);
                            s.status = EndStatus::CalloutRequired;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Refill a file leaf's buffer, honoring the visible window. Unread bytes
/// are compacted to the front and kept, so the call also tops up a short
/// tail. I/O failures become the sticky error state rather than unwinding:
/// bytes already in the buffer stay readable and the fault surfaces at
/// drain time.
fn fill_file_read(s: &mut Stream) {
    s.position += s.buf.pos() as u64;
    s.buf.compact();

    let Backend::File(leaf) = &mut s.backend else {
        unreachable!("file refill on a non-file stream")
    };
    let buffered_end = s.position + s.buf.limit() as u64;
    if let Some(len) = leaf.window_len() {
        if len <= buffered_end {
            s.status = EndStatus::EndOfData;
            return;
        }
    }
    let space = s.buf.capacity() - s.buf.limit();
    let want = match leaf.window_len() {
        Some(len) => (space as u64).min(len - buffered_end) as usize,
        None => space,
    };
    if want == 0 {
        // buffer full; the caller has to consume first
        return;
    }

    loop {
        match leaf.file.read(&mut s.buf.free_space()[..want]) {
            Ok(0) => {
                s.status = EndStatus::EndOfData;
                return;
            }
            Ok(n) => {
                s.buf.extend_filled(n);
                s.buf.check_invariant();
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                s.set_fault(format!("I/O error: {e}"));
                return;
            }
        }
    }
}
