//! Control operations: flush, reset, seek/tell, mode switching, and
//! subfile confinement.

use std::io::{Seek, SeekFrom, Write};

use vassago_core::{EndStatus, Error, Modes, Result};

use crate::registry::{StreamId, StreamRegistry};
use crate::stream::Backend;

impl StreamRegistry {
    /// Flush a stream.
    ///
    /// Writing streams push buffered bytes toward the sink, cascading down
    /// the pipeline to the leaf. Reading streams discard remaining input
    /// through end-of-data, which leaves a shared target clean for the next
    /// consumer.
    pub fn flush(&mut self, id: StreamId) -> Result<()> {
        let s = self.get(id)?;
        if s.modes.is_writing() {
            self.flush_write_chain(id)
        } else if s.modes.is_reading() {
            self.drain_read_to_end(id)
        } else {
            Err(Error::Unsupported("flush on a closed stream"))
        }
    }

    fn flush_write_chain(&mut self, id: StreamId) -> Result<()> {
        let mut cur = id;
        loop {
            self.drain_write(cur)?;
            let s = self.get_mut(cur)?;
            if s.status == EndStatus::Error {
                return Err(s.fault_error());
            }
            match s.target() {
                Some(next) => cur = next,
                None => {
                    if let Backend::File(leaf) = &mut s.backend {
                        leaf.file.flush()?;
                    }
                    return Ok(());
                }
            }
        }
    }

    fn drain_read_to_end(&mut self, id: StreamId) -> Result<()> {
        loop {
            let s = self.get_mut(id)?;
            let buffered = s.buf.remaining();
            s.buf.consume(buffered);
            match s.status {
                EndStatus::Normal => self.fill_read(id)?,
                EndStatus::EndOfData => return Ok(()),
                EndStatus::Error => return Err(s.fault_error()),
                EndStatus::CalloutRequired => return Err(Error::CalloutPending),
                EndStatus::Interrupted => return Err(Error::io("transfer interrupted")),
            }
        }
    }

    /// Discard buffered content and clear any terminal status. Cannot fail
    /// beyond handle validation; a failed repositioning just leaves the
    /// buffer empty.
    pub fn reset(&mut self, id: StreamId) -> Result<()> {
        let s = self.get_mut(id)?;
        s.callout = None;
        s.fault = None;
        s.status = EndStatus::Normal;
        let reading = s.modes.is_reading();
        match &mut s.backend {
            Backend::Memory(m) => {
                if reading {
                    let limit = s.buf.limit();
                    s.buf.set_filled_at(m.base, limit - m.base);
                } else {
                    s.buf.reset_write();
                }
            }
            Backend::File(leaf) => {
                if reading {
                    let resident = s.buf.limit() as u64;
                    if s.modes.can_seek() && leaf.file.seek(SeekFrom::Start(leaf.start)).is_ok() {
                        s.position = 0;
                    } else {
                        s.position += resident;
                    }
                    s.buf.clear();
                } else {
                    s.buf.reset_write();
                }
            }
            Backend::Filter(_) => {
                if reading {
                    let resident = s.buf.limit() as u64;
                    s.position += resident;
                    s.buf.clear();
                } else {
                    s.buf.reset_write();
                }
            }
        }
        Ok(())
    }

    /// Logical position of the next byte read or written. Valid only with
    /// the `SEEK` mode flag.
    pub fn tell(&self, id: StreamId) -> Result<u64> {
        let s = self.get(id)?;
        if !s.modes.can_seek() {
            return Err(Error::Unsupported("tell on a non-seekable stream"));
        }
        Ok(s.logical_pos())
    }

    /// Set the logical position (window-relative for confined streams).
    ///
    /// Valid only with the `SEEK` mode flag. Buffered look-ahead is
    /// invalidated unless the target lands inside the current buffer, in
    /// which case only the cursor moves.
    pub fn seek(&mut self, id: StreamId, offset: u64) -> Result<()> {
        {
            let s = self.get(id)?;
            if !s.modes.can_seek() {
                return Err(Error::Unsupported("seek on a non-seekable stream"));
            }
            if s.status == EndStatus::Error {
                return Err(s.fault_error());
            }
        }
        if self.get(id)?.modes.is_writing() {
            self.drain_write(id)?;
            let s = self.get(id)?;
            if s.status == EndStatus::Error {
                return Err(s.fault_error());
            }
        }

        let s = self.get_mut(id)?;
        match &mut s.backend {
            Backend::Memory(m) => {
                let end = if s.modes.is_writing() {
                    s.buf.capacity()
                } else {
                    s.buf.limit()
                };
                let window = (end - m.base) as u64;
                if offset > window {
                    return Err(Error::range("seek offset", offset, 0, window));
                }
                s.buf.set_pos(m.base + offset as usize);
            }
            Backend::File(leaf) => {
                if let Some(len) = leaf.window_len() {
                    if offset > len {
                        return Err(Error::range("seek offset", offset, 0, len));
                    }
                }
                if s.modes.is_reading() {
                    let buf_start = s.position;
                    let buf_end = s.position + s.buf.limit() as u64;
                    if offset >= buf_start && offset <= buf_end {
                        s.buf.set_pos((offset - buf_start) as usize);
                    } else {
                        leaf.file.seek(SeekFrom::Start(leaf.start + offset))?;
                        s.position = offset;
                        s.buf.clear();
                    }
                } else {
                    // buffer was drained above
                    leaf.file.seek(SeekFrom::Start(leaf.start + offset))?;
                    s.position = offset;
                }
            }
            Backend::Filter(_) => {
                return Err(Error::Unsupported("seek on a filter stream"));
            }
        }
        s.status = EndStatus::Normal;
        Ok(())
    }

    /// Confine reading to `[start, start + length)` of the underlying
    /// source. Reads past the window report end-of-data even if more data
    /// exists upstream. Only valid before the stream's position has
    /// advanced; offsets become window-relative afterwards.
    pub fn confine(&mut self, id: StreamId, start: u64, length: u64) -> Result<()> {
        let s = self.get_mut(id)?;
        if !s.modes.is_reading() {
            return Err(Error::Unsupported("confinement applies to read streams"));
        }
        let end = start
            .checked_add(length)
            .ok_or_else(|| Error::range("confinement window", length, 0, u64::MAX - start))?;
        if s.position != 0 || s.logical_pos() != 0 {
            return Err(Error::range(
                "confinement position",
                s.logical_pos(),
                0,
                0,
            ));
        }
        match &mut s.backend {
            Backend::Memory(m) => {
                let total = s.buf.capacity() as u64;
                if end > total {
                    return Err(Error::range("confinement window", end, 0, total));
                }
                m.base = start as usize;
                s.buf.set_filled_at(start as usize, length as usize);
            }
            Backend::File(leaf) => {
                leaf.file.seek(SeekFrom::Start(start))?;
                leaf.start = start;
                leaf.limit = end;
                s.position = 0;
                s.buf.clear();
            }
            Backend::Filter(_) => {
                return Err(Error::Unsupported("confinement on a filter stream"));
            }
        }
        s.status = EndStatus::Normal;
        tracing::debug!(?id, start, length, "confined stream to subfile window");
        Ok(())
    }

    /// Flip a leaf stream between read and write against the same resource.
    /// Unsupported for filters, for shared read-only storage, and for file
    /// handles not opened with the requested access.
    pub fn switch_mode(&mut self, id: StreamId, to_write: bool) -> Result<()> {
        {
            let s = self.get(id)?;
            if matches!(s.backend, Backend::Filter(_)) {
                return Err(Error::Unsupported("mode switch on a filter stream"));
            }
        }
        // Leaving write mode on a file pushes buffered output first.
        let leaving_file_write = {
            let s = self.get(id)?;
            s.modes.is_writing() && !to_write && matches!(s.backend, Backend::File(_))
        };
        if leaving_file_write {
            self.drain_write(id)?;
            let s = self.get(id)?;
            if s.status == EndStatus::Error {
                return Err(s.fault_error());
            }
        }

        let s = self.get_mut(id)?;
        match &mut s.backend {
            Backend::Memory(m) => {
                if to_write && !s.buf.storage().is_mutable() {
                    return Err(Error::Unsupported("mode switch on shared read-only storage"));
                }
                if to_write == s.modes.is_writing() {
                    return Ok(());
                }
                if to_write {
                    s.modes.remove(Modes::READ);
                    s.modes.insert(Modes::WRITE);
                    s.buf.reset_write();
                } else {
                    // expose what was written for reading
                    let written = s.buf.written().len();
                    s.modes.remove(Modes::WRITE);
                    s.modes.insert(Modes::READ);
                    s.buf.set_filled_at(0, written);
                }
                m.base = 0;
            }
            Backend::File(leaf) => {
                let want = if to_write { Modes::WRITE } else { Modes::READ };
                if !leaf.os_modes.contains(want) {
                    return Err(Error::Unsupported("file handle not opened for that mode"));
                }
                if to_write == s.modes.is_writing() {
                    return Ok(());
                }
                // re-derive the OS cursor from the logical position
                let pos = s.position + s.buf.pos() as u64;
                leaf.file.seek(SeekFrom::Start(leaf.start + pos))?;
                s.position = pos;
                if to_write {
                    s.modes.remove(Modes::READ);
                    s.modes.insert(Modes::WRITE);
                    s.buf.reset_write();
                } else {
                    s.modes.remove(Modes::WRITE);
                    s.modes.insert(Modes::READ);
                    s.buf.clear();
                }
            }
            Backend::Filter(_) => unreachable!("filtered out above"),
        }
        s.status = EndStatus::Normal;
        s.fault = None;
        tracing::debug!(?id, to_write, "switched stream mode");
        Ok(())
    }
}
