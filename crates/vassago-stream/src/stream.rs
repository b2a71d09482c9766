//! The stream object: buffer, position bookkeeping, mode flags, end status,
//! and its backend.

use std::fs::File;
use std::rc::Rc;

use vassago_core::{CalloutPayload, EndStatus, Error, Modes, Transform};

use crate::buffer::{Buffer, Storage};
use crate::registry::StreamId;

/// File leaf state: an OS file handle plus the visible byte range.
///
/// `[start, limit)` restricts the range seen through the stream, for
/// embedded sub-resources inside a container file. `limit` defaults to the
/// representable maximum (unconfined).
pub(crate) struct FileLeaf {
    pub(crate) file: File,
    pub(crate) start: u64,
    pub(crate) limit: u64,
    /// Modes the OS handle was opened with; may be a superset of the
    /// stream's current modes (consulted by `switch_mode`).
    pub(crate) os_modes: Modes,
}

impl FileLeaf {
    /// Length of the visible window, `None` if unconfined.
    pub(crate) fn window_len(&self) -> Option<u64> {
        if self.limit == u64::MAX {
            None
        } else {
            Some(self.limit - self.start)
        }
    }
}

/// Memory leaf state. The stream's buffer *is* the source; `base` is the
/// storage index where the visible window starts.
pub(crate) struct MemoryLeaf {
    pub(crate) base: usize,
}

/// Filter stage state: the transform plus a non-owning link to the target.
pub(crate) struct FilterStage {
    pub(crate) transform: Box<dyn Transform>,
    pub(crate) target: StreamId,
}

/// What a stream is backed by.
pub(crate) enum Backend {
    File(FileLeaf),
    Memory(MemoryLeaf),
    Filter(FilterStage),
}

/// A buffered byte-oriented channel: a leaf adapter or a filter stage.
///
/// Streams live in a [`StreamRegistry`](crate::StreamRegistry) and are
/// addressed by generation-checked [`StreamId`] handles; closing a stream
/// frees its slot and invalidates outstanding handles.
pub struct Stream {
    pub(crate) buf: Buffer,
    /// Logical (window-relative) offset of the buffer's start.
    pub(crate) position: u64,
    pub(crate) status: EndStatus,
    pub(crate) modes: Modes,
    pub(crate) backend: Backend,
    pub(crate) filename: Option<String>,
    pub(crate) callout: Option<CalloutPayload>,
    /// Message replayed by every operation while `status` is `Error`.
    pub(crate) fault: Option<String>,
}

impl Stream {
    pub(crate) fn new(buf: Buffer, modes: Modes, backend: Backend) -> Self {
        Stream {
            buf,
            position: 0,
            status: EndStatus::Normal,
            modes,
            backend,
            filename: None,
            callout: None,
            fault: None,
        }
    }

    /// A reading file stream over `file`, visible range `[start, limit)`.
    pub(crate) fn file_reader(
        file: File,
        os_modes: Modes,
        modes: Modes,
        buffer_size: usize,
    ) -> Self {
        Stream::new(
            Buffer::owned(buffer_size),
            modes,
            Backend::File(FileLeaf {
                file,
                start: 0,
                limit: u64::MAX,
                os_modes,
            }),
        )
    }

    /// A writing file stream; `position` should be pre-set for append mode.
    pub(crate) fn file_writer(
        file: File,
        os_modes: Modes,
        modes: Modes,
        buffer_size: usize,
    ) -> Self {
        let mut buf = Buffer::owned(buffer_size);
        buf.reset_write();
        Stream::new(
            buf,
            modes,
            Backend::File(FileLeaf {
                file,
                start: 0,
                limit: u64::MAX,
                os_modes,
            }),
        )
    }

    /// A reading memory stream whose buffer is the whole source.
    pub(crate) fn memory_reader(storage: Storage, len: usize) -> Self {
        let mut buf = Buffer::from_storage(storage);
        buf.set_filled_at(0, len);
        Stream::new(
            buf,
            Modes::READ | Modes::SEEK,
            Backend::Memory(MemoryLeaf { base: 0 }),
        )
    }

    /// A writing memory stream over caller-supplied or transient storage.
    pub(crate) fn memory_writer(storage: Storage) -> Self {
        let mut buf = Buffer::from_storage(storage);
        buf.reset_write();
        Stream::new(
            buf,
            Modes::WRITE | Modes::SEEK,
            Backend::Memory(MemoryLeaf { base: 0 }),
        )
    }

    /// A filter stage in front of `target`.
    pub(crate) fn filter(
        transform: Box<dyn Transform>,
        target: StreamId,
        buf: Buffer,
        modes: Modes,
    ) -> Self {
        Stream::new(
            buf,
            modes,
            Backend::Filter(FilterStage { transform, target }),
        )
    }

    /// The next stream toward the leaf, present iff this is a filter stage.
    pub fn target(&self) -> Option<StreamId> {
        match &self.backend {
            Backend::Filter(stage) => Some(stage.target),
            _ => None,
        }
    }

    /// Current end status.
    pub fn status(&self) -> EndStatus {
        self.status
    }

    /// Access modes.
    pub fn modes(&self) -> Modes {
        self.modes
    }

    /// Logical stream position of the next byte read or written.
    pub(crate) fn logical_pos(&self) -> u64 {
        match &self.backend {
            Backend::Memory(m) => (self.buf.pos() - m.base) as u64,
            Backend::File(_) | Backend::Filter(_) => self.position + self.buf.pos() as u64,
        }
    }

    /// The error every operation replays while the stream is faulted.
    pub(crate) fn fault_error(&self) -> Error {
        Error::Faulted(
            self.fault
                .clone()
                .unwrap_or_else(|| "unspecified stream fault".to_string()),
        )
    }

    /// Transition into the sticky error state, keeping already-buffered
    /// bytes readable.
    pub(crate) fn set_fault(&mut self, message: String) {
        tracing::debug!(fault = %message, "stream entered error state");
        self.status = EndStatus::Error;
        self.fault = Some(message);
    }

    /// Take the payload left by the last callout, if any.
    pub fn take_callout(&mut self) -> Option<CalloutPayload> {
        self.callout.take()
    }
}

/// Construction helpers for memory sources.
pub(crate) fn reusable_storage(data: Rc<[u8]>) -> (Storage, usize) {
    let len = data.len();
    (Storage::Shared(data), len)
}

pub(crate) fn transient_storage(data: Vec<u8>) -> (Storage, usize) {
    let len = data.len();
    (Storage::Owned(data.into_boxed_slice()), len)
}
