//! The live-stream registry: an arena of slots addressed by
//! generation-checked handles.
//!
//! One registry belongs to one interpreter/session context. The model is
//! single-threaded and cooperative, so slot bookkeeping needs no
//! synchronization; the generation counter is what detects references to
//! closed streams (the registry-native replacement for per-stream validity
//! serials).

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;

use vassago_core::{EndStatus, Error, Modes, Result, StreamConfig};

use crate::buffer::Storage;
use crate::stream::{reusable_storage, transient_storage, Stream};

/// Handle to a stream slot. Stale after the stream is closed: the slot's
/// generation is bumped, so old handles fail with
/// [`Error::StaleHandle`](vassago_core::Error::StaleHandle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

struct Slot {
    generation: u32,
    stream: Option<Box<Stream>>,
}

/// Arena of live streams plus the engine's operation surface.
///
/// All stream operations are methods on the registry so that a filter stage
/// and its target can be visited in one call without aliasing: the engine
/// temporarily takes a stream out of its slot while a transform runs.
pub struct StreamRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    config: StreamConfig,
}

impl StreamRegistry {
    /// Create an empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: StreamConfig) -> Self {
        StreamRegistry {
            slots: Vec::new(),
            free: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of live streams.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` still refers to a live stream.
    pub fn contains(&self, id: StreamId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.stream.is_some())
    }

    /// Iterate over the handles of all live streams.
    pub fn live_streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.stream.as_ref().map(|_| StreamId {
                index: i as u32,
                generation: slot.generation,
            })
        })
    }

    // ---- slot management ----

    pub(crate) fn insert(&mut self, stream: Stream) -> StreamId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.stream = Some(Box::new(stream));
            StreamId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                stream: Some(Box::new(stream)),
            });
            StreamId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    pub(crate) fn get(&self, id: StreamId) -> Result<&Stream> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.stream.as_deref())
            .ok_or(Error::StaleHandle)
    }

    pub(crate) fn get_mut(&mut self, id: StreamId) -> Result<&mut Stream> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.stream.as_deref_mut())
            .ok_or(Error::StaleHandle)
    }

    /// Take a stream out of its slot while its transform runs. The slot
    /// stays reserved (same generation) until `put_back`.
    pub(crate) fn take(&mut self, id: StreamId) -> Result<Box<Stream>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.stream.take())
            .ok_or(Error::StaleHandle)
    }

    pub(crate) fn put_back(&mut self, id: StreamId, stream: Box<Stream>) {
        let slot = &mut self.slots[id.index as usize];
        debug_assert!(slot.generation == id.generation && slot.stream.is_none());
        slot.stream = Some(stream);
    }

    fn release_slot(&mut self, id: StreamId) {
        let slot = &mut self.slots[id.index as usize];
        slot.stream = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    // ---- opening leaf streams ----

    /// Open a file-backed stream with the requested access modes.
    ///
    /// Write mode without read or append truncates; append implies create.
    pub fn open_file(&mut self, path: impl AsRef<Path>, modes: Modes) -> Result<StreamId> {
        self.open_file_with(path, modes, self.config.buffer_size)
    }

    /// Open a file-backed stream with an explicit buffer size.
    pub fn open_file_with(
        &mut self,
        path: impl AsRef<Path>,
        modes: Modes,
        buffer_size: usize,
    ) -> Result<StreamId> {
        if !modes.is_reading() && !modes.is_writing() {
            return Err(Error::Unsupported("file stream needs read or write mode"));
        }
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(modes.is_reading());
        if modes.is_appending() {
            options.append(true).create(true);
        } else if modes.is_writing() {
            options.write(true).create(true);
            if !modes.is_reading() {
                options.truncate(true);
            }
        }
        let mut file = options.open(path)?;
        let append_pos = if modes.is_appending() {
            Some(file.seek(SeekFrom::End(0))?)
        } else {
            None
        };

        let buffer_size = vassago_core::clamp_buffer_size(buffer_size);
        let mut stream = if modes.is_writing() {
            Stream::file_writer(file, modes, modes, buffer_size)
        } else {
            Stream::file_reader(file, modes, modes, buffer_size)
        };
        if let Some(pos) = append_pos {
            stream.position = pos;
        }
        stream.filename = Some(path.to_string_lossy().into_owned());

        let id = self.insert(stream);
        tracing::debug!(?id, path = %path.display(), ?modes, "opened file stream");
        Ok(id)
    }

    /// Open a read stream over reference-counted storage. Supports
    /// unlimited reset and reread; no copy is made, and the allocation is
    /// freed when the last holder drops it.
    pub fn open_memory_reusable(&mut self, data: Rc<[u8]>) -> StreamId {
        let (storage, len) = reusable_storage(data);
        let id = self.insert(Stream::memory_reader(storage, len));
        tracing::debug!(?id, len, "opened reusable memory stream");
        id
    }

    /// Open a read stream that takes ownership of `data`. The backing
    /// allocation is released exactly once, at close.
    pub fn open_memory_transient(&mut self, data: Vec<u8>) -> StreamId {
        let (storage, len) = transient_storage(data);
        let id = self.insert(Stream::memory_reader(storage, len));
        tracing::debug!(?id, len, "opened transient memory stream");
        id
    }

    /// Open a write stream over caller-supplied storage. The storage is
    /// handed back (not dropped) when the stream closes.
    pub fn open_memory_writer(&mut self, storage: Box<[u8]>) -> StreamId {
        let id = self.insert(Stream::memory_writer(Storage::Foreign(storage)));
        tracing::debug!(?id, "opened memory write stream");
        id
    }

    // ---- shared accessors ----

    /// Current end status.
    pub fn status(&self, id: StreamId) -> Result<EndStatus> {
        Ok(self.get(id)?.status)
    }

    /// Access modes.
    pub fn modes(&self, id: StreamId) -> Result<Modes> {
        Ok(self.get(id)?.modes)
    }

    /// The filter's target, `None` for leaf adapters.
    pub fn target(&self, id: StreamId) -> Result<Option<StreamId>> {
        Ok(self.get(id)?.target())
    }

    /// Set the stream's file-name metadata (copied).
    pub fn set_filename(&mut self, id: StreamId, name: &str) -> Result<()> {
        self.get_mut(id)?.filename = Some(name.to_string());
        Ok(())
    }

    /// The stream's file-name metadata, if any.
    pub fn filename(&self, id: StreamId) -> Result<Option<&str>> {
        Ok(self.get(id)?.filename.as_deref())
    }

    /// Take the payload left by the last callout on this stream, if any.
    pub fn take_callout(&mut self, id: StreamId) -> Result<Option<vassago_core::CalloutPayload>> {
        Ok(self.get_mut(id)?.take_callout())
    }

    // ---- closing ----

    /// Close a single stream: flush if writing, release the buffer per its
    /// ownership regime, detach, and invalidate the handle.
    ///
    /// Idempotent: closing an already-closed handle is a no-op. Returns
    /// caller-supplied (foreign) storage, if the stream held any.
    pub fn close(&mut self, id: StreamId) -> Result<Option<Box<[u8]>>> {
        if !self.contains(id) {
            return Ok(None);
        }
        let mut stream = self.take(id)?;
        if stream.modes.is_writing() && stream.status == EndStatus::Normal {
            // Push remaining output downstream; a failing sink must not
            // keep the stream's resources alive.
            if let Err(e) = self.finish_write(&mut stream) {
                tracing::warn!(?id, error = %e, "flush during close failed");
            }
        }
        let Stream { buf, backend, .. } = *stream;
        drop(backend);
        let reclaimed = buf.into_reclaimed();
        self.release_slot(id);
        tracing::debug!(?id, "closed stream");
        Ok(reclaimed)
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_detection() {
        let mut reg = StreamRegistry::new();
        let id = reg.open_memory_transient(b"abc".to_vec());
        assert!(reg.contains(id));

        reg.close(id).unwrap();
        assert!(!reg.contains(id));
        assert!(matches!(reg.status(id), Err(Error::StaleHandle)));
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut reg = StreamRegistry::new();
        let first = reg.open_memory_transient(b"a".to_vec());
        reg.close(first).unwrap();

        let second = reg.open_memory_transient(b"b".to_vec());
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert!(!reg.contains(first));
        assert!(reg.contains(second));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reg = StreamRegistry::new();
        let id = reg.open_memory_transient(b"once".to_vec());
        assert!(reg.close(id).unwrap().is_none());
        assert!(reg.close(id).unwrap().is_none());
    }

    #[test]
    fn test_live_stream_iteration() {
        let mut reg = StreamRegistry::new();
        let a = reg.open_memory_transient(b"a".to_vec());
        let b = reg.open_memory_transient(b"b".to_vec());
        let live: Vec<_> = reg.live_streams().collect();
        assert_eq!(live, vec![a, b]);

        reg.close(a).unwrap();
        let live: Vec<_> = reg.live_streams().collect();
        assert_eq!(live, vec![b]);
    }

    #[test]
    fn test_filename_metadata_is_copied() {
        let mut reg = StreamRegistry::new();
        let id = reg.open_memory_transient(b"x".to_vec());
        let name = String::from("embedded/resource-7");
        reg.set_filename(id, &name).unwrap();
        drop(name);
        assert_eq!(reg.filename(id).unwrap(), Some("embedded/resource-7"));
    }
}
