//! Buffer and cursor management for stream stages.

use std::rc::Rc;

/// Backing storage for a stream buffer, tagged with its release contract.
///
/// Exactly one of three regimes applies to every buffer:
///
/// - `Owned`: allocated by the stream, dropped at close.
/// - `Foreign`: supplied by the caller; the stream uses it but hands it back
///   at close instead of dropping it.
/// - `Shared`: reference-counted, read-only; freed when the last holder
///   drops it. Used by reusable memory sources.
pub enum Storage {
    /// Stream-allocated storage, released at close.
    Owned(Box<[u8]>),
    /// Caller-supplied storage, handed back at close.
    Foreign(Box<[u8]>),
    /// Reference-counted read-only storage.
    Shared(Rc<[u8]>),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(b) | Storage::Foreign(b) => b,
            Storage::Shared(r) => r,
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            Storage::Owned(b) | Storage::Foreign(b) => Some(b),
            Storage::Shared(_) => None,
        }
    }

    /// True if the storage can be written through.
    pub fn is_mutable(&self) -> bool {
        !matches!(self, Storage::Shared(_))
    }
}

/// A stream stage's buffer: storage plus a (pos, limit) cursor pair.
///
/// The cursor invariant `pos <= limit <= capacity` holds after every
/// operation. The two stream directions interpret the spans differently:
///
/// - read streams: valid data in `[pos, limit)`, refill space in
///   `[limit, capacity)`; resident bytes are `limit`.
/// - write streams: written data in `[0, pos)`, free space in
///   `[pos, limit)`; resident bytes are `pos`.
pub struct Buffer {
    storage: Storage,
    pos: usize,
    limit: usize,
}

impl Buffer {
    /// Allocate an owned, zeroed buffer, empty for reading.
    pub fn owned(capacity: usize) -> Self {
        Buffer {
            storage: Storage::Owned(vec![0u8; capacity].into_boxed_slice()),
            pos: 0,
            limit: 0,
        }
    }

    /// Wrap existing storage. The cursor starts empty for reading; callers
    /// position it with [`set_filled_at`](Self::set_filled_at) or
    /// [`reset_write`](Self::reset_write).
    pub fn from_storage(storage: Storage) -> Self {
        Buffer {
            storage,
            pos: 0,
            limit: 0,
        }
    }

    /// Total storage capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.as_slice().len()
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes between the cursor and the limit: unread data for read
    /// streams, free space for write streams.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Verify the cursor invariant. Debug builds assert it after every
    /// engine operation.
    #[inline]
    pub fn check_invariant(&self) {
        debug_assert!(
            self.pos <= self.limit && self.limit <= self.capacity(),
            "cursor invariant violated: pos={} limit={} capacity={}",
            self.pos,
            self.limit,
            self.capacity()
        );
    }

    // ---- read-side cursor operations ----

    /// Valid unread data.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.storage.as_slice()[self.pos..self.limit]
    }

    /// Consume `n` bytes from the read cursor.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.limit);
    }

    /// Take one byte; callers must have checked `remaining() > 0`.
    #[inline]
    pub fn take_byte(&mut self) -> u8 {
        let b = self.storage.as_slice()[self.pos];
        self.pos += 1;
        b
    }

    /// Fast single-byte read. Succeeds only while more than one byte
    /// remains before the limit: the final byte is reserved for the generic
    /// path so a filter can detect end-of-data one byte ahead.
    #[inline]
    pub fn get_byte_fast(&mut self) -> Option<u8> {
        if self.limit - self.pos > 1 {
            let b = self.storage.as_slice()[self.pos];
            self.pos += 1;
            Some(b)
        } else {
            None
        }
    }

    /// Move the read cursor back one byte. Valid once per delivered byte
    /// and never across a refill.
    #[inline]
    pub fn unread(&mut self) -> bool {
        if self.pos > 0 {
            self.pos -= 1;
            true
        } else {
            false
        }
    }

    /// Copy unread data into `out`, consuming it. Returns bytes copied.
    pub fn copy_out(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.remaining());
        if n > 0 {
            out[..n].copy_from_slice(&self.storage.as_slice()[self.pos..self.pos + n]);
            self.pos += n;
        }
        n
    }

    /// Refill space beyond the valid data.
    ///
    /// # Panics
    /// Panics if the storage is shared (shared buffers are never refilled;
    /// they *are* the source).
    pub fn free_space(&mut self) -> &mut [u8] {
        let limit = self.limit;
        let slice = self
            .storage
            .as_mut_slice()
            .expect("shared storage has no refill space");
        &mut slice[limit..]
    }

    /// Extend the valid region by `n` freshly produced bytes.
    #[inline]
    pub fn extend_filled(&mut self, n: usize) {
        self.limit = (self.limit + n).min(self.capacity());
    }

    /// Replace the valid region with `[base, base + n)`.
    #[inline]
    pub fn set_filled_at(&mut self, base: usize, n: usize) {
        self.pos = base;
        self.limit = (base + n).min(self.capacity());
    }

    /// Park the read cursor at `pos` (in-buffer seek).
    ///
    /// # Panics
    /// Panics if `pos` is past the limit.
    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        assert!(pos <= self.limit, "cursor past limit");
        self.pos = pos;
    }

    /// Empty the buffer (read side).
    #[inline]
    pub fn clear(&mut self) {
        self.pos = 0;
        self.limit = 0;
    }

    /// Move unread data to the front of the storage. O(1) extra space.
    pub fn compact(&mut self) {
        if self.pos > 0 {
            let (pos, limit) = (self.pos, self.limit);
            if let Some(slice) = self.storage.as_mut_slice() {
                slice.copy_within(pos..limit, 0);
            }
            self.limit -= pos;
            self.pos = 0;
        }
    }

    // ---- write-side cursor operations ----

    /// Open the whole storage for writing: written data will accumulate in
    /// `[0, pos)`.
    #[inline]
    pub fn reset_write(&mut self) {
        self.pos = 0;
        self.limit = self.capacity();
    }

    /// Bytes written so far.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.storage.as_slice()[..self.pos]
    }

    /// Free span for writing.
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        let (pos, limit) = (self.pos, self.limit);
        let slice = self
            .storage
            .as_mut_slice()
            .expect("shared storage is read-only");
        &mut slice[pos..limit]
    }

    /// Fast single-byte write while the cursor is short of the limit.
    #[inline]
    pub fn put_byte_fast(&mut self, b: u8) -> bool {
        if self.pos < self.limit {
            if let Some(slice) = self.storage.as_mut_slice() {
                slice[self.pos] = b;
                self.pos += 1;
                return true;
            }
        }
        false
    }

    /// Copy as much of `data` as fits, advancing the write cursor.
    pub fn put_slice(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        if n > 0 {
            let pos = self.pos;
            if let Some(slice) = self.storage.as_mut_slice() {
                slice[pos..pos + n].copy_from_slice(&data[..n]);
                self.pos += n;
            } else {
                return 0;
            }
        }
        n
    }

    /// Mark `n` bytes of the free span as written (after a transform
    /// produced directly into [`writable`](Self::writable)).
    #[inline]
    pub fn advance_written(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.limit);
    }

    /// Remove `n` bytes from the front of the written region, compacting
    /// what is left. O(1) extra space.
    pub fn drain_written(&mut self, n: usize) {
        let n = n.min(self.pos);
        if n > 0 {
            let pos = self.pos;
            if let Some(slice) = self.storage.as_mut_slice() {
                slice.copy_within(n..pos, 0);
            }
            self.pos -= n;
        }
    }

    // ---- storage ----

    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Release the storage per its regime: owned and shared storage is
    /// dropped (shared only decrements), foreign storage is handed back.
    pub fn into_reclaimed(self) -> Option<Box<[u8]>> {
        match self.storage {
            Storage::Foreign(b) => Some(b),
            Storage::Owned(_) | Storage::Shared(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_reserves_lookahead() {
        let mut buf = Buffer::owned(8);
        buf.free_space()[..3].copy_from_slice(b"abc");
        buf.extend_filled(3);

        assert_eq!(buf.get_byte_fast(), Some(b'a'));
        assert_eq!(buf.get_byte_fast(), Some(b'b'));
        // one byte left: reserved for the generic path
        assert_eq!(buf.get_byte_fast(), None);
        assert_eq!(buf.remaining(), 1);
        assert_eq!(buf.take_byte(), b'c');
        buf.check_invariant();
    }

    #[test]
    fn test_compact_preserves_unread() {
        let mut buf = Buffer::owned(16);
        buf.free_space()[..13].copy_from_slice(b"Hello, World!");
        buf.extend_filled(13);
        buf.consume(7);

        buf.compact();
        assert_eq!(buf.pos(), 0);
        assert_eq!(buf.readable(), b"World!");
        buf.check_invariant();
    }

    #[test]
    fn test_write_cursor() {
        let mut buf = Buffer::owned(8);
        buf.reset_write();

        assert!(buf.put_byte_fast(b'x'));
        assert_eq!(buf.put_slice(b"1234567"), 7);
        assert!(!buf.put_byte_fast(b'y'));
        assert_eq!(buf.written(), b"x1234567");

        buf.drain_written(4);
        assert_eq!(buf.written(), b"4567");
        buf.check_invariant();
    }

    #[test]
    fn test_shared_storage_is_read_only() {
        let data: Rc<[u8]> = Rc::from(&b"shared"[..]);
        let mut buf = Buffer::from_storage(Storage::Shared(Rc::clone(&data)));
        buf.set_filled_at(0, 6);

        assert!(!buf.storage().is_mutable());
        assert_eq!(buf.put_slice(b"zz"), 0);
        assert_eq!(buf.readable(), b"shared");
        assert_eq!(Rc::strong_count(&data), 2);
        drop(buf);
        assert_eq!(Rc::strong_count(&data), 1);
    }

    #[test]
    fn test_reclaim_foreign_storage() {
        let storage = vec![0u8; 4].into_boxed_slice();
        let mut buf = Buffer::from_storage(Storage::Foreign(storage));
        buf.reset_write();
        buf.put_slice(b"data");

        let reclaimed = buf.into_reclaimed().expect("foreign storage comes back");
        assert_eq!(&reclaimed[..], b"data");
    }

    #[test]
    fn test_owned_storage_not_reclaimed() {
        let buf = Buffer::owned(4);
        assert!(buf.into_reclaimed().is_none());
    }
}
