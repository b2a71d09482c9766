//! Access mode flags for streams.

use core::fmt;
use core::ops::BitOr;

/// Access modes allowed for a stream.
///
/// A compact bitset: `READ`, `WRITE`, `SEEK`, and `APPEND` (which implies
/// `WRITE`). An empty set means the stream has been disabled by `close`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes(u8);

impl Modes {
    /// No access; the state of a closed stream.
    pub const NONE: Modes = Modes(0);
    /// Stream may be read.
    pub const READ: Modes = Modes(1);
    /// Stream may be written.
    pub const WRITE: Modes = Modes(2);
    /// Stream position may be set.
    pub const SEEK: Modes = Modes(4);
    /// Writes go to the end of the file (`WRITE` is implied).
    pub const APPEND: Modes = Modes(8 | 2);

    /// Check whether all flags in `other` are set.
    #[inline]
    pub fn contains(self, other: Modes) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`.
    #[inline]
    pub fn insert(&mut self, other: Modes) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`.
    #[inline]
    pub fn remove(&mut self, other: Modes) {
        self.0 &= !other.0;
    }

    /// True unless the stream has been disabled.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Reading allowed.
    #[inline]
    pub fn is_reading(self) -> bool {
        self.contains(Modes::READ)
    }

    /// Writing allowed.
    #[inline]
    pub fn is_writing(self) -> bool {
        self.contains(Modes::WRITE)
    }

    /// Seeking allowed.
    #[inline]
    pub fn can_seek(self) -> bool {
        self.contains(Modes::SEEK)
    }

    /// Appending requested.
    #[inline]
    pub fn is_appending(self) -> bool {
        self.0 & 8 != 0
    }
}

impl BitOr for Modes {
    type Output = Modes;

    fn bitor(self, rhs: Modes) -> Modes {
        Modes(self.0 | rhs.0)
    }
}

impl fmt::Debug for Modes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_reading() {
            parts.push("READ");
        }
        if self.is_writing() {
            parts.push("WRITE");
        }
        if self.can_seek() {
            parts.push("SEEK");
        }
        if self.is_appending() {
            parts.push("APPEND");
        }
        if parts.is_empty() {
            parts.push("NONE");
        }
        write!(f, "Modes({})", parts.join("|"))
    }
}
