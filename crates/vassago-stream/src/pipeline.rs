//! Pipeline composition and teardown.
//!
//! A pipeline is a chain of filter stages in front of a leaf, linked by
//! target handles. Attaching goes one stage at a time; teardown closes a
//! whole prefix of the chain in one call.

use vassago_core::{Error, Modes, Result, Transform};

use crate::buffer::{Buffer, Storage};
use crate::filters::NullTransform;
use crate::registry::{StreamId, StreamRegistry};
use crate::stream::Stream;

impl StreamRegistry {
    /// Attach a filter stage in front of `target`, returning the handle of
    /// the new pipeline front. The direction is taken from the target: a
    /// reading target gets a decoding stage, a writing target an encoding
    /// stage.
    ///
    /// `storage`, if given, becomes the stage's buffer and is handed back
    /// when the stage closes; otherwise the stage allocates its own. A
    /// transform that declares more look-ahead than the adjacent buffer
    /// holds gets an identity buffering stage inserted underneath, so the
    /// chain seen by the caller may grow by more than one stream.
    pub fn attach_filter(
        &mut self,
        target: StreamId,
        transform: Box<dyn Transform>,
        storage: Option<Box<[u8]>>,
    ) -> Result<StreamId> {
        let (t_modes, t_cap) = {
            let t = self.get(target)?;
            (t.modes, t.buf.capacity())
        };
        let reading = t_modes.is_reading();
        if !reading && !t_modes.is_writing() {
            return Err(Error::Unsupported("filter target must be reading or writing"));
        }
        let modes = if reading { Modes::READ } else { Modes::WRITE };
        let need = transform.min_lookahead();

        // A read transform pulls from the target's buffer; if that buffer
        // cannot hold the declared look-ahead, widen the view with an
        // identity stage.
        let target = if reading && need > t_cap {
            let cap = need.max(self.config().buffer_size);
            let stage = Stream::filter(
                Box::new(NullTransform),
                target,
                Buffer::owned(cap),
                modes,
            );
            let id = self.insert(stage);
            tracing::debug!(?id, cap, "inserted buffering stage");
            id
        } else {
            target
        };

        // A read stage's own buffer holds output, so the look-ahead
        // requirement does not apply to it; a write stage consumes from its
        // own buffer and must be able to hold the look-ahead.
        let min_cap = if reading { 1 } else { need.max(1) };
        let mut buf = match storage {
            Some(b) => {
                if b.len() < min_cap {
                    return Err(Error::range(
                        "filter buffer size",
                        b.len() as u64,
                        min_cap as u64,
                        u64::MAX,
                    ));
                }
                Buffer::from_storage(Storage::Foreign(b))
            }
            None => {
                let cap = if reading {
                    self.config().buffer_size
                } else {
                    // write transforms consume from their own buffer
                    need.max(self.config().buffer_size)
                };
                Buffer::owned(cap)
            }
        };
        if !reading {
            buf.reset_write();
        }

        let name = transform.name();
        let id = self.insert(Stream::filter(transform, target, buf, modes));
        tracing::debug!(?id, ?target, filter = name, ?modes, "attached filter");
        Ok(id)
    }

    /// Close pipeline stages from `front` down to (but not including)
    /// `boundary`. With no boundary the whole chain closes, leaf included.
    ///
    /// Write stages flush their trailers into the next stage before it goes
    /// away, so a partially torn down pipeline stays usable from the
    /// boundary on. `front == boundary` is a no-op. A boundary that is not
    /// in the chain is an error and nothing is closed.
    pub fn close_filters(&mut self, front: StreamId, boundary: Option<StreamId>) -> Result<()> {
        if boundary == Some(front) {
            return Ok(());
        }
        // Validate before touching anything.
        if let Some(b) = boundary {
            let mut cur = front;
            loop {
                match self.get(cur)?.target() {
                    Some(next) if next == b => break,
                    Some(next) => cur = next,
                    None => {
                        return Err(Error::io(
                            "pipeline teardown: boundary stream not found in chain",
                        ))
                    }
                }
            }
        }

        let mut cur = front;
        loop {
            let next = self.get(cur)?.target();
            self.close(cur)?;
            match next {
                Some(n) if Some(n) == boundary => return Ok(()),
                Some(n) => cur = n,
                None => return Ok(()),
            }
        }
    }
}
