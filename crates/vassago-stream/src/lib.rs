//! # Vassago Stream
//!
//! The buffered stream engine: leaf adapters over files and memory, filter
//! pipelines, and the registry that owns every live stream.
//!
//! All operations are methods on [`StreamRegistry`], addressed by
//! generation-checked [`StreamId`] handles. A pipeline is built by opening a
//! leaf and attaching filter stages in front of it; data moves one buffer at
//! a time, and transfer boundaries surface as
//! [`EndStatus`](vassago_core::EndStatus) values rather than torn-down
//! state.
//!
//! ## Example
//!
//! ```ignore
//! use vassago_stream::StreamRegistry;
//!
//! let mut reg = StreamRegistry::new();
//! let leaf = reg.open_memory_transient(encoded_bytes);
//! let front = reg.attach_filter(leaf, Box::new(MyDecoder::new()), None)?;
//!
//! let mut out = vec![0u8; 4096];
//! let (n, status) = reg.read(front, &mut out)?;
//! reg.close_filters(front, None)?;
//! ```

mod buffer;
mod control;
mod filters;
mod pipeline;
mod reader;
mod registry;
mod stream;
mod writer;

pub use buffer::{Buffer, Storage};
pub use filters::NullTransform;
pub use registry::{StreamId, StreamRegistry};
pub use stream::Stream;

pub use vassago_core::{
    CalloutPayload, EndStatus, Error, Modes, ProcessOutcome, Result, StreamConfig, Transform,
};
