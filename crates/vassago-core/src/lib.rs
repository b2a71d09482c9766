//! # Vassago Core
//!
//! Core contracts for the Vassago buffered stream and filter layer.
//!
//! Vassago is named after the third demon of the Ars Goetia, who discovers
//! all things hidden and lost - just as a filter pipeline surfaces the bytes
//! concealed inside encoded document streams.
//!
//! ## Design Philosophy
//!
//! - **Single-threaded, cooperative**: every operation runs synchronously to
//!   completion, moving at most one buffer's worth of data.
//! - **Status, not exceptions**: transfer boundaries (end of data, errors,
//!   callouts) are communicated through a sticky [`EndStatus`] on the stream,
//!   never by tearing down already-buffered data.
//! - **Narrow filter contract**: filters only implement [`Transform`]; the
//!   engine owns buffering, chaining, and teardown.
//!
//! ## Core Items
//!
//! - [`Error`] / [`Result`] - the closed error taxonomy
//! - [`EndStatus`] - the end-of-buffer state machine
//! - [`Modes`] - read/write/seek/append access flags
//! - [`Transform`] - the contract a filter stage implements
//! - [`StreamConfig`] - buffer sizing configuration

pub mod config;
pub mod error;
pub mod mode;
pub mod status;
pub mod transform;

pub use config::{clamp_buffer_size, StreamConfig, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{Error, Result};
pub use mode::Modes;
pub use status::EndStatus;
pub use transform::{CalloutPayload, ProcessOutcome, Transform};
