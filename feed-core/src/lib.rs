//! # feed-core
//!
//! Pure logic for the adwatch feed engine - no I/O, no clocks, no sockets.
//!
//! Two pieces live here:
//! - [`Window`] and [`Window::merge`] - the bounded, deduplicated listing
//!   cache and the pure operation that reconciles it with an incoming batch.
//! - [`ConnectionState`] - the transport lifecycle state machine. It takes
//!   events and returns a new state plus actions; the client crate performs
//!   the actual I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod state;
mod window;

pub use state::{
    backoff_delay, Action, ConnectionState, EngineEvent, Event, RetryDelay,
};
pub use window::{MergeOutcome, Window, MAX_PERSIST, MAX_WINDOW};
