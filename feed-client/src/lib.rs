//! # feed-client
//!
//! The adwatch sync engine: keeps a bounded, deduplicated local view of a
//! remote classifieds feed, resilient to transport failure and persisted
//! across sessions.
//!
//! # Architecture
//!
//! ```text
//! Application → FeedEngine → FeedTransport / FeedFetcher → Network
//!                   ↓
//!              feed-core (pure merge + state machine)
//! ```
//!
//! [`FeedEngine`] composes the pieces: it drives the streaming transport,
//! falls back to polling when the stream dies, merges every batch through
//! the pure window logic, writes the snapshot, and gates the notification
//! sound. The pieces behind traits ([`FeedTransport`], [`FeedFetcher`],
//! [`SnapshotStore`], [`AlertPlayer`]) all ship with mock implementations
//! for testing.
//!
//! # Example
//!
//! ```ignore
//! use feed_client::{EngineConfig, FeedEngine, FileStore, HttpFetcher, RodioPlayer, WsTransport};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let engine = Arc::new(FeedEngine::new(
//!     config.clone(),
//!     WsTransport::new(),
//!     HttpFetcher::new(&config.feed.fallback_url),
//!     Arc::new(FileStore::new(&config.snapshot.path, config.snapshot.ttl())),
//!     Arc::new(RodioPlayer::spawn()),
//! ));
//!
//! engine.restore_saved().await;
//! let runner = Arc::clone(&engine);
//! tokio::spawn(async move { runner.run().await });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod audio;
mod config;
mod engine;
mod fetch;
mod gate;
mod store;
mod transport;

pub use audio::{AlertPlayer, AudioError, AudioUnlocker, MockPlayer, RodioPlayer, UnlockState};
pub use config::{ConfigError, EngineConfig, FeedUrls, PollConfig, SnapshotConfig};
pub use engine::{EngineError, EngineSnapshot, FeedEngine};
pub use fetch::{FeedFetcher, FetchError, HttpFetcher, MockFetcher};
pub use gate::NotificationGate;
pub use store::{FileStore, MemoryStore, SnapshotStore, StoreError};
pub use transport::{FeedTransport, MockTransport, TransportError, WsTransport, WsTransportConfig};
