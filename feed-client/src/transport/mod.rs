//! Transport abstraction for the live feed.
//!
//! This module provides a pluggable transport layer that abstracts the
//! streaming connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `open()` establishes the streaming connection
//! - `next_frame()` yields the next raw text frame
//! - `close()` gracefully terminates
//!
//! The feed never expects the client to send anything; the transport is
//! receive-only.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.open("wss://feed.example/ws").await?;
//! let raw = transport.next_frame().await?;
//! ```

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::{WsTransport, WsTransportConfig};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed by the remote side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for receiving streamed feed frames.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open the streaming connection to the given URL.
    async fn open(&self, url: &str) -> Result<(), TransportError>;

    /// Receive the next raw text frame.
    ///
    /// Blocks until a frame is available or the connection closes.
    async fn next_frame(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_open(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
