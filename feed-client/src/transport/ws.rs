//! WsTransport - streaming transport over WebSocket.
//!
//! Implements the [`FeedTransport`] trait using tokio-tungstenite. The feed
//! only ever pushes text frames at us; binary frames and pings are skipped,
//! a close frame or stream error surfaces as a transport error so the
//! engine can degrade to polling.

use super::{FeedTransport, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WsTransport.
#[derive(Clone, Debug)]
pub struct WsTransportConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// WebSocket implementation of [`FeedTransport`].
///
/// # Example
///
/// ```ignore
/// let transport = WsTransport::new();
/// transport.open("wss://feed.example/ws").await?;
/// let frame = transport.next_frame().await?;
/// ```
pub struct WsTransport {
    /// Active stream (if connected).
    connection: Arc<Mutex<Option<WsStream>>>,
    /// Connected flag, readable without taking the stream lock.
    open: AtomicBool,
    /// Configuration options.
    config: WsTransportConfig,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    /// Create a new WsTransport with default configuration.
    pub fn new() -> Self {
        Self::with_config(WsTransportConfig::default())
    }

    /// Create a new WsTransport with custom configuration.
    pub fn with_config(config: WsTransportConfig) -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
            open: AtomicBool::new(false),
            config,
        }
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn open(&self, url: &str) -> Result<(), TransportError> {
        // Close any prior connection first
        self.close().await.ok();

        let (stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let mut guard = self.connection.lock().await;
        *guard = Some(stream);
        self.open.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn next_frame(&self) -> Result<String, TransportError> {
        let mut guard = self.connection.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                // Control and binary frames are not feed data
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Binary(_)))
                | Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.mark_closed();
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        let mut guard = self.connection.lock().await;
        if let Some(mut stream) = guard.take() {
            // Best effort; the remote may already be gone
            stream.close(None).await.ok();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_frame_without_open_fails() {
        let transport = WsTransport::new();
        let result = transport.next_frame().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn open_unreachable_endpoint_fails() {
        let transport = WsTransport::with_config(WsTransportConfig {
            connect_timeout: Duration::from_millis(500),
        });

        // Port 9 (discard) on localhost is not a WebSocket server
        let result = transport.open("ws://127.0.0.1:9/ws").await;

        assert!(result.is_err());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = WsTransport::new();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }
}
