//! Mock transport for testing.
//!
//! Allows queueing inbound frames and forcing failures for verification.

use super::{FeedTransport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Frames queued with [`MockTransport::queue_frame`] are returned in order
/// by `next_frame()`; once the queue is empty the transport reports the
/// connection as closed, which is how tests drive the engine into its
/// degraded polling path.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    open: bool,
    opened_url: Option<String>,
    frame_queue: VecDeque<String>,
    fail_next_open: Option<String>,
    fail_next_frame: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by the next `next_frame()` call.
    pub fn queue_frame(&self, frame: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.frame_queue.push_back(frame.into());
    }

    /// Get the URL that was opened.
    pub fn opened_url(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.opened_url.clone()
    }

    /// Cause the next open() to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_open = Some(error.to_string());
    }

    /// Cause the next next_frame() to fail with the given error.
    pub fn fail_next_frame(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_frame = Some(error.to_string());
    }

    /// Clear all state (frames, connection).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn open(&self, url: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_open.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.open = true;
        inner.opened_url = Some(url.to_string());
        Ok(())
    }

    async fn next_frame(&self) -> Result<String, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.open {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_frame.take() {
            return Err(TransportError::ReceiveFailed(error));
        }

        inner
            .frame_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.open
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open = false;
        Ok(())
    }
}
