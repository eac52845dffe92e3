//! Fallback fetcher for the feed's HTTP endpoint.
//!
//! When the stream is gone the engine pulls the whole current batch from
//! `GET <fallback_url>`, which returns a plain JSON array of listings.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use feed_types::Listing;

/// Fetcher errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or returned a non-success status.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body was not a valid listing array.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Trait for pulling a full batch from the fallback endpoint.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the current batch of listings.
    async fn fetch(&self) -> Result<Vec<Listing>, FetchError>;
}

/// HTTP implementation of [`FeedFetcher`] backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Create a fetcher for the given fallback URL.
    pub fn new(url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Create a fetcher reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<Vec<Listing>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        response
            .json::<Vec<Listing>>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Mock fetcher for testing.
///
/// Returns queued results in order; an exhausted queue fails the pull,
/// which exercises the engine's retry path.
#[derive(Debug, Default)]
pub struct MockFetcher {
    inner: Arc<Mutex<MockFetcherInner>>,
}

#[derive(Debug, Default)]
struct MockFetcherInner {
    results: VecDeque<Result<Vec<Listing>, String>>,
    fetch_count: u32,
}

impl MockFetcher {
    /// Create a new mock fetcher with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful pull result.
    pub fn queue_batch(&self, batch: Vec<Listing>) {
        let mut inner = self.inner.lock().unwrap();
        inner.results.push_back(Ok(batch));
    }

    /// Queue a failed pull.
    pub fn queue_failure(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.results.push_back(Err(error.to_string()));
    }

    /// Number of times fetch() was called.
    pub fn fetch_count(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.fetch_count
    }
}

impl Clone for MockFetcher {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl FeedFetcher for MockFetcher {
    async fn fetch(&self) -> Result<Vec<Listing>, FetchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetch_count += 1;
        match inner.results.pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(error)) => Err(FetchError::Request(error)),
            None => Err(FetchError::Request("no response queued".to_string())),
        }
    }
}
