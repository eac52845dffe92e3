//! Durable snapshot storage for recently seen listings.
//!
//! This module provides a trait for the small persisted subset of the
//! window, a JSON-file implementation with a time-to-live, and a
//! memory-based implementation for testing.
//!
//! Persistence is a convenience cache, never a source of truth: every
//! failure here is reported as an error value but the engine ignores it
//! and continues from in-memory state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use feed_types::Listing;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the storage medium failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for the durable listing snapshot.
///
/// Implementations provide best-effort get/set semantics with a TTL;
/// the engine requires nothing more of the medium.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Overwrite the snapshot with the given listings.
    async fn save(&self, listings: &[Listing]) -> Result<(), StoreError>;

    /// Load the snapshot, if present and not expired.
    async fn load(&self) -> Result<Option<Vec<Listing>>, StoreError>;
}

/// On-disk snapshot format.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    /// Unix timestamp (seconds) of the write.
    saved_at: u64,
    /// The persisted listings, newest first.
    listings: Vec<Listing>,
}

/// JSON-file implementation of [`SnapshotStore`].
///
/// The TTL is enforced on read: an expired snapshot loads as `None` and
/// the stale file is removed best-effort.
pub struct FileStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileStore {
    /// Create a store writing to the given path with the given TTL.
    pub fn new(path: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ttl,
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn save(&self, listings: &[Listing]) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            saved_at: Self::now_secs(),
            listings: listings.to_vec(),
        };
        let json = serde_json::to_vec(&snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<Listing>>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

        let age = Self::now_secs().saturating_sub(snapshot.saved_at);
        if age > self.ttl.as_secs() {
            // Expired; remove the stale file so the next load is cheap
            tokio::fs::remove_file(&self.path).await.ok();
            return Ok(None);
        }

        Ok(Some(snapshot.listings))
    }
}

/// In-memory snapshot store for testing.
///
/// Not persistent - all data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    saved: Option<Vec<Listing>>,
    save_count: u32,
    fail_next_save: bool,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with listings, as if a previous session
    /// had written them.
    pub fn seeded(listings: Vec<Listing>) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().saved = Some(listings);
        store
    }

    /// The listings currently held, if any.
    pub fn saved(&self) -> Option<Vec<Listing>> {
        self.inner.lock().unwrap().saved.clone()
    }

    /// Number of save() calls so far.
    pub fn save_count(&self) -> u32 {
        self.inner.lock().unwrap().save_count
    }

    /// Cause the next save() to fail.
    pub fn fail_next_save(&self) {
        self.inner.lock().unwrap().fail_next_save = true;
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, listings: &[Listing]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_save {
            inner.fail_next_save = false;
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "forced failure",
            )));
        }
        inner.saved = Some(listings.to_vec());
        inner.save_count += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<Listing>>, StoreError> {
        Ok(self.inner.lock().unwrap().saved.clone())
    }
}
