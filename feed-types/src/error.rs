//! Error types for adwatch wire handling.

use thiserror::Error;

/// Errors that can occur while handling feed data.
#[derive(Debug, Error)]
pub enum FeedError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Structurally valid JSON that is not a usable feed message
    #[error("invalid data: {0}")]
    InvalidData(String),
}
