//! FeedMessage - the inbound streaming envelope.
//!
//! The feed wraps every streamed frame in a JSON object with a `type`
//! discriminator. Only `update` frames carry listings; everything else is
//! recognized but deliberately ignored by the engine.

use serde::{Deserialize, Serialize};

use crate::{FeedError, Listing};

/// The envelope around every inbound streaming frame.
///
/// Unrecognized `type` values deserialize to [`FeedMessage::Other`] instead
/// of failing, so the boundary can ignore them without dropping the
/// connection. A frame that is not valid JSON at all is a parse error and is
/// handled (logged and dropped) by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    /// A batch of listings from the live feed.
    Update {
        /// The listings in this batch, newest first as the feed emits them.
        data: Vec<Listing>,
    },
    /// Any other frame type; ignored.
    #[serde(other)]
    Other,
}

impl FeedMessage {
    /// Parse an envelope from a raw JSON frame.
    pub fn from_json(raw: &str) -> Result<Self, FeedError> {
        serde_json::from_str(raw).map_err(FeedError::Deserialization)
    }

    /// Serialize the envelope to a JSON string.
    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(FeedError::Serialization)
    }
}
