//! Notification gating for merged batches.
//!
//! The sound fires only when both conditions hold: the user has enabled
//! sound (which also unlocked the audio pipeline) and the merge actually
//! added listings that were not already in the window. Reordered or
//! duplicate batches stay silent.

use std::sync::Arc;
use tracing::warn;

use feed_types::Listing;

use crate::audio::AudioUnlocker;

/// Decides whether a merge outcome should be audible.
pub struct NotificationGate {
    unlocker: Arc<AudioUnlocker>,
}

impl NotificationGate {
    /// Create a gate driving the given unlocker.
    pub fn new(unlocker: Arc<AudioUnlocker>) -> Self {
        Self { unlocker }
    }

    /// Play the notification sound if the batch added anything new and
    /// sound is enabled.
    ///
    /// Playback failure is logged and swallowed; a broken speaker must
    /// never interfere with feed updates.
    pub fn evaluate(&self, newly_added: &[Listing], sound_enabled: bool) {
        if !sound_enabled || newly_added.is_empty() {
            return;
        }

        if let Err(e) = self.unlocker.play() {
            warn!(error = %e, "notification sound failed");
        }
    }
}
