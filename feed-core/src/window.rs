//! The bounded listing window and its merge operation.
//!
//! The window is the in-memory, capped, deduplicated, newest-first sequence
//! of listings the engine currently knows about. It is only ever replaced
//! wholesale by the output of [`Window::merge`], which keeps the invariants
//! in one place:
//! - ids are unique within the window
//! - length never exceeds [`MAX_WINDOW`]
//! - newly added listings precede everything already present

use std::collections::HashSet;

use feed_types::Listing;

/// Maximum number of listings held in memory.
pub const MAX_WINDOW: usize = 30;

/// Maximum number of listings written to the durable snapshot.
pub const MAX_PERSIST: usize = 10;

/// The capped, deduplicated, newest-first listing sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    listings: Vec<Listing>,
}

/// Result of merging a batch into a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The new window after the merge.
    pub window: Window,
    /// The subset of the batch that was genuinely new, in batch order.
    pub newly_added: Vec<Listing>,
}

impl Window {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window from a stored sequence, restoring the invariants.
    ///
    /// Used when seeding from a persisted snapshot whose contents the engine
    /// does not control: duplicate ids keep the first occurrence and the
    /// sequence is truncated to [`MAX_WINDOW`].
    pub fn from_listings(listings: Vec<Listing>) -> Self {
        let mut seen = HashSet::new();
        let mut unique: Vec<Listing> = listings
            .into_iter()
            .filter(|l| seen.insert(l.id.clone()))
            .collect();
        unique.truncate(MAX_WINDOW);
        Self { listings: unique }
    }

    /// Merge an incoming batch into this window.
    ///
    /// The batch is deduplicated against itself (first occurrence wins) and
    /// against the window; survivors are prepended and the tail is truncated
    /// to [`MAX_WINDOW`]. The window itself is not modified - the caller
    /// publishes the returned one.
    ///
    /// `merge(w, [])` returns `w` unchanged with an empty `newly_added`.
    pub fn merge(&self, incoming: &[Listing]) -> MergeOutcome {
        let existing_ids: HashSet<&str> =
            self.listings.iter().map(|l| l.id.as_str()).collect();

        let mut seen = HashSet::new();
        let newly_added: Vec<Listing> = incoming
            .iter()
            .filter(|l| !existing_ids.contains(l.id.as_str()))
            .filter(|l| seen.insert(l.id.as_str()))
            .cloned()
            .collect();

        let mut merged = Vec::with_capacity(newly_added.len() + self.listings.len());
        merged.extend(newly_added.iter().cloned());
        merged.extend(self.listings.iter().cloned());
        merged.truncate(MAX_WINDOW);

        MergeOutcome {
            window: Window { listings: merged },
            newly_added,
        }
    }

    /// The listings in the window, newest first.
    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    /// The prefix of the window that goes into the durable snapshot.
    pub fn persist_slice(&self) -> &[Listing] {
        &self.listings[..self.listings.len().min(MAX_PERSIST)]
    }

    /// Number of listings in the window.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
