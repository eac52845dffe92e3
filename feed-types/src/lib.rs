//! # feed-types
//!
//! Wire format types for the adwatch classifieds feed.
//!
//! This crate provides the foundational types used across all adwatch crates:
//! - [`Listing`], [`DetailedInfo`] - One classified ad as the feed serves it
//! - [`FeedMessage`] - Inbound streaming envelope, validated at the boundary
//! - [`FeedError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod listing;

pub use envelope::FeedMessage;
pub use error::FeedError;
pub use listing::{DetailedInfo, Listing};
