//! playlist-minder: a track index and discovery-playlist engine.
//!
//! The crate keeps a local SQLite index of the tracks on a user's
//! "library" playlists, diffs it against the provider's current state,
//! and uses it to answer "do I already have this?" questions and to
//! generate recommendation playlists from discovery feeds.
//!
//! Entry points:
//! - [`discovery::DiscoveryService`] for the high-level operations,
//! - [`index::TrackIndex`] for direct index queries,
//! - [`provider::SpotifyProvider`] as the seam to the upstream catalog.

pub mod db;
pub mod discovery;
pub mod error;
pub mod index;
pub mod lock;
pub mod model;
pub mod paginator;
pub mod prefs;
pub mod provider;

#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
