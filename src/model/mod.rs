//! Domain model: tracks, playlists, albums and users as delivered by the
//! upstream provider.
//!
//! Track identity is a content key (`name + sorted artist names`), not the
//! provider ID: the same recording reissued under a different provider ID
//! must still count as "the same track", while two same-titled tracks by
//! materially different artist sets must not collapse together.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// An artist as credited on a track or album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The primary album a track was delivered with. Just enough to fetch the
/// full [`Album`] later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
}

/// A track with its ordered artist credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Provider ID. Not part of the track's identity.
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
}

impl Track {
    /// Content identity key: `"{name} - {sorted artist names}"`.
    ///
    /// Sorting the artist names makes the key independent of credit order,
    /// while keeping differing artist sets distinct. "Warrior" by
    /// [Atreyu, Travis Barker] and "Warrior" by [Atreyu, Zero 9:36,
    /// Travis Barker] are different tracks and get different keys.
    pub fn identity_key(&self) -> String {
        let mut artist_names: Vec<&str> =
            self.artists.iter().map(|a| a.name.as_str()).collect();
        artist_names.sort_unstable();

        let name = if self.name.is_empty() {
            "<Unknown track>"
        } else {
            self.name.as_str()
        };
        let artists = if artist_names.is_empty() {
            "<Unknown artist>".to_string()
        } else {
            artist_names.join(", ")
        };

        format!("{name} - {artists}")
    }
}

/// Album release kind as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlbumKind {
    Album,
    Single,
    Compilation,
}

/// A fully fetched album, including its track list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub kind: AlbumKind,
    pub artists: Vec<Artist>,
    /// Release date as reported upstream: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub release_date: String,
    pub tracks: Vec<Track>,
}

impl Album {
    /// Release date parsed at whatever precision the provider gave us,
    /// missing parts defaulting to the start of the period. Unparseable
    /// dates collapse to the epoch.
    pub fn released_on(&self) -> NaiveDate {
        let s = self.release_date.as_str();
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
            .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01-01"), "%Y-%m-%d"))
            .unwrap_or_default()
    }

    pub fn release_year(&self) -> i32 {
        self.released_on().year()
    }
}

/// A playlist as returned by a listing call, without its tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    /// Opaque upstream version stamp.
    pub snapshot_id: String,
    pub track_count: usize,
}

impl PlaylistSummary {
    /// A playlist counts as changed when its snapshot or its track count
    /// differs from what we stored. Snapshot alone is not enough; some
    /// mutations bump the count without a new snapshot reaching us first.
    pub fn has_changed(&self, other: &PlaylistSummary) -> bool {
        self.snapshot_id != other.snapshot_id || self.track_count != other.track_count
    }
}

/// A playlist with its full track list fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulatedPlaylist {
    pub summary: PlaylistSummary,
    pub tracks: Vec<Track>,
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

/// Queryable shape of a user's synced index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub playlist_count: usize,
    pub unique_track_count: usize,
    pub playlists: Vec<PlaylistSummary>,
}

/// De-duplicate tracks by identity key, keeping the first occurrence and
/// the original order.
pub fn unique_tracks(tracks: &[Track]) -> Vec<Track> {
    let mut seen = std::collections::HashSet::new();
    tracks
        .iter()
        .filter(|t| seen.insert(t.identity_key()))
        .cloned()
        .collect()
}

/// Flatten playlists into their tracks, playlist order preserved.
pub fn tracks_of(playlists: &[PopulatedPlaylist]) -> Vec<Track> {
    playlists
        .iter()
        .flat_map(|p| p.tracks.iter().cloned())
        .collect()
}
