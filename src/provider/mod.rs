//! Capability trait for the upstream music catalog.
//!
//! The index/paginator/scoring core consumes this; it does not implement
//! it. The canonical implementation is an HTTP adaptor with its own
//! caching, which lives with the server surface. Tests substitute an
//! in-memory implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Album, AlbumRef, PlaylistSummary, PopulatedPlaylist, Track, User};

/// Everything the discovery core needs from the catalog.
#[async_trait]
pub trait SpotifyProvider: Send + Sync {
    /// Full listing of the user's playlists, without their tracks.
    async fn list_playlists(&self, user_id: &str) -> Result<Vec<PlaylistSummary>>;

    /// One playlist with its full track list.
    async fn get_playlist(&self, playlist_id: &str) -> Result<PopulatedPlaylist>;

    /// Fetch full track lists for the given playlists, preserving order.
    async fn populate_playlists(
        &self,
        summaries: &[PlaylistSummary],
    ) -> Result<Vec<PopulatedPlaylist>>;

    /// Create a playlist for the user with the given tracks.
    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        track_ids: &[String],
    ) -> Result<PopulatedPlaylist>;

    /// Set the playlist's tracks, replacing whatever it held, and return
    /// its new state.
    async fn set_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<PopulatedPlaylist>;

    /// Remove every track from a playlist.
    async fn truncate_playlist(&self, playlist_id: &str, snapshot_id: &str) -> Result<()>;

    /// The authenticated user.
    async fn current_user(&self) -> Result<User>;

    /// The user's currently playing track, if anything is playing.
    async fn current_track(&self) -> Result<Option<Track>>;

    async fn get_album(&self, album_id: &str) -> Result<Album>;

    /// Batch album fetch; order follows `album_ids`.
    async fn get_albums(&self, album_ids: &[String]) -> Result<Vec<Album>>;

    /// Every album the artist appears on, as references.
    async fn list_artist_albums(&self, artist_id: &str) -> Result<Vec<AlbumRef>>;

    async fn get_track(&self, track_id: &str) -> Result<Track>;
}
