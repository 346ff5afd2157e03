//! Shared test fixtures: model builders and an in-memory provider.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{
    Album, AlbumKind, AlbumRef, Artist, PlaylistSummary, PopulatedPlaylist, Track, User,
};
use crate::provider::SpotifyProvider;

pub fn artist(name: &str) -> Artist {
    Artist::new(format!("artist-{name}"), name)
}

pub fn track(name: &str, artists: &[&str]) -> Track {
    Track {
        id: format!("track-{name}"),
        name: name.to_string(),
        artists: artists.iter().map(|a| artist(a)).collect(),
        album: None,
    }
}

pub fn track_on_album(name: &str, artists: &[&str], album_id: &str, album_name: &str) -> Track {
    Track {
        album: Some(AlbumRef {
            id: album_id.to_string(),
            name: album_name.to_string(),
        }),
        ..track(name, artists)
    }
}

pub fn playlist(id: &str, name: &str, snapshot_id: &str, track_count: usize) -> PlaylistSummary {
    PlaylistSummary {
        id: id.to_string(),
        name: name.to_string(),
        snapshot_id: snapshot_id.to_string(),
        track_count,
    }
}

pub fn populated(summary: PlaylistSummary, tracks: Vec<Track>) -> PopulatedPlaylist {
    PopulatedPlaylist { summary, tracks }
}

pub fn album(
    id: &str,
    name: &str,
    kind: AlbumKind,
    artists: &[&str],
    release_date: &str,
    tracks: Vec<Track>,
) -> Album {
    Album {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        artists: artists.iter().map(|a| artist(a)).collect(),
        release_date: release_date.to_string(),
        tracks,
    }
}

pub fn user() -> User {
    User {
        id: "user".to_string(),
        display_name: "Test User".to_string(),
    }
}

/// In-memory [`SpotifyProvider`] with call recording, in the style of the
/// mock API clients used across the crate's tests.
pub struct MockProvider {
    pub user: User,
    pub current: Option<Track>,
    pub playlists: Vec<PopulatedPlaylist>,
    pub albums: HashMap<String, Album>,
    pub artist_albums: HashMap<String, Vec<AlbumRef>>,
    pub tracks: HashMap<String, Track>,

    pub populate_calls: Mutex<Vec<Vec<String>>>,
    pub created: Mutex<Vec<PopulatedPlaylist>>,
    pub truncated: Mutex<Vec<String>>,
    pub set_tracks_calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            user: user(),
            current: None,
            playlists: Vec::new(),
            albums: HashMap::new(),
            artist_albums: HashMap::new(),
            tracks: HashMap::new(),
            populate_calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            truncated: Mutex::new(Vec::new()),
            set_tracks_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(mut self, playlist: PopulatedPlaylist) -> Self {
        self.playlists.push(playlist);
        self
    }

    pub fn with_album(mut self, album: Album) -> Self {
        self.albums.insert(album.id.clone(), album);
        self
    }

    pub fn with_artist_albums(mut self, artist_id: &str, refs: Vec<AlbumRef>) -> Self {
        self.artist_albums.insert(artist_id.to_string(), refs);
        self
    }

    pub fn with_current_track(mut self, track: Track) -> Self {
        self.tracks.insert(track.id.clone(), track.clone());
        self.current = Some(track);
        self
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.insert(track.id.clone(), track);
        self
    }

    /// Populate calls that actually asked for playlists; empty calls are
    /// the no-diff case and don't count as rebuild work.
    pub fn populated_batches(&self) -> usize {
        self.populate_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|ids| !ids.is_empty())
            .count()
    }

    fn resolve_tracks(&self, track_ids: &[String]) -> Vec<Track> {
        track_ids
            .iter()
            .filter_map(|id| self.tracks.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl SpotifyProvider for MockProvider {
    async fn list_playlists(&self, _user_id: &str) -> Result<Vec<PlaylistSummary>> {
        Ok(self.playlists.iter().map(|p| p.summary.clone()).collect())
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<PopulatedPlaylist> {
        self.playlists
            .iter()
            .find(|p| p.summary.id == playlist_id)
            .cloned()
            .ok_or_else(|| Error::provider(format!("no playlist {playlist_id}")))
    }

    async fn populate_playlists(
        &self,
        summaries: &[PlaylistSummary],
    ) -> Result<Vec<PopulatedPlaylist>> {
        self.populate_calls
            .lock()
            .unwrap()
            .push(summaries.iter().map(|s| s.id.clone()).collect());

        // Removed playlists are no longer listable upstream; their summary
        // is all the sync needs.
        Ok(summaries
            .iter()
            .map(|s| {
                self.playlists
                    .iter()
                    .find(|p| p.summary.id == s.id)
                    .cloned()
                    .unwrap_or_else(|| populated(s.clone(), Vec::new()))
            })
            .collect())
    }

    async fn create_playlist(
        &self,
        _user_id: &str,
        name: &str,
        track_ids: &[String],
    ) -> Result<PopulatedPlaylist> {
        let tracks = self.resolve_tracks(track_ids);
        let created = populated(
            playlist(
                &format!("created-{}", self.created.lock().unwrap().len()),
                name,
                "snap-created",
                tracks.len(),
            ),
            tracks,
        );
        self.created.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn set_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<PopulatedPlaylist> {
        self.set_tracks_calls
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), track_ids.to_vec()));
        let tracks = self.resolve_tracks(track_ids);
        let summary = self
            .playlists
            .iter()
            .find(|p| p.summary.id == playlist_id)
            .map(|p| p.summary.clone())
            .ok_or_else(|| Error::provider(format!("no playlist {playlist_id}")))?;
        Ok(populated(
            PlaylistSummary {
                track_count: tracks.len(),
                ..summary
            },
            tracks,
        ))
    }

    async fn truncate_playlist(&self, playlist_id: &str, _snapshot_id: &str) -> Result<()> {
        self.truncated.lock().unwrap().push(playlist_id.to_string());
        Ok(())
    }

    async fn current_user(&self) -> Result<User> {
        Ok(self.user.clone())
    }

    async fn current_track(&self) -> Result<Option<Track>> {
        Ok(self.current.clone())
    }

    async fn get_album(&self, album_id: &str) -> Result<Album> {
        self.albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| Error::provider(format!("no album {album_id}")))
    }

    async fn get_albums(&self, album_ids: &[String]) -> Result<Vec<Album>> {
        album_ids
            .iter()
            .map(|id| {
                self.albums
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::provider(format!("no album {id}")))
            })
            .collect()
    }

    async fn list_artist_albums(&self, artist_id: &str) -> Result<Vec<AlbumRef>> {
        Ok(self.artist_albums.get(artist_id).cloned().unwrap_or_default())
    }

    async fn get_track(&self, track_id: &str) -> Result<Track> {
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| Error::provider(format!("no track {track_id}")))
    }
}
