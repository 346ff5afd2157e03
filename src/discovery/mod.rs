//! Discovery core: keeps the track index in step with the user's library
//! playlists and generates recommendation playlists from whatever the
//! discovery playlists surface that the library does not already hold.
//!
//! Anything that reads the index first funnels through
//! [`DiscoveryService::playlists_syncing_index`], so callers always see an
//! index that reflects the current upstream state. The sync itself runs
//! under a lease so concurrent callers (and concurrent processes sharing
//! the database) never rebuild the same index twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Error, Result, ResultExt};
use crate::index::TrackIndex;
use crate::lock::{with_lease, Locker};
use crate::model::{
    tracks_of, unique_tracks, Album, AlbumKind, AlbumRef, IndexSummary, PlaylistSummary,
    PopulatedPlaylist, Track, User,
};
use crate::paginator::{PageResult, Paginator};
use crate::prefs::{PreferenceProvider, UserPreferences};
use crate::provider::SpotifyProvider;

/// How many tracks are scored concurrently. Each score costs several
/// provider calls, so this is the effective upstream fan-out.
const SCORING_PARALLELISM: usize = 10;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Lease TTL for index syncs. The lease is refreshed while a sync
    /// runs, so this only bounds how long a crashed holder blocks others.
    pub sync_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sync_ttl: Duration::from_secs(30),
        }
    }
}

/// A candidate track with everything needed to rank it.
#[derive(Debug, Clone)]
pub struct Score {
    pub track: Track,
    /// The canonical album the track belongs to, which is not necessarily
    /// the album the provider delivered it with.
    pub album: Album,
    /// How many indexed tracks share an artist with this one.
    pub artist_relevance: i64,
}

impl Score {
    /// Whether the track survives filtering at all. Tracks off tiny
    /// releases are dropped; the point of a recommendation is an album
    /// worth listening through.
    pub fn keep(&self, prefs: &UserPreferences) -> bool {
        self.album.tracks.len() >= prefs.minimum_album_size
    }

    /// Ranking value: weighted words in the track name, plus artist
    /// relevance, plus recency (years past 2000), plus album length.
    pub fn value(&self, prefs: &UserPreferences) -> i64 {
        let name = self.track.name.to_lowercase();
        let word_weight: i64 = prefs
            .weighted_words
            .iter()
            .filter(|(word, _)| name.contains(&word.to_lowercase()))
            .map(|(_, weight)| *weight)
            .sum();

        word_weight
            + self.artist_relevance
            + i64::from(self.album.release_year() - 2000)
            + self.album.tracks.len() as i64
    }
}

pub struct DiscoveryService {
    config: DiscoveryConfig,
    provider: Arc<dyn SpotifyProvider>,
    prefs: Arc<dyn PreferenceProvider>,
    index: TrackIndex,
    locker: Arc<dyn Locker>,
}

impl DiscoveryService {
    pub fn new(
        config: DiscoveryConfig,
        provider: Arc<dyn SpotifyProvider>,
        prefs: Arc<dyn PreferenceProvider>,
        index: TrackIndex,
        locker: Arc<dyn Locker>,
    ) -> Self {
        Self {
            config,
            provider,
            prefs,
            index,
            locker,
        }
    }

    /// List the user's playlists, bringing the track index up to date with
    /// the library playlists among them as a side effect. Runs under a
    /// lease keyed on the user, so concurrent calls sync once.
    pub async fn playlists_syncing_index(&self, user_id: &str) -> Result<Vec<PlaylistSummary>> {
        let key = format!("sync-index:{user_id}");
        with_lease(Arc::clone(&self.locker), &key, self.config.sync_ttl, || {
            self.sync_index(user_id)
        })
        .await
    }

    async fn sync_index(&self, user_id: &str) -> Result<Vec<PlaylistSummary>> {
        let playlists = self.provider.list_playlists(user_id).await?;
        let prefs = self.prefs.preferences(user_id).await?;

        let library: Vec<PlaylistSummary> = playlists
            .iter()
            .filter(|p| prefs.is_library_playlist_name(&p.name))
            .cloned()
            .collect();

        let diff = self.index.diff(user_id, &library).await?;
        if diff.is_empty() {
            debug!(user = user_id, "track index already up to date");
            return Ok(playlists);
        }

        debug!(
            user = user_id,
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "track index out of date, populating playlists"
        );

        let added = self.provider.populate_playlists(&diff.added).await?;
        let changed = self.provider.populate_playlists(&diff.changed).await?;
        let removed = self.provider.populate_playlists(&diff.removed).await?;

        self.index.sync(user_id, &added, &changed, &removed).await?;

        Ok(playlists)
    }

    /// The currently playing track and every library playlist it appears
    /// on. An empty list means the track is not in the library.
    pub async fn check_playing_track_in_library(
        &self,
    ) -> Result<(Track, Vec<PlaylistSummary>)> {
        let user = self.provider.current_user().await?;
        let track = self.current_track_of(&user).await?;

        self.playlists_syncing_index(&user.id).await?;
        let playlists = self.index.lookup(&user.id, &track).await?;

        info!(
            track = %track.identity_key(),
            playlists = playlists.len(),
            "looked up playing track in library"
        );
        Ok((track, playlists))
    }

    /// The canonical album of the currently playing track.
    pub async fn currently_playing_track_album(&self) -> Result<Album> {
        let user = self.provider.current_user().await?;
        let track = self.current_track_of(&user).await?;
        self.album_for_track(&track).await
    }

    /// Shape of the current user's index after bringing it up to date.
    pub async fn index_summary(&self) -> Result<IndexSummary> {
        let user = self.provider.current_user().await?;
        self.playlists_syncing_index(&user.id).await?;
        self.index.summarize(&user.id).await
    }

    /// The current user's playlists whose names match `pattern`, fully
    /// populated.
    pub async fn playlists_matching_pattern(
        &self,
        pattern: &str,
    ) -> Result<Vec<PopulatedPlaylist>> {
        let pattern = regex::Regex::new(pattern)?;
        let user = self.provider.current_user().await?;
        let playlists = self.provider.list_playlists(&user.id).await?;

        let matching: Vec<PlaylistSummary> = playlists
            .into_iter()
            .filter(|p| pattern.is_match(&p.name))
            .collect();
        self.provider.populate_playlists(&matching).await
    }

    /// Build a recommendation playlist from the discovery playlists:
    /// tracks not yet in the library, scored and filtered, best first.
    /// With `dry_run` the playlist is returned but never created upstream.
    pub async fn generate_discovery_playlist(&self, dry_run: bool) -> Result<PopulatedPlaylist> {
        let user = self.provider.current_user().await?;
        let playlists = self.playlists_syncing_index(&user.id).await?;
        let prefs = self.prefs.preferences(&user.id).await?;

        let discovery: Vec<PlaylistSummary> = playlists
            .iter()
            .filter(|p| prefs.is_discovery_playlist_name(&p.name))
            .cloned()
            .collect();
        let populated = self.provider.populate_playlists(&discovery).await?;
        let all = unique_tracks(&tracks_of(&populated));
        debug!(
            playlists = populated.len(),
            unique = all.len(),
            "listed discovery playlists"
        );

        let mut candidates = Vec::new();
        for track in all {
            if self.index.has(&user.id, &track).await? {
                debug!(track = %track.identity_key(), "already in library, skipping");
            } else {
                candidates.push(track);
            }
        }

        let mut scores = self.score_tracks(&user.id, &candidates).await?;
        scores.sort_by_key(|s| std::cmp::Reverse(s.value(&prefs)));

        let mut tracks = Vec::new();
        for score in &scores {
            let keep = score.keep(&prefs);
            debug!(
                track = %score.track.identity_key(),
                value = score.value(&prefs),
                keep,
                "scored candidate"
            );
            if keep {
                tracks.push(score.track.clone());
            }
        }

        let name = prefs.recommendation_playlist_name("discovery", Utc::now());
        if dry_run {
            info!(name, tracks = tracks.len(), "dry run, not creating playlist");
            return Ok(dummy_playlist(&name, tracks));
        }

        let playlist = self.upsert_playlist(&playlists, &user.id, &name, tracks).await?;
        info!(
            playlist = %playlist.summary.name,
            tracks = playlist.tracks.len(),
            "recommendation playlist ready"
        );
        Ok(playlist)
    }

    /// Score candidate tracks in parallel, one provider round-trip bundle
    /// per track. Tracks without a provider ID (local files) cannot be
    /// scored and are skipped.
    pub async fn score_tracks(&self, user_id: &str, tracks: &[Track]) -> Result<Vec<Score>> {
        let candidates: Vec<&Track> = tracks
            .iter()
            .filter(|t| {
                if t.id.is_empty() {
                    debug!(track = %t.identity_key(), "local track, cannot score");
                    return false;
                }
                true
            })
            .collect();
        let candidates = candidates.as_slice();
        let total = candidates.len();

        Paginator::new()
            .page_size(1)
            .parallelism(SCORING_PARALLELISM)
            .with_total(total)
            .fetch_all(|page| async move {
                let mut items = Vec::with_capacity(page.limit);
                for &track in &candidates[page.offset..page.offset + page.limit] {
                    let score = self
                        .score_track(user_id, track)
                        .await
                        .with_context(format!("scoring {}", track.identity_key()))?;
                    items.push(score);
                }
                Ok(PageResult { items, total })
            })
            .await
    }

    async fn score_track(&self, user_id: &str, track: &Track) -> Result<Score> {
        let (track, album) = self.track_and_album(track).await?;

        let mut artist_relevance = 0;
        for artist in &track.artists {
            artist_relevance += self
                .index
                .count_tracks_by_artist(user_id, &artist.name)
                .await?;
        }

        Ok(Score {
            track,
            album,
            artist_relevance,
        })
    }

    /// Resolve the canonical album for a track.
    ///
    /// Discovery playlists tend to deliver tracks attached to singles and
    /// compilations. When the primary album is not a proper album, search
    /// everything the track's artists have released for an album actually
    /// containing this track, and prefer proper albums by the track's
    /// first-credited artist. Falls back to the primary album when nothing
    /// better matches.
    pub async fn album_for_track(&self, track: &Track) -> Result<Album> {
        let album_ref = track
            .album
            .as_ref()
            .ok_or_else(|| Error::provider(format!("track {} has no album", track.id)))?;

        let primary = self.provider.get_album(&album_ref.id).await?;
        if primary.kind == AlbumKind::Album {
            return Ok(primary);
        }
        debug!(
            track = %track.identity_key(),
            album = %primary.name,
            kind = ?primary.kind,
            "primary album is not a proper album, searching artist releases"
        );

        // The primary album stays in the walk: a single containing the
        // track can still outrank every other release.
        let mut refs: Vec<AlbumRef> = Vec::new();
        for artist in &track.artists {
            refs.extend(self.provider.list_artist_albums(&artist.id).await?);
        }
        let mut seen = HashSet::new();
        refs.retain(|r| seen.insert(r.id.clone()));
        if refs.is_empty() || (refs.len() == 1 && refs[0].id == primary.id) {
            return Ok(primary);
        }

        let ids: Vec<String> = refs.iter().map(|r| r.id.clone()).collect();
        let mut albums = self.provider.get_albums(&ids).await?;

        // Rank by the track's own artist order. An album credited to an
        // artist not on the track at all sorts last.
        let artist_rank: HashMap<&str, usize> = track
            .artists
            .iter()
            .enumerate()
            .map(|(rank, artist)| (artist.id.as_str(), rank))
            .collect();
        let rank_of = |album: &Album| {
            album
                .artists
                .first()
                .and_then(|a| artist_rank.get(a.id.as_str()).copied())
                .unwrap_or(usize::MAX)
        };
        albums.sort_by(|a, b| {
            rank_of(a)
                .cmp(&rank_of(b))
                .then_with(|| (b.kind == AlbumKind::Album).cmp(&(a.kind == AlbumKind::Album)))
                .then_with(|| a.released_on().cmp(&b.released_on()))
                .then_with(|| b.tracks.len().cmp(&a.tracks.len()))
        });

        let key = track.identity_key();
        for album in &albums {
            if album.tracks.iter().any(|t| t.identity_key() == key) {
                debug!(track = %key, album = %album.name, "resolved canonical album");
                return Ok(album.clone());
            }
        }
        Ok(primary)
    }

    /// Resolve the canonical album and, when the track moved to a
    /// different album, re-fetch the track as it exists on that album.
    pub async fn track_and_album(&self, track: &Track) -> Result<(Track, Album)> {
        let album = self.album_for_track(track).await?;

        let moved = track.album.as_ref().is_none_or(|a| a.id != album.id);
        if moved {
            for candidate in &album.tracks {
                if candidate.name == track.name {
                    let full = self.provider.get_track(&candidate.id).await?;
                    return Ok((full, album));
                }
            }
        }
        Ok((track.clone(), album))
    }

    async fn current_track_of(&self, user: &User) -> Result<Track> {
        self.provider
            .current_track()
            .await?
            .ok_or_else(|| Error::NoCurrentTrack {
                user: user.display_name.clone(),
            })
    }

    async fn upsert_playlist(
        &self,
        existing: &[PlaylistSummary],
        user_id: &str,
        name: &str,
        tracks: Vec<Track>,
    ) -> Result<PopulatedPlaylist> {
        let track_ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();

        for playlist in existing {
            if playlist.name == name {
                debug!(playlist = %playlist.id, name, "reusing existing playlist");
                self.provider
                    .truncate_playlist(&playlist.id, &playlist.snapshot_id)
                    .await?;
                return self
                    .provider
                    .set_playlist_tracks(&playlist.id, &track_ids)
                    .await;
            }
        }
        self.provider.create_playlist(user_id, name, &track_ids).await
    }
}

/// A stand-in playlist for dry runs: never hits the provider, has no ID
/// and an unmistakable name.
fn dummy_playlist(name: &str, tracks: Vec<Track>) -> PopulatedPlaylist {
    PopulatedPlaylist {
        summary: PlaylistSummary {
            id: String::new(),
            name: format!("dummy: {name}"),
            snapshot_id: String::new(),
            track_count: tracks.len(),
        },
        tracks,
    }
}
