//! Track index: which tracks already exist in which playlists, per user.
//!
//! Playlist and track rows carry their full serialized objects; the
//! association table ties them together. A track row survives only as
//! long as at least one association references it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::db::Database;
use crate::error::{Result, ResultExt};
use crate::model::{IndexSummary, PlaylistSummary, PopulatedPlaylist, Track};

/// Outcome of comparing a current playlist listing against the stored index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<PlaylistSummary>,
    pub changed: Vec<PlaylistSummary>,
    pub removed: Vec<PlaylistSummary>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Partition `current` against `stored` playlist summaries.
///
/// Additions and changes come back in `current` order, removals in
/// `stored` order. Playlists present unchanged on both sides are not
/// touched by any partition.
pub fn diff_summaries(stored: &[PlaylistSummary], current: &[PlaylistSummary]) -> Diff {
    let stored_by_id: HashMap<&str, &PlaylistSummary> =
        stored.iter().map(|p| (p.id.as_str(), p)).collect();
    let current_ids: HashSet<&str> = current.iter().map(|p| p.id.as_str()).collect();

    let mut diff = Diff::default();
    for playlist in current {
        match stored_by_id.get(playlist.id.as_str()) {
            None => diff.added.push(playlist.clone()),
            Some(prev) if playlist.has_changed(prev) => diff.changed.push(playlist.clone()),
            Some(_) => {}
        }
    }
    for playlist in stored {
        if !current_ids.contains(playlist.id.as_str()) {
            diff.removed.push(playlist.clone());
        }
    }
    diff
}

/// Persistent mapping of user → playlists → tracks.
pub struct TrackIndex {
    db: Arc<Database>,
}

impl TrackIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// True iff any playlist in the index contains the track, by identity key.
    pub async fn has(&self, user_id: &str, track: &Track) -> Result<bool> {
        let playlists = self
            .lookup(user_id, track)
            .await
            .with_context("looking up track in index")?;
        Ok(!playlists.is_empty())
    }

    /// All playlists (as last-synced summaries) containing the track.
    pub async fn lookup(&self, user_id: &str, track: &Track) -> Result<Vec<PlaylistSummary>> {
        let handle = self.db.read().await;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.summary
            FROM index_playlists AS p
            INNER JOIN index_playlist_tracks AS pt
                ON p.id = pt.playlist_id
                    AND p.user_id = pt.user_id
            WHERE pt.track_key = ? AND p.user_id = ?
            "#,
        )
        .bind(track.identity_key())
        .bind(user_id)
        .fetch_all(&*handle)
        .await
        .with_context(format!("looking up playlists for track {}", track.identity_key()))?;

        rows.iter()
            .map(|(json,)| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }

    /// Compare the caller-supplied current listing against the stored
    /// summaries. Reads only; no network, no writes.
    pub async fn diff(&self, user_id: &str, current: &[PlaylistSummary]) -> Result<Diff> {
        let stored = self.stored_summaries(user_id).await?;
        Ok(diff_summaries(&stored, current))
    }

    /// Apply an entire diff in one transaction. Upsert semantics: syncing
    /// the same `added` set twice leaves the store unchanged. On any
    /// failure the whole transaction rolls back; partial syncs are never
    /// observable.
    pub async fn sync(
        &self,
        user_id: &str,
        added: &[PopulatedPlaylist],
        changed: &[PopulatedPlaylist],
        removed: &[PopulatedPlaylist],
    ) -> Result<()> {
        debug!(
            user = user_id,
            added = added.len(),
            changed = changed.len(),
            removed = removed.len(),
            "syncing track index"
        );

        let handle = self.db.write().await;
        let mut tx = handle.begin().await?;

        for playlist in added {
            add_playlist(&mut tx, user_id, playlist)
                .await
                .with_context(format!("adding playlist {}", playlist.summary.id))?;
        }

        for playlist in changed {
            // A remove and re-add is a simple way to handle changed
            // playlists; the cost is bounded by playlist size, not index
            // size, and changed playlists are rare.
            debug!(playlist = %playlist.summary.name, "re-adding changed playlist");
            remove_playlist(&mut tx, user_id, &playlist.summary.id)
                .await
                .with_context(format!("removing changed playlist {}", playlist.summary.id))?;
            add_playlist(&mut tx, user_id, playlist)
                .await
                .with_context(format!("re-adding playlist {}", playlist.summary.id))?;
        }

        for playlist in removed {
            debug!(playlist = %playlist.summary.name, "removing playlist");
            remove_playlist(&mut tx, user_id, &playlist.summary.id)
                .await
                .with_context(format!("removing playlist {}", playlist.summary.id))?;
        }

        tx.commit().await?;
        debug!(user = user_id, "synced track index");

        Ok(())
    }

    /// Count of distinct indexed tracks whose artist list contains
    /// `artist_name`. The "artist relevance" signal for scoring.
    pub async fn count_tracks_by_artist(&self, user_id: &str, artist_name: &str) -> Result<i64> {
        let handle = self.db.read().await;

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM index_tracks, json_each(index_tracks.track, '$.artists') AS artist
            WHERE json_extract(artist.value, '$.name') = ?
                AND user_id = ?
            "#,
        )
        .bind(artist_name)
        .bind(user_id)
        .fetch_one(&*handle)
        .await
        .with_context(format!("counting tracks by artist {artist_name}"))?;

        Ok(count)
    }

    /// Counts and last-synced playlists for a user.
    pub async fn summarize(&self, user_id: &str) -> Result<IndexSummary> {
        let handle = self.db.read().await;

        let (unique_track_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM index_tracks WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&*handle)
                .await
                .with_context("counting indexed tracks")?;
        drop(handle);

        let playlists = self.stored_summaries(user_id).await?;

        Ok(IndexSummary {
            playlist_count: playlists.len(),
            unique_track_count: unique_track_count as usize,
            playlists,
        })
    }

    async fn stored_summaries(&self, user_id: &str) -> Result<Vec<PlaylistSummary>> {
        let handle = self.db.read().await;

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT summary FROM index_playlists WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&*handle)
        .await
        .with_context("querying stored playlist summaries")?;

        rows.iter()
            .map(|(json,)| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }
}

async fn add_playlist(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    playlist: &PopulatedPlaylist,
) -> Result<()> {
    let summary = &playlist.summary;
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO index_playlists (
            id, user_id, snapshot_id, name, summary, updated_at
        )
        VALUES (?, ?, ?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
        "#,
    )
    .bind(&summary.id)
    .bind(user_id)
    .bind(&summary.snapshot_id)
    .bind(&summary.name)
    .bind(serde_json::to_string(summary)?)
    .execute(&mut **tx)
    .await?;

    for track in &playlist.tracks {
        let key = track.identity_key();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO index_tracks (
                key, user_id, name, track, updated_at
            )
            VALUES (?, ?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
            "#,
        )
        .bind(&key)
        .bind(user_id)
        .bind(&track.name)
        .bind(serde_json::to_string(track)?)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO index_playlist_tracks (
                playlist_id, track_key, user_id, updated_at
            )
            VALUES (?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
            "#,
        )
        .bind(&summary.id)
        .bind(&key)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn remove_playlist(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    playlist_id: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM index_playlists WHERE id = ? AND user_id = ?")
        .bind(playlist_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("DELETE FROM index_playlist_tracks WHERE playlist_id = ? AND user_id = ?")
        .bind(playlist_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    // Sweep tracks no longer referenced by any of the user's playlists;
    // a track shared with another playlist survives.
    sqlx::query(
        r#"
        DELETE FROM index_tracks
        WHERE user_id = ?
            AND NOT EXISTS (
                SELECT 1
                FROM index_playlist_tracks AS pt
                WHERE pt.track_key = index_tracks.key
                    AND pt.user_id = index_tracks.user_id
            )
        "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
