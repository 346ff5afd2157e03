//! Per-user preferences driving playlist classification and scoring.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::kv::{KeyValueStore, KeyValueStoreExt};
use crate::error::Result;

/// How a user's playlists are classified and how candidates are scored.
#[derive(Debug, Clone)]
pub struct UserPreferences {
    /// Playlists whose name matches this are "library" playlists: the
    /// tracks the user already owns.
    pub library_pattern: Regex,
    /// Playlists fed to discovery generation, e.g. the provider's weekly
    /// suggestion lists.
    pub discovery_playlist_names: Vec<String>,
    /// Per-word score adjustment, matched case-insensitively as a
    /// substring of the track name.
    pub weighted_words: HashMap<String, i64>,
    /// Resolved albums smaller than this are dropped from discovery.
    pub minimum_album_size: usize,
    /// Name prefix for generated playlists.
    pub recommendation_name_prefix: String,
}

impl UserPreferences {
    pub fn is_discovery_playlist_name(&self, name: &str) -> bool {
        self.discovery_playlist_names.iter().any(|n| n == name)
    }

    /// A discovery playlist is never a library playlist, even when its
    /// name also matches the library pattern.
    pub fn is_library_playlist_name(&self, name: &str) -> bool {
        !self.is_discovery_playlist_name(name) && self.library_pattern.is_match(name)
    }

    /// `"{prefix} {kind} {YYYY-MM-DD}"`
    pub fn recommendation_playlist_name(&self, kind: &str, now: DateTime<Utc>) -> String {
        format!(
            "{} {} {}",
            self.recommendation_name_prefix,
            kind,
            now.format("%Y-%m-%d")
        )
    }
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            library_pattern: Regex::new(r"^Metal \d+").unwrap(),
            discovery_playlist_names: vec![
                "Release Radar".to_string(),
                "Discover Weekly".to_string(),
            ],
            weighted_words: HashMap::from([
                ("instrumental".to_string(), -50),
                ("acoustic".to_string(), -30),
                ("re-imagined".to_string(), -30),
                ("remix".to_string(), -30),
            ]),
            minimum_album_size: 4,
            recommendation_name_prefix: "playlist-minder".to_string(),
        }
    }
}

/// Source of per-user preferences.
#[async_trait]
pub trait PreferenceProvider: Send + Sync {
    async fn preferences(&self, user_id: &str) -> Result<UserPreferences>;
}

/// Fixed preferences for every user. Used in tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences {
    prefs: UserPreferences,
}

impl StaticPreferences {
    pub fn new(prefs: UserPreferences) -> Self {
        Self { prefs }
    }
}

#[async_trait]
impl PreferenceProvider for StaticPreferences {
    async fn preferences(&self, _user_id: &str) -> Result<UserPreferences> {
        Ok(self.prefs.clone())
    }
}

/// Preferences persisted through the key/value store, one entry per user.
/// Users without a stored entry get the defaults.
pub struct StoredPreferences<S> {
    kv: S,
}

#[derive(Serialize, Deserialize)]
struct PreferencesDto {
    library_pattern: String,
    discovery_playlist_names: Vec<String>,
    weighted_words: HashMap<String, i64>,
    minimum_album_size: usize,
    recommendation_name_prefix: String,
}

impl TryFrom<PreferencesDto> for UserPreferences {
    type Error = crate::error::Error;

    fn try_from(dto: PreferencesDto) -> Result<Self> {
        Ok(Self {
            library_pattern: Regex::new(&dto.library_pattern)?,
            discovery_playlist_names: dto.discovery_playlist_names,
            weighted_words: dto.weighted_words,
            minimum_album_size: dto.minimum_album_size,
            recommendation_name_prefix: dto.recommendation_name_prefix,
        })
    }
}

impl From<&UserPreferences> for PreferencesDto {
    fn from(prefs: &UserPreferences) -> Self {
        Self {
            library_pattern: prefs.library_pattern.as_str().to_string(),
            discovery_playlist_names: prefs.discovery_playlist_names.clone(),
            weighted_words: prefs.weighted_words.clone(),
            minimum_album_size: prefs.minimum_album_size,
            recommendation_name_prefix: prefs.recommendation_name_prefix.clone(),
        }
    }
}

impl<S: KeyValueStore> StoredPreferences<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub async fn set(&self, user_id: &str, prefs: &UserPreferences) -> Result<()> {
        self.kv
            .put_json(&Self::key(user_id), &PreferencesDto::from(prefs))
            .await
    }

    fn key(user_id: &str) -> String {
        format!("user-preferences-{user_id}")
    }
}

#[async_trait]
impl<S: KeyValueStore> PreferenceProvider for StoredPreferences<S> {
    async fn preferences(&self, user_id: &str) -> Result<UserPreferences> {
        match self.kv.get_json::<PreferencesDto>(&Self::key(user_id)).await? {
            Some(dto) => dto.try_into(),
            None => Ok(UserPreferences::default()),
        }
    }
}
