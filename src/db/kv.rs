//! Opaque key/value cache contract.
//!
//! The provider-adaptor layer caches populated playlists, albums and
//! tracks through this; the index core itself never depends on it.
//! Serialization is explicit: raw bytes on the trait, JSON through
//! [`KeyValueStoreExt`]. No runtime type matching.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::Result;

/// Get/put cache keyed by opaque strings.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a single value; `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch many values at once. The result has the same length and order
    /// as `keys`, with `None` for misses.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Store a value, replacing any previous one.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Typed JSON access on top of the raw byte contract.
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// SQLite-backed store, namespaced by `kind` so multiple caches can share
/// one table.
pub struct SqliteKeyValueStore {
    db: Arc<Database>,
    kind: String,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<Database>, kind: impl Into<String>) -> Self {
        Self {
            db,
            kind: kind.into(),
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let handle = self.db.read().await;

        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM keyvalue WHERE kind = ? AND key = ?")
                .bind(&self.kind)
                .bind(key)
                .fetch_optional(&*handle)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let handle = self.db.read().await;

        let placeholders = vec!["?"; keys.len()].join(", ");
        let query = format!(
            "SELECT key, value FROM keyvalue WHERE kind = ? AND key IN ({placeholders})"
        );

        let mut q = sqlx::query_as::<_, (String, Vec<u8>)>(&query).bind(&self.kind);
        for key in keys {
            q = q.bind(key);
        }
        let rows = q.fetch_all(&*handle).await?;

        let mut found: HashMap<String, Vec<u8>> = rows.into_iter().collect();
        Ok(keys.iter().map(|k| found.remove(k)).collect())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let handle = self.db.write().await;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO keyvalue (kind, key, value, updated_at)
            VALUES (?, ?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))
            "#,
        )
        .bind(&self.kind)
        .bind(key)
        .bind(value)
        .execute(&*handle)
        .await?;

        Ok(())
    }
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let entries = self.entries.lock().await;
        Ok(keys.iter().map(|k| entries.get(k).cloned()).collect())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
