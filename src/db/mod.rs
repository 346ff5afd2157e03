//! SQLite-backed storage.
//!
//! Uses SQLx with SQLite. [`Database`] wraps the connection pool with a
//! process-level reader/writer gate: readers proceed concurrently, writers
//! are exclusive. SQLite transactions are serializable on their own; the
//! gate additionally serializes writers at the process level for drivers
//! that do not do so safely themselves. The lease table and the index
//! tables live in the same store and share its transaction boundaries.

use std::ops::Deref;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;

pub mod kv;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "playlist_minder.db";

/// Build a SQLite database URL from an optional path.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Shared handle to the transactional store.
pub struct Database {
    pool: SqlitePool,
    gate: RwLock<()>,
}

impl Database {
    /// Open (creating if necessary) the database at `db_url` and run all
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or connected to,
    /// or if a migration fails.
    pub async fn open(db_url: &str) -> Result<Self> {
        if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            gate: RwLock::new(()),
        })
    }

    /// Acquire the pool for reading. Concurrent readers are allowed.
    pub async fn read(&self) -> ReadHandle<'_> {
        ReadHandle {
            pool: &self.pool,
            _guard: self.gate.read().await,
        }
    }

    /// Acquire the pool for writing. Exclusive against readers and other
    /// writers for the lifetime of the handle.
    pub async fn write(&self) -> WriteHandle<'_> {
        WriteHandle {
            pool: &self.pool,
            _guard: self.gate.write().await,
        }
    }
}

/// Read access to the pool; holds a shared slot on the gate.
pub struct ReadHandle<'a> {
    pool: &'a SqlitePool,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Deref for ReadHandle<'_> {
    type Target = SqlitePool;

    fn deref(&self) -> &SqlitePool {
        self.pool
    }
}

/// Write access to the pool; holds the exclusive slot on the gate.
pub struct WriteHandle<'a> {
    pool: &'a SqlitePool,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Deref for WriteHandle<'_> {
    type Target = SqlitePool;

    fn deref(&self) -> &SqlitePool {
        self.pool
    }
}
