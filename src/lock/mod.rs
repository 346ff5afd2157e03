//! Named, TTL-based mutual exclusion backed by the transactional store.
//!
//! A lease that is never released becomes acquirable again once its TTL
//! elapses, so a crashed holder cannot deadlock the key permanently.
//! Released leases stay behind as history rows (`released_at`,
//! `released_by`); a partial unique index admits at most one live lease
//! per key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Sqlite;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result, ResultExt};

/// Named, TTL-based mutual exclusion.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Acquire an exclusive lease on `key`, returning a unique token.
    /// Returns [`Error::Locked`] while the key is held by a non-expired
    /// lease. An expired-but-unreleased lease is reclaimed atomically.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Extend the lease's expiry. Returns [`Error::NoSuchLock`] if the
    /// lease was already released, or expired and reclaimed by someone
    /// else.
    async fn refresh(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Mark the lease released. Returns [`Error::NoSuchLock`] if it was
    /// already released; callers treat that as a no-op, the same way an
    /// idempotent rollback is treated.
    async fn unlock(&self, token: &str) -> Result<()>;
}

/// [`Locker`] over the shared SQLite store.
pub struct SqliteLocker {
    db: Arc<Database>,
}

impl SqliteLocker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Locker for SqliteLocker {
    async fn lock(&self, key: &str, ttl: Duration) -> Result<String> {
        let token = format!("{key}__{}", Uuid::new_v4());
        debug!(key, token, ?ttl, "locking key");

        let handle = self.db.write().await;
        let mut tx = handle.begin().await?;

        // The expiry check and the acquisition happen in one transaction,
        // so two concurrent lock calls can never both succeed.
        let existing: Option<(String, bool)> = sqlx::query_as(
            r#"
            SELECT token, expires_at < strftime('%Y-%m-%d %H:%M:%f', 'now') AS is_expired
            FROM locks
            WHERE key = ? AND expires_at IS NOT NULL
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .with_context("querying existing lock")?;

        if let Some((existing_token, is_expired)) = existing {
            if !is_expired {
                debug!(key, existing_token, "key is already locked");
                return Err(Error::Locked);
            }
            debug!(key, existing_token, "existing lock is expired, releasing it");
            release_lock(&mut *tx, &existing_token, &token).await?;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO locks (key, token, expires_at)
            VALUES (?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now', ?))
            "#,
        )
        .bind(key)
        .bind(&token)
        .bind(ttl_modifier(ttl))
        .execute(&mut *tx)
        .await;

        match inserted {
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(Error::Locked);
            }
            other => {
                other.with_context(format!("locking key {key}"))?;
            }
        }

        tx.commit().await?;
        Ok(token)
    }

    async fn refresh(&self, token: &str, ttl: Duration) -> Result<()> {
        debug!(token, ?ttl, "refreshing lock");

        let handle = self.db.write().await;
        let result = sqlx::query(
            r#"
            UPDATE locks
            SET expires_at = strftime('%Y-%m-%d %H:%M:%f', 'now', ?)
            WHERE token = ? AND expires_at IS NOT NULL
            "#,
        )
        .bind(ttl_modifier(ttl))
        .bind(token)
        .execute(&*handle)
        .await
        .with_context("refreshing lock")?;

        if result.rows_affected() == 0 {
            debug!(token, "lock not found, is it already unlocked?");
            return Err(Error::NoSuchLock);
        }
        Ok(())
    }

    async fn unlock(&self, token: &str) -> Result<()> {
        debug!(token, "unlocking");

        let handle = self.db.write().await;
        release_lock(&*handle, token, token).await
    }
}

async fn release_lock<'e, E>(executor: E, token: &str, released_by: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE locks
        SET expires_at = NULL,
            released_at = strftime('%Y-%m-%d %H:%M:%f', 'now'),
            released_by = ?
        WHERE token = ? AND expires_at IS NOT NULL
        "#,
    )
    .bind(released_by)
    .bind(token)
    .execute(executor)
    .await
    .with_context("releasing lock")?;

    if result.rows_affected() == 0 {
        debug!(token, "lock not found, is it already unlocked?");
        return Err(Error::NoSuchLock);
    }
    Ok(())
}

fn ttl_modifier(ttl: Duration) -> String {
    format!("+{} seconds", ttl.as_secs_f64())
}

/// Run `op` inside a leased critical section on `key`.
///
/// While the key is held elsewhere, polls every 0.25×ttl. Once acquired,
/// a background refresher extends the lease every 0.75×ttl until `op`
/// completes (or this future is dropped), so the lease stays alive well
/// past its TTL for long operations, yet self-heals within one TTL if the
/// holder dies. The lease is always released on exit; an already-released
/// lease is not an error.
pub async fn with_lease<T, F, Fut>(
    locker: Arc<dyn Locker>,
    key: &str,
    ttl: Duration,
    op: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let poll_interval = ttl.mul_f64(0.25);
    let refresh_interval = ttl.mul_f64(0.75);

    let token = loop {
        match locker.lock(key, ttl).await {
            Ok(token) => break token,
            Err(Error::Locked) => {
                debug!(key, ?poll_interval, "lease already claimed, polling");
                tokio::time::sleep(poll_interval).await;
            }
            Err(err) => return Err(err.context(format!("acquiring lease on {key}"))),
        }
    };

    let _refresher = AbortOnDrop(tokio::spawn({
        let locker = Arc::clone(&locker);
        let token = token.clone();
        let key = key.to_string();
        async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                if let Err(err) = locker.refresh(&token, ttl).await {
                    // Best effort: a single missed refresh is not fatal as
                    // long as a later one lands before expiry.
                    warn!(key, error = %err, "ignoring failure to refresh lease");
                }
            }
        }
    }));

    let result = op().await;

    match locker.unlock(&token).await {
        Ok(()) => {}
        Err(err) if err.is_no_such_lock() => {}
        Err(err) => warn!(key, error = %err, "failed to release lease"),
    }

    result
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
