//! SQLite cache store: survives process restarts.
//!
//! A single `cache_entries` table holds the value and an absolute expiry
//! (unix milliseconds). Expired rows read as misses and are removed by
//! [`SqliteCache::purge_expired`].

use askwise_core::cache::CacheStore;
use askwise_core::error::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// A SQLite-backed cache store.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`.
    ///
    /// Accepts a plain file path or a `sqlite://` URL.
    pub async fn new(path: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| CacheError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::Storage(format!("Failed to open SQLite: {e}")))?;

        let cache = Self { pool };
        cache.run_migrations().await?;
        info!("SQLite cache initialized at {path}");
        Ok(cache)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        let cache = Self { pool };
        cache.run_migrations().await?;
        Ok(cache)
    }

    async fn run_migrations(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY NOT NULL,
                value       BLOB NOT NULL,
                expires_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(format!("cache_entries table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(format!("expires_at index: {e}")))?;

        Ok(())
    }

    /// Delete every expired row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Storage(format!("purge failed: {e}")))?;
        debug!(removed = result.rows_affected(), "Purged expired cache entries");
        Ok(result.rows_affected())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl CacheStore for SqliteCache {
    fn name(&self) -> &str { "sqlite" }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Storage(format!("get failed: {e}")))?;

        row.map(|r| r.try_get::<Vec<u8>, _>("value"))
            .transpose()
            .map_err(|e| CacheError::Serialization(format!("bad cache row: {e}")))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Storage(format!("set failed: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Storage(format!("delete failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_cache() -> (tempfile::TempDir, SqliteCache) {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("cache.db").display());
        let cache = SqliteCache::new(&path).await.unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn set_get_delete() {
        let (_dir, cache) = test_cache().await;
        cache.set("k", b"{\"a\":1}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"{\"a\":1}".to_vec()));

        cache.set("k", b"2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"2".to_vec()));

        assert!(cache.delete("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_reads_as_miss_and_purges() {
        let (_dir, cache) = test_cache().await;
        cache.set("gone", b"v", Duration::ZERO).await.unwrap();
        assert!(cache.get("gone").await.unwrap().is_none());
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("cache.db").display());

        {
            let cache = SqliteCache::new(&path).await.unwrap();
            cache.set("k", b"", Duration::from_secs(600)).await.unwrap();
        }

        let reopened = SqliteCache::new(&path).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(Vec::new()));
    }
}
