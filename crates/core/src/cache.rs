//! CacheStore trait: the key/value store behind variable hydration.
//!
//! Values are opaque bytes with a per-entry TTL. Stores are shared between
//! concurrent requests and synchronize internally; callers do no locking.

use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// The core CacheStore trait.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Read a live entry. Expired entries read as `None`.
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError>;

    /// Write an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> std::result::Result<(), CacheError>;

    /// Remove an entry. Returns true if it existed.
    async fn delete(&self, key: &str) -> std::result::Result<bool, CacheError>;
}
