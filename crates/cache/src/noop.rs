//! No-op cache store: disables caching entirely.

use askwise_core::cache::CacheStore;
use askwise_core::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// A cache store that stores nothing; every read is a miss.
pub struct NoopCache;

#[async_trait]
impl CacheStore for NoopCache {
    fn name(&self) -> &str { "none" }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }
}
