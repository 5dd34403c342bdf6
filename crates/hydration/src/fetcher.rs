//! Fetcher trait: one remote call that can serve many variables.
//!
//! Variables registered with the same fetcher (same [`Fetcher::id`]) are
//! satisfied by a single call per resolve.

use crate::window::DateWindow;
use askwise_core::cache::CacheStore;
use askwise_core::error::FetchError;
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A remote data source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identity used to batch variables onto one call.
    fn id(&self) -> &str;

    /// Whether the fetch takes the requested date window.
    fn accepts_window(&self) -> bool {
        false
    }

    /// Fetch the raw payload. `Ok(None)` means the source had nothing.
    ///
    /// `window` is `Some` only when [`accepts_window`](Self::accepts_window) is true.
    async fn fetch(
        &self,
        user_token: &str,
        window: Option<DateWindow>,
    ) -> Result<Option<Value>, FetchError>;
}

type BlockingFetchFn =
    dyn Fn(&str, Option<DateWindow>) -> Result<Option<Value>, FetchError> + Send + Sync;

/// Adapts a synchronous closure into a [`Fetcher`].
///
/// The closure runs on the blocking thread pool so it never stalls the
/// async workers.
pub struct FnFetcher {
    id: String,
    accepts_window: bool,
    f: Arc<BlockingFetchFn>,
}

impl FnFetcher {
    pub fn new<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, Option<DateWindow>) -> Result<Option<Value>, FetchError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            accepts_window: false,
            f: Arc::new(f),
        }
    }

    /// Pass the requested window to the closure.
    pub fn windowed(mut self) -> Self {
        self.accepts_window = true;
        self
    }
}

#[async_trait]
impl Fetcher for FnFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn accepts_window(&self) -> bool {
        self.accepts_window
    }

    async fn fetch(
        &self,
        user_token: &str,
        window: Option<DateWindow>,
    ) -> Result<Option<Value>, FetchError> {
        let f = Arc::clone(&self.f);
        let token = user_token.to_string();
        tokio::task::spawn_blocking(move || f(&token, window))
            .await
            .map_err(|e| FetchError::Task(format!("{}: {e}", self.id)))?
    }
}

/// Memoizes another fetcher's raw payload in the cache store.
///
/// Entries are keyed `func_cache:<fetcher id>:<sha256 of the arguments>`,
/// so distinct users and windows never share an entry.
pub struct CachedFetcher {
    inner: Arc<dyn Fetcher>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn cache_key(&self, user_token: &str, window: Option<&DateWindow>) -> String {
        let args = json!([
            user_token,
            window.map(|w| w.from.to_string()),
            window.map(|w| w.to.to_string()),
        ]);
        let digest = Sha256::digest(args.to_string().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("func_cache:{}:{hex}", self.inner.id())
    }
}

#[async_trait]
impl Fetcher for CachedFetcher {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn accepts_window(&self) -> bool {
        self.inner.accepts_window()
    }

    async fn fetch(
        &self,
        user_token: &str,
        window: Option<DateWindow>,
    ) -> Result<Option<Value>, FetchError> {
        let key = self.cache_key(user_token, window.as_ref());

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(payload) => {
                    debug!(fetcher = %self.id(), "Memoized payload hit");
                    return Ok(Some(payload));
                }
                Err(e) => warn!(fetcher = %self.id(), error = %e, "Discarding undecodable memoized payload"),
            },
            Ok(None) => {}
            Err(e) => warn!(fetcher = %self.id(), error = %e, "Memo cache read failed"),
        }

        let payload = self.inner.fetch(user_token, window).await?;
        if let Some(value) = &payload {
            let encoded = value.to_string();
            if let Err(e) = self.cache.set(&key, encoded.as_bytes(), self.ttl).await {
                warn!(fetcher = %self.id(), error = %e, "Memo cache write failed");
            }
        }
        Ok(payload)
    }
}
