//! The hydration engine.
//!
//! `resolve` runs in three phases:
//! 1. cache lookup per variable (`user_report:<var>:<token>[:<from>:<to>]`)
//! 2. misses grouped by fetcher id, one fetch per group, at most
//!    `max_workers` fetches in flight
//! 3. extraction per variable, then cache write
//!
//! Values are cached JSON-encoded. A variable with no value (failed fetch,
//! empty payload, extraction miss) is cached as the empty byte string with
//! the variable's normal TTL. That sentinel counts as a hit: the variable is
//! left out of the result and not fetched again until it expires.

use crate::fetcher::Fetcher;
use crate::registry::{VariableRegistry, VariableSpec};
use crate::window::DateWindow;
use askwise_config::HydrationConfig;
use askwise_core::cache::CacheStore;
use askwise_core::error::FetchError;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const DEFAULT_MAX_WORKERS: usize = 3;
const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Resolves variable names to values for one user.
#[derive(Clone)]
pub struct HydrationEngine {
    registry: Arc<VariableRegistry>,
    cache: Arc<dyn CacheStore>,
    max_workers: usize,
    default_ttl: Duration,
    default_window_days: u32,
}

/// Misses that share one fetch.
struct FetchGroup<'a> {
    fetcher: Arc<dyn Fetcher>,
    specs: Vec<&'a VariableSpec>,
}

impl HydrationEngine {
    pub fn new(registry: Arc<VariableRegistry>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            registry,
            cache,
            max_workers: DEFAULT_MAX_WORKERS,
            default_ttl: DEFAULT_TTL,
            default_window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Engine with pool size, default TTL and default window from config.
    pub fn from_config(
        registry: Arc<VariableRegistry>,
        cache: Arc<dyn CacheStore>,
        config: &HydrationConfig,
    ) -> Self {
        Self::new(registry, cache)
            .with_max_workers(config.max_workers)
            .with_default_ttl(Duration::from_secs(config.default_ttl_secs))
            .with_default_window_days(config.default_window_days)
    }

    /// Cap on concurrent fetches (minimum 1).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_default_window_days(mut self, days: u32) -> Self {
        self.default_window_days = days;
        self
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// The window used when a caller passes none.
    pub fn default_window(&self) -> DateWindow {
        DateWindow::last_days(self.default_window_days)
    }

    /// Cache key for `spec`; the window is part of it only for time-range variables.
    pub fn cache_key(spec: &VariableSpec, user_token: &str, window: &DateWindow) -> String {
        let mut key = format!("user_report:{}:{}", spec.name, user_token);
        if spec.time_range {
            key.push_str(&window.cache_suffix());
        }
        key
    }

    /// Resolve `names` for `user_token`.
    ///
    /// Unknown names are skipped with a warning. Failures never propagate:
    /// a variable that cannot be produced is simply absent from the result.
    pub async fn resolve<S: AsRef<str>>(
        &self,
        user_token: &str,
        names: &[S],
        window: Option<DateWindow>,
        use_cache: bool,
    ) -> Map<String, Value> {
        let window = window.unwrap_or_else(|| self.default_window());
        let mut resolved = Map::new();
        let mut misses: Vec<&VariableSpec> = Vec::new();

        for name in names {
            let name = name.as_ref();
            let Some(spec) = self.registry.get(name) else {
                warn!(variable = %name, "No mapping for variable, skipping");
                continue;
            };
            if resolved.contains_key(name) || misses.iter().any(|s| s.name == name) {
                continue;
            }

            if use_cache {
                let key = Self::cache_key(spec, user_token, &window);
                match self.cache.get(&key).await {
                    Ok(Some(bytes)) if bytes.is_empty() => {
                        debug!(variable = %name, "Cached empty sentinel, skipping fetch");
                        continue;
                    }
                    Ok(Some(bytes)) => {
                        debug!(variable = %name, "Cache hit");
                        resolved.insert(name.to_string(), decode_cached(&bytes));
                        continue;
                    }
                    Ok(None) => debug!(variable = %name, "Cache miss"),
                    Err(e) => warn!(variable = %name, error = %e, "Cache read failed, fetching"),
                }
            }
            misses.push(spec);
        }

        if misses.is_empty() {
            return resolved;
        }

        let groups = group_by_fetcher(misses);
        info!(
            groups = groups.len(),
            variables = groups.iter().map(|g| g.specs.len()).sum::<usize>(),
            max_workers = self.max_workers,
            "Fetching uncached variables"
        );

        let results = self.run_fetches(user_token, window, &groups).await;

        for (group, result) in groups.iter().zip(results) {
            match result {
                Ok(Some(payload)) => {
                    for spec in &group.specs {
                        match spec.extraction.apply(&payload) {
                            Some(value) => {
                                if use_cache {
                                    self.store(spec, user_token, &window, value.to_string().as_bytes())
                                        .await;
                                }
                                resolved.insert(spec.name.clone(), value);
                            }
                            None => {
                                warn!(variable = %spec.name, "Extraction produced no value");
                                if use_cache {
                                    self.store(spec, user_token, &window, b"").await;
                                }
                            }
                        }
                    }
                }
                Ok(None) => {
                    warn!(fetcher = %group.fetcher.id(), "Fetch returned no data");
                    self.store_sentinels(group, user_token, &window, use_cache).await;
                }
                Err(e) => {
                    warn!(fetcher = %group.fetcher.id(), error = %e, "Fetch failed");
                    self.store_sentinels(group, user_token, &window, use_cache).await;
                }
            }
        }

        resolved
    }

    /// Resolve a single variable; time-range variables use the last
    /// `last_num_days` days (default window length when `None`).
    pub async fn resolve_one(
        &self,
        user_token: &str,
        name: &str,
        last_num_days: Option<u32>,
    ) -> Option<Value> {
        let window = DateWindow::last_days(last_num_days.unwrap_or(self.default_window_days));
        let mut values = self.resolve(user_token, &[name], Some(window), true).await;
        values.remove(name)
    }

    /// One task per group, bounded by a semaphore; results in group order.
    async fn run_fetches(
        &self,
        user_token: &str,
        window: DateWindow,
        groups: &[FetchGroup<'_>],
    ) -> Vec<Result<Option<Value>, FetchError>> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(groups.len());

        for group in groups {
            let permit = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&group.fetcher);
            let token = user_token.to_string();
            let window = fetcher.accepts_window().then_some(window);

            handles.push(tokio::spawn(async move {
                let _permit = permit
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchError::Task(e.to_string()))?;
                fetcher.fetch(&token, window).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Task(e.to_string())),
            });
        }
        results
    }

    async fn store(&self, spec: &VariableSpec, user_token: &str, window: &DateWindow, bytes: &[u8]) {
        let key = Self::cache_key(spec, user_token, window);
        let ttl = spec.ttl.unwrap_or(self.default_ttl);
        if let Err(e) = self.cache.set(&key, bytes, ttl).await {
            warn!(variable = %spec.name, error = %e, "Cache write failed");
        }
    }

    async fn store_sentinels(
        &self,
        group: &FetchGroup<'_>,
        user_token: &str,
        window: &DateWindow,
        use_cache: bool,
    ) {
        if !use_cache {
            return;
        }
        for spec in &group.specs {
            self.store(spec, user_token, window, b"").await;
        }
    }
}

impl std::fmt::Debug for HydrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydrationEngine")
            .field("variables", &self.registry.len())
            .field("cache", &self.cache.name())
            .field("max_workers", &self.max_workers)
            .field("default_ttl", &self.default_ttl)
            .field("default_window_days", &self.default_window_days)
            .finish()
    }
}

/// Group misses by fetcher id, in first-seen order.
fn group_by_fetcher(misses: Vec<&VariableSpec>) -> Vec<FetchGroup<'_>> {
    let mut groups: Vec<FetchGroup<'_>> = Vec::new();
    for spec in misses {
        match groups.iter_mut().find(|g| g.fetcher.id() == spec.fetcher.id()) {
            Some(group) => group.specs.push(spec),
            None => groups.push(FetchGroup {
                fetcher: Arc::clone(&spec.fetcher),
                specs: vec![spec],
            }),
        }
    }
    groups
}

/// Cached bytes are JSON; anything else is kept as a string.
fn decode_cached(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
