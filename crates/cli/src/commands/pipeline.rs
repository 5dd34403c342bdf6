//! Wiring shared by commands: config → cache → hydration → runtime.

use askwise_cache::{InMemoryCache, NoopCache};
use askwise_config::{AppConfig, CacheBackend};
use askwise_core::cache::CacheStore;
use askwise_handlers::CapabilityRuntime;
use askwise_hydration::{HydrationEngine, VariableRegistry};
use askwise_orchestrator::{AuditLog, TracingAuditSink};
use askwise_providers::OpenAiCompatInvoker;
use std::sync::Arc;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Open the cache store selected by `config.cache.backend`.
pub async fn cache(config: &AppConfig) -> CliResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(InMemoryCache::new()),
        CacheBackend::None => Arc::new(NoopCache),
        #[cfg(feature = "sqlite")]
        CacheBackend::Sqlite => {
            let path = config.cache.sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(askwise_cache::SqliteCache::new(&path.to_string_lossy()).await?)
        }
        #[cfg(not(feature = "sqlite"))]
        CacheBackend::Sqlite => {
            return Err("cache backend 'sqlite' requires the sqlite feature".into());
        }
    };
    tracing::debug!(backend = store.name(), "Cache store ready");
    Ok(store)
}

/// Hydration engine over the configured variables and data service.
pub async fn engine(config: &AppConfig) -> CliResult<HydrationEngine> {
    let registry = Arc::new(VariableRegistry::from_config(config)?);
    let cache = cache(config).await?;
    Ok(HydrationEngine::from_config(registry, cache, &config.hydration))
}

/// Capability runtime backed by the configured model endpoint.
pub async fn runtime(config: &AppConfig) -> CliResult<Arc<CapabilityRuntime>> {
    let invoker = Arc::new(OpenAiCompatInvoker::from_config(config)?);
    let audit = AuditLog::with_sinks(vec![Box::new(TracingAuditSink)]);
    let runtime = CapabilityRuntime::new(invoker)
        .with_engine(engine(config).await?)
        .with_capabilities(config.capabilities.clone())
        .with_audit(Arc::new(audit));
    Ok(Arc::new(runtime))
}
