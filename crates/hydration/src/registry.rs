//! Variable registry: which fetcher serves each variable and how its value
//! is extracted, cached, and keyed.

use crate::extract::{Extraction, TransformFn};
use crate::fetcher::Fetcher;
use crate::http::HttpFetcher;
use askwise_config::{AppConfig, VariableConfig};
use askwise_core::error::FetchError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One hydratable variable.
#[derive(Clone)]
pub struct VariableSpec {
    pub name: String,
    pub fetcher: Arc<dyn Fetcher>,
    pub extraction: Extraction,
    /// Falls back to the engine's default TTL
    pub ttl: Option<Duration>,
    /// Cache key includes the requested window
    pub time_range: bool,
}

impl VariableSpec {
    /// A variable extracted from its fetcher's payload under its own name.
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        let name = name.into();
        Self {
            extraction: Extraction::KeyPath(vec![name.clone()]),
            name,
            fetcher,
            ttl: None,
            time_range: false,
        }
    }

    pub fn key_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extraction = Extraction::KeyPath(path.into_iter().map(Into::into).collect());
        self
    }

    /// Use the payload unchanged.
    pub fn raw(mut self) -> Self {
        self.extraction = Extraction::Raw;
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        let f: TransformFn = Arc::new(f);
        self.extraction = Extraction::Transform(f);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn time_range(mut self) -> Self {
        self.time_range = true;
        self
    }
}

impl std::fmt::Debug for VariableSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableSpec")
            .field("name", &self.name)
            .field("fetcher", &self.fetcher.id())
            .field("extraction", &self.extraction)
            .field("ttl", &self.ttl)
            .field("time_range", &self.time_range)
            .finish()
    }
}

/// All known variables, keyed by name.
#[derive(Clone, Default, Debug)]
pub struct VariableRegistry {
    specs: HashMap<String, VariableSpec>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Replaces any existing one with the same name.
    pub fn register(&mut self, spec: VariableSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn with(mut self, spec: VariableSpec) -> Self {
        self.register(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Sorted variable names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Build the registry described by `[variables]`, one [`HttpFetcher`]
    /// per distinct endpoint.
    ///
    /// An endpoint is fetched with the window when any of its variables is
    /// time-range sensitive.
    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        let client = HttpFetcher::client_with_timeout(Duration::from_secs(
            config.data_service.timeout_secs,
        ))?;

        let mut fetchers: HashMap<&str, Arc<dyn Fetcher>> = HashMap::new();
        for (endpoint, windowed) in endpoints(&config.variables) {
            let mut fetcher = HttpFetcher::new(&config.data_service.base_url, endpoint)
                .with_client(client.clone());
            if windowed {
                fetcher = fetcher.windowed();
            }
            fetchers.insert(endpoint, Arc::new(fetcher));
        }

        let mut registry = Self::new();
        for (name, var) in &config.variables {
            let Some(fetcher) = fetchers.get(var.endpoint.as_str()) else {
                continue;
            };
            let mut spec = VariableSpec::new(name.clone(), Arc::clone(fetcher));
            if var.raw {
                spec = spec.raw();
            } else if let Some(path) = &var.key_path {
                spec = spec.key_path(path.iter().cloned());
            }
            if let Some(secs) = var.ttl_secs {
                spec = spec.ttl(Duration::from_secs(secs));
            }
            if var.time_range {
                spec = spec.time_range();
            }
            registry.register(spec);
        }

        debug!(
            variables = registry.len(),
            endpoints = fetchers.len(),
            "Built variable registry from config"
        );
        Ok(registry)
    }
}

/// Distinct endpoints and whether any of their variables is windowed.
fn endpoints(
    variables: &std::collections::BTreeMap<String, VariableConfig>,
) -> Vec<(&str, bool)> {
    let mut out: Vec<(&str, bool)> = Vec::new();
    for var in variables.values() {
        match out.iter_mut().find(|(e, _)| *e == var.endpoint) {
            Some((_, windowed)) => *windowed |= var.time_range,
            None => out.push((var.endpoint.as_str(), var.time_range)),
        }
    }
    out
}
