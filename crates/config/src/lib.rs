//! Configuration loading, validation, and management for askwise.
//!
//! Loads configuration from `~/.askwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.askwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible model endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Routing and aggregation settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Variable hydration settings
    #[serde(default)]
    pub hydration: HydrationConfig,

    /// Cache backend
    #[serde(default)]
    pub cache: CacheConfig,

    /// Remote user-data service
    #[serde(default)]
    pub data_service: DataServiceConfig,

    /// Vector store searched by `file_search` capabilities
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,

    /// Capability prompts, keyed by capability id
    #[serde(default = "default_capabilities")]
    pub capabilities: BTreeMap<String, CapabilityConfig>,

    /// Hydratable variables, keyed by variable name
    #[serde(default = "default_variables")]
    pub variables: BTreeMap<String, VariableConfig>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("orchestrator", &self.orchestrator)
            .field("hydration", &self.hydration)
            .field("cache", &self.cache)
            .field("data_service", &self.data_service)
            .field("knowledge_base", &self.knowledge_base)
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .field("variables", &self.variables.len())
            .finish()
    }
}

/// Routing and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capability that classifies the raw query
    #[serde(default = "default_router_capability")]
    pub router_capability: String,

    /// Capability that merges handler outputs
    #[serde(default = "default_summarizer_capability")]
    pub summarizer_capability: String,

    /// Capabilities whose response is returned verbatim
    #[serde(default = "default_terminal_capabilities")]
    pub terminal_capabilities: Vec<String>,

    /// Most recent history messages passed to the router
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_router_capability() -> String {
    "ASK_DIGBI_INTENT_CLASSIFIER_AGENT".into()
}
fn default_summarizer_capability() -> String {
    "ASK_DIGBI_SUMMARIZER_AGENT".into()
}
fn default_terminal_capabilities() -> Vec<String> {
    vec!["nora_recipe_agent".into()]
}
fn default_history_limit() -> usize {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            router_capability: default_router_capability(),
            summarizer_capability: default_summarizer_capability(),
            terminal_capabilities: default_terminal_capabilities(),
            history_limit: default_history_limit(),
        }
    }
}

/// Variable hydration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationConfig {
    /// Maximum concurrent remote fetches per resolve
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// TTL for variables that don't set their own
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Length of the window used when none is requested
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,
}

fn default_max_workers() -> usize {
    3
}
fn default_ttl_secs() -> u64 {
    60
}
fn default_window_days() -> u32 {
    7
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            default_ttl_secs: default_ttl_secs(),
            default_window_days: default_window_days(),
        }
    }
}

/// Which cache store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
    None,
}

/// Cache backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Database file for the sqlite backend (default `~/.askwise/cache.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    /// Resolved sqlite path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("cache.db"))
    }
}

/// Remote user-data service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataServiceConfig {
    #[serde(default = "default_data_url")]
    pub base_url: String,

    #[serde(default = "default_data_timeout")]
    pub timeout_secs: u64,
}

fn default_data_url() -> String {
    "http://localhost:8080/api".into()
}
fn default_data_timeout() -> u64 {
    15
}

impl Default for DataServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_url(),
            timeout_secs: default_data_timeout(),
        }
    }
}

/// Knowledge-base search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Vector store id; without one no capability can search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,

    /// Most search hits handed back to the model per call
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            vector_store_id: None,
            max_results: default_max_results(),
        }
    }
}

/// Prompt and model settings of one capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// System instructions
    #[serde(default)]
    pub instructions: String,

    /// Prompt variables to hydrate before invoking
    #[serde(default)]
    pub variables: Vec<String>,

    /// Whether the capability answers with a JSON object
    #[serde(default)]
    pub structured: bool,

    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Temperature override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether the capability answers from the knowledge base through the
    /// `file_search` tool
    #[serde(default, skip_serializing_if = "is_false")]
    pub file_search: bool,
}

impl CapabilityConfig {
    fn new(instructions: &str, variables: &[&str], structured: bool) -> Self {
        Self {
            instructions: instructions.into(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            structured,
            model: None,
            temperature: None,
            file_search: false,
        }
    }

    fn searchable(mut self) -> Self {
        self.file_search = true;
        self
    }
}

/// How one hydratable variable is fetched and extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Data-service endpoint; variables sharing it share one remote call
    pub endpoint: String,

    /// Path into the payload (defaults to the variable name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<Vec<String>>,

    /// Use the raw payload instead of extracting a key path
    #[serde(default, skip_serializing_if = "is_false")]
    pub raw: bool,

    /// Cache TTL (defaults to `hydration.default_ttl_secs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,

    /// Whether the cache key includes the requested window
    #[serde(default, skip_serializing_if = "is_false")]
    pub time_range: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

const REPORT_TTL: u64 = 15 * 24 * 60 * 60;
const SNAPSHOT_TTL: u64 = 180;

impl VariableConfig {
    fn keyed(endpoint: &str, key: &[&str], ttl: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            key_path: Some(key.iter().map(|k| k.to_string()).collect()),
            raw: false,
            ttl_secs: Some(ttl),
            time_range: false,
        }
    }

    fn raw(endpoint: &str, ttl: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            key_path: None,
            raw: true,
            ttl_secs: Some(ttl),
            time_range: false,
        }
    }

    fn windowed(mut self) -> Self {
        self.time_range = true;
        self
    }
}

fn default_capabilities() -> BTreeMap<String, CapabilityConfig> {
    let table = [
        (
            "ASK_DIGBI_INTENT_CLASSIFIER_AGENT",
            CapabilityConfig::new(
                "Classify the user's request. Reply with JSON {\"actions\":[{\"action\",\"agent\",\"message\",\"revised_query\"}],\"details\",\"language\"}. \
                 Use respond_directly, request_clarification, reject or acknowledge for requests no specialist should handle; \
                 otherwise delegate to health_insights_agent, personalization_agent, nutrition_agent, support_agent or nora_recipe_agent.",
                &["query", "conversation_history", "language"],
                true,
            ),
        ),
        (
            "ASK_DIGBI_SUMMARIZER_AGENT",
            CapabilityConfig::new(
                "Merge the specialist responses into one answer for the user. Reply with JSON {\"status\",\"message\",\"meta\",\"message_references_a_video\"}.",
                &["query", "formatted_responses", "details", "language"],
                true,
            ),
        ),
        (
            "SUPPORT_AGENT",
            CapabilityConfig::new(
                "Decide how to handle a support request. Reply with JSON {\"actions\":[{\"action\",\"agent\",\"message\"}],\"data_to_use\":{}}.",
                &["query", "eligible_kits", "user_enrollment_status"],
                true,
            ),
        ),
        (
            "ASK_DIGBI_SUPPORT_AGENT",
            CapabilityConfig::new(
                "Answer the support question from the knowledge base. Reply with JSON {\"status\",\"message\",\"kit_registration_intent\",\"invite_dependent_intent\"}.",
                &["query", "has_eligible_dependents_to_enroll", "eligible_kits", "language"],
                true,
            )
            .searchable(),
        ),
        (
            "ASK_DIGBI_NUTRITION_AGENT",
            CapabilityConfig::new(
                "Answer the nutrition question using the user's data and the knowledge base. Reply with JSON {\"status\",\"message\",\"message_references_a_video\"}.",
                &["query", "nd_score_average", "dietary_restrictions", "primary_motivation", "language"],
                true,
            )
            .searchable(),
        ),
        (
            "NORA_RECIPE_AGENT",
            CapabilityConfig::new(
                "Suggest recipes that avoid every excluded ingredient. Reply with JSON {\"status\",\"message\",\"shopping_list_request\",\"recipes\":[{\"id\",\"title\",\"url\",\"description\"}]}.",
                &["query", "excluded_ingredients", "language"],
                true,
            ),
        ),
        (
            "USER_DATA_AGENT",
            CapabilityConfig::new(
                "Answer questions about the user's own logged data.",
                &["query", "weight_logs", "meal_logs", "gender", "language"],
                false,
            ),
        ),
        (
            "ASK_DIGBI_HEALTH_INSIGHTS_AGENT",
            CapabilityConfig::new(
                "Explain the user's health reports. Reply with JSON {\"status\":\"success|failure\",\"message\"}.",
                &["query", "genetic_report_data", "gut_report_data", "high_risk_traits", "language"],
                true,
            ),
        ),
        (
            "ASK_DIGBI_HEALTH_INSIGHTS_GPT_AGENT",
            CapabilityConfig::new(
                "Answer the general health question.",
                &["query", "language"],
                false,
            ),
        ),
    ];
    table
        .into_iter()
        .map(|(id, cfg)| (id.to_string(), cfg))
        .collect()
}

fn default_variables() -> BTreeMap<String, VariableConfig> {
    const SNAPSHOT: &str = "user/health-snapshot";
    const ND_STATS: &str = "user/nd-score-stats";
    let table = [
        ("coach_added_exclusions", VariableConfig::keyed(SNAPSHOT, &["coachAddedExclusions"], SNAPSHOT_TTL)),
        ("has_eligible_dependents_to_enroll", VariableConfig::keyed(SNAPSHOT, &["hasEligibleDependentsToEnroll"], SNAPSHOT_TTL)),
        ("primary_motivation", VariableConfig::keyed(SNAPSHOT, &["primary_motivation"], SNAPSHOT_TTL)),
        ("locale", VariableConfig::keyed(SNAPSHOT, &["preferred_locale"], SNAPSHOT_TTL)),
        ("ibs_score", VariableConfig::keyed(SNAPSHOT, &["ibsInfo"], SNAPSHOT_TTL)),
        ("dietary_restrictions", VariableConfig::keyed(SNAPSHOT, &["dietaryRestrictions"], SNAPSHOT_TTL)),
        ("allergies_and_intolerances", VariableConfig::keyed(SNAPSHOT, &["allergiesAndIntolerances"], SNAPSHOT_TTL)),
        ("ingredients_to_avoid", VariableConfig::keyed(SNAPSHOT, &["ingredientsToAvoid"], SNAPSHOT_TTL)),
        ("user_enrollment_status", VariableConfig::keyed(SNAPSHOT, &["userEnrollmentStatus"], SNAPSHOT_TTL)),
        ("eligible_kits", VariableConfig::keyed(SNAPSHOT, &["eligibleKits"], SNAPSHOT_TTL)),
        ("user_device_type", VariableConfig::keyed(SNAPSHOT, &["mobile_app_device"], SNAPSHOT_TTL)),
        ("nd_score_average", VariableConfig::keyed(ND_STATS, &["average"], SNAPSHOT_TTL)),
        ("meal_logs", VariableConfig::keyed(ND_STATS, &["scores"], SNAPSHOT_TTL).windowed()),
        ("weight_logs", VariableConfig::raw("user/weight-logs", SNAPSHOT_TTL).windowed()),
        ("gender", VariableConfig::keyed("user/profile", &["gender"], REPORT_TTL)),
        ("genetic_report_data", VariableConfig::raw("user/genetic-report", REPORT_TTL)),
        ("gut_report_data", VariableConfig::raw("user/gut-report", REPORT_TTL)),
        ("high_risk_traits", VariableConfig::raw("user/genetic-traits", REPORT_TTL)),
    ];
    table
        .into_iter()
        .map(|(name, cfg)| (name.to_string(), cfg))
        .collect()
}

impl AppConfig {
    /// Load configuration from the default path (`~/.askwise/config.toml`).
    ///
    /// Environment overrides:
    /// - `ASKWISE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `ASKWISE_API_URL`
    /// - `ASKWISE_MODEL`
    /// - `ASKWISE_DATA_URL`
    /// - `ASKWISE_VECTOR_STORE_ID`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.resolve_knowledge_base();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ASKWISE_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        if let Ok(url) = std::env::var("ASKWISE_API_URL") {
            self.api_url = url;
        }

        if let Ok(model) = std::env::var("ASKWISE_MODEL") {
            self.default_model = model;
        }

        if let Ok(url) = std::env::var("ASKWISE_DATA_URL") {
            self.data_service.base_url = url;
        }

        if let Ok(id) = std::env::var("ASKWISE_VECTOR_STORE_ID") {
            self.knowledge_base.vector_store_id = Some(id);
        }
    }

    /// Turn off `file_search` everywhere when no vector store is configured,
    /// so no capability waits on a tool the model is never offered.
    pub fn resolve_knowledge_base(&mut self) {
        let has_store = self
            .knowledge_base
            .vector_store_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if has_store {
            return;
        }

        let mut disabled = Vec::new();
        for (id, capability) in &mut self.capabilities {
            if capability.file_search {
                capability.file_search = false;
                disabled.push(id.clone());
            }
        }
        if !disabled.is_empty() {
            tracing::warn!(
                capabilities = ?disabled,
                "No knowledge_base.vector_store_id configured, file search disabled"
            );
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".askwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.knowledge_base.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge_base.max_results must be at least 1".into(),
            ));
        }

        if self.hydration.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "hydration.max_workers must be at least 1".into(),
            ));
        }

        if self.orchestrator.router_capability.trim().is_empty()
            || self.orchestrator.summarizer_capability.trim().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "orchestrator router and summarizer capabilities must be set".into(),
            ));
        }

        for (name, variable) in &self.variables {
            if variable.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "variable '{name}' has an empty endpoint"
                )));
            }
            if variable.raw && variable.key_path.is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "variable '{name}' sets both raw and key_path"
                )));
            }
        }

        for (id, capability) in &self.capabilities {
            if let Some(t) = capability.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(ConfigError::ValidationError(format!(
                    "capability '{id}' temperature must be between 0.0 and 2.0"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// TOML rendering with the API key removed.
    pub fn redacted_toml(&self) -> String {
        let mut copy = self.clone();
        copy.api_key = copy.api_key.map(|_| "[REDACTED]".to_string());
        toml::to_string_pretty(&copy).unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            orchestrator: OrchestratorConfig::default(),
            hydration: HydrationConfig::default(),
            cache: CacheConfig::default(),
            data_service: DataServiceConfig::default(),
            knowledge_base: KnowledgeBaseConfig::default(),
            capabilities: default_capabilities(),
            variables: default_variables(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hydration.max_workers, 3);
        assert_eq!(config.hydration.default_ttl_secs, 60);
        assert_eq!(config.hydration.default_window_days, 7);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.variables, config.variables);
        assert_eq!(parsed.capabilities.len(), config.capabilities.len());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.hydration.max_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn raw_with_key_path_rejected() {
        let mut config = AppConfig::default();
        config.variables.insert(
            "broken".into(),
            VariableConfig {
                endpoint: "user/x".into(),
                key_path: Some(vec!["a".into()]),
                raw: true,
                ttl_secs: None,
                time_range: false,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.orchestrator.router_capability, "ASK_DIGBI_INTENT_CLASSIFIER_AGENT");
    }

    #[test]
    fn load_from_file_overrides_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "gpt-4o"

[hydration]
max_workers = 5

[cache]
backend = "sqlite"
path = "/tmp/askwise-cache.db"

[orchestrator]
terminal_capabilities = ["nora_recipe_agent", "support_agent"]

[variables.sleep_score]
endpoint = "user/sleep"
key_path = ["summary", "score"]
ttl_secs = 30
time_range = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.hydration.max_workers, 5);
        assert_eq!(config.hydration.default_ttl_secs, 60);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.orchestrator.terminal_capabilities.len(), 2);

        // A user-supplied table replaces the built-in one.
        assert_eq!(config.variables.len(), 1);
        let sleep = &config.variables["sleep_score"];
        assert!(sleep.time_range);
        assert_eq!(sleep.key_path.as_deref(), Some(&["summary".to_string(), "score".to_string()][..]));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hydration = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn shared_endpoints_in_defaults() {
        let config = AppConfig::default();
        assert_eq!(
            config.variables["nd_score_average"].endpoint,
            config.variables["meal_logs"].endpoint
        );
        assert!(config.variables["meal_logs"].time_range);
        assert!(!config.variables["nd_score_average"].time_range);
    }

    #[test]
    fn knowledge_base_capabilities_search_only_with_a_store() {
        let mut config = AppConfig::default();
        assert!(config.capabilities["ASK_DIGBI_NUTRITION_AGENT"].file_search);
        assert!(config.capabilities["ASK_DIGBI_SUPPORT_AGENT"].file_search);
        assert!(!config.capabilities["NORA_RECIPE_AGENT"].file_search);

        config.knowledge_base.vector_store_id = Some("vs_kb".into());
        config.resolve_knowledge_base();
        assert!(config.capabilities["ASK_DIGBI_NUTRITION_AGENT"].file_search);

        config.knowledge_base.vector_store_id = None;
        config.resolve_knowledge_base();
        assert!(config.capabilities.values().all(|c| !c.file_search));
    }

    #[test]
    fn knowledge_base_section_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[knowledge_base]
vector_store_id = "vs_123"

[capabilities.FAQ_AGENT]
instructions = "Answer from the FAQ."
file_search = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.knowledge_base.vector_store_id.as_deref(), Some("vs_123"));
        assert_eq!(config.knowledge_base.max_results, 5);
        assert!(config.capabilities["FAQ_AGENT"].file_search);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!config.redacted_toml().contains("sk-secret"));
    }
}
