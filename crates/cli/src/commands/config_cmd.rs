//! `askwise config`: Configuration management commands.

use super::pipeline::CliResult;
use askwise_config::{AppConfig, CacheBackend};

pub async fn validate() -> CliResult<()> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:         {}", config.default_model);
            println!("   Router:        {}", config.orchestrator.router_capability);
            println!("   Summarizer:    {}", config.orchestrator.summarizer_capability);
            println!("   Capabilities:  {}", config.capabilities.len());
            println!("   Variables:     {}", config.variables.len());
            println!("   Cache:         {:?}", config.cache.backend);
            println!("   Data service:  {}", config.data_service.base_url);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Problems that do not stop the config from loading.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() {
        warnings.push("No API key set (set ASKWISE_API_KEY or OPENAI_API_KEY env var)".to_string());
    }

    for id in [
        &config.orchestrator.router_capability,
        &config.orchestrator.summarizer_capability,
    ] {
        if !config.capabilities.contains_key(id) {
            warnings.push(format!("Capability '{id}' has no [capabilities] entry"));
        }
    }

    if config.cache.backend == CacheBackend::None {
        warnings.push("Cache disabled; every variable is fetched on every request".to_string());
    }

    warnings
}

pub async fn show() -> CliResult<()> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.redacted_toml());
    Ok(())
}

pub async fn path() -> CliResult<()> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
