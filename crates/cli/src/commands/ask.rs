//! `askwise ask`: Answer one query through the full pipeline.

use super::pipeline::{self, CliResult};
use askwise_config::AppConfig;
use askwise_core::context::RequestContext;
use askwise_orchestrator::Orchestrator;

pub async fn run(
    query: String,
    user_token: Option<String>,
    user_type: Option<String>,
    language: Option<String>,
) -> CliResult<()> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early: give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    ASKWISE_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY  = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = pipeline::runtime(&config).await?;
    let orchestrator = Orchestrator::with_default_handlers(runtime, &config.orchestrator);

    let response = orchestrator
        .respond(request_context(query, user_token, user_type, language))
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn request_context(
    query: String,
    user_token: Option<String>,
    user_type: Option<String>,
    language: Option<String>,
) -> RequestContext {
    let mut ctx = RequestContext::new(query);
    if let Some(token) = user_token {
        ctx = ctx.with_user_token(token);
    }
    if let Some(user_type) = user_type {
        ctx = ctx.with_user_type(user_type);
    }
    if let Some(language) = language {
        ctx = ctx.with_language(language);
    }
    ctx
}
