//! askwise CLI: the main entry point.
//!
//! Commands:
//! - `ask`: Answer one query through the full orchestration pipeline
//! - `vars`: Hydrate user-data variables for a user token
//! - `config`: Validate, show, or locate the configuration

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "askwise",
    about = "askwise: multi-capability request orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query and print the final response as JSON
    Ask {
        /// The end-user query
        query: String,

        /// Token identifying the end user (enables variable hydration)
        #[arg(long, env = "ASKWISE_USER_TOKEN")]
        user_token: Option<String>,

        /// User type, e.g. "alpha"
        #[arg(long)]
        user_type: Option<String>,

        /// Preferred response language
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Resolve user-data variables and print them as JSON
    Vars {
        /// Token identifying the end user
        user_token: String,

        /// Variable names to resolve
        #[arg(required = true)]
        names: Vec<String>,

        /// First day of the window for time-range variables (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day of the window for time-range variables (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Bypass the cache for reads and writes
        #[arg(long)]
        no_cache: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration for problems
    Validate,
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only command output
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Ask {
            query,
            user_token,
            user_type,
            language,
        } => commands::ask::run(query, user_token, user_type, language).await?,
        Commands::Vars {
            user_token,
            names,
            from,
            to,
            no_cache,
        } => commands::vars::run(&user_token, &names, from, to, !no_cache).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
