//! Blueprint CLI - Validate and provision network templates
//!
//! - `blueprint validate <template>` prints the payload preview and resource
//!   summary, or every validation error
//! - `blueprint apply <template>` provisions the template and prints the
//!   final progress record

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::CliConfig;

/// Blueprint CLI
#[derive(Parser)]
#[command(name = "blueprint")]
#[command(about = "Validate and provision blockchain network templates", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BLUEPRINT_CONFIG")]
    config: Option<String>,

    /// Deployment API base URL
    #[arg(long, env = "BLUEPRINT_DEPLOYER_URL")]
    deployer_url: Option<String>,

    /// Log level
    #[arg(long, env = "BLUEPRINT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "BLUEPRINT_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a template and print its preview
    Validate {
        /// Template file (JSON)
        template: PathBuf,
    },

    /// Provision a template
    Apply {
        /// Template file (JSON)
        template: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays machine readable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let mut config = CliConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(url) = cli.deployer_url {
        config.deployer_url = url;
    }

    match cli.command {
        Command::Validate { template } => commands::validate(&config, &template).await,
        Command::Apply { template } => commands::apply(&config, &template).await,
    }
}
