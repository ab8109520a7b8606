//! CLI configuration
//!
//! Layered like the daemon configs elsewhere in the stack: built-in
//! defaults, then an optional file, then `BLUEPRINT_` environment variables.
//! Nested keys use a double underscore, e.g.
//! `BLUEPRINT_ENGINE__DEPLOYER__MAX_ATTEMPTS=3`.

use blueprint_orchestrator::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration of the `blueprint` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the deployment API
    #[serde(default = "default_deployer_url")]
    pub deployer_url: String,

    /// JSON file holding records of components that already exist
    #[serde(default = "default_components_file")]
    pub components_file: PathBuf,

    /// Prefix of the poll URLs handed out for accepted builds
    #[serde(default = "default_progress_url")]
    pub progress_url: String,

    /// Provisioning engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            deployer_url: default_deployer_url(),
            components_file: default_components_file(),
            progress_url: default_progress_url(),
            engine: EngineConfig::default(),
        }
    }
}

// Default value helpers
fn default_deployer_url() -> String {
    "http://127.0.0.1:8080/api/v1".to_string()
}

fn default_components_file() -> PathBuf {
    PathBuf::from("components.json")
}

fn default_progress_url() -> String {
    "memory://progress".to_string()
}

impl CliConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&CliConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with BLUEPRINT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("BLUEPRINT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
