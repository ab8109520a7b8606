//! Subcommand implementations

use crate::config::CliConfig;
use anyhow::{bail, Context, Result};
use blueprint_client::{FileComponentStore, HttpDeployer, HttpHealthProbe};
use blueprint_orchestrator::{
    InMemoryCredentialStore, InMemoryProgressStore, Orchestrator, Submission, TemplateService,
};
use blueprint_template::{ValidationErrors, ValidationReport, Validator};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn read_template(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn validator(config: &CliConfig) -> Validator {
    Validator::new(Arc::new(FileComponentStore::new(config.components_file.clone())))
}

fn report_errors(errors: &ValidationErrors) -> anyhow::Error {
    for message in errors.messages() {
        eprintln!("error: {}", message);
    }
    anyhow::anyhow!("template has {} error(s)", errors.len())
}

fn print_preview(report: &ValidationReport, estimated_timeout: Duration) -> Result<()> {
    let mut preview = report.preview_json();
    preview["estimated_timeout_ms"] = json!(estimated_timeout.as_millis() as u64);
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

/// Validate a template and print its preview.
pub async fn validate(config: &CliConfig, path: &Path) -> Result<()> {
    let input = read_template(path).await?;
    let report = validator(config)
        .validate(&input)
        .await
        .map_err(|errors| report_errors(&errors))?;

    let estimated_timeout = config
        .engine
        .estimated_timeout(report.wait_budget(), report.component_ids.len());
    print_preview(&report, estimated_timeout)
}

/// Build a template against the configured deployer and print the final
/// progress record.
pub async fn apply(config: &CliConfig, path: &Path) -> Result<()> {
    let input = read_template(path).await?;

    let deployer = HttpDeployer::new(&config.deployer_url, config.engine.deployer.timeout())
        .context("creating deployer client")?;
    let progress = Arc::new(InMemoryProgressStore::new(config.progress_url.clone()));
    let orchestrator = Orchestrator::builder()
        .with_deployer(Arc::new(deployer))
        .with_health_probe(Arc::new(HttpHealthProbe::default()))
        .with_progress_store(progress.clone())
        .with_credential_store(Arc::new(InMemoryCredentialStore::new()))
        .with_config(config.engine.clone())
        .build()?;
    let service = TemplateService::new(validator(config), Arc::new(orchestrator), progress);

    match service.submit(input, false).await? {
        Submission::Invalid { errors } => Err(report_errors(&errors)),
        Submission::Preview {
            report,
            estimated_timeout,
        } => print_preview(&report, estimated_timeout),
        Submission::Accepted {
            tx_id,
            poll_url,
            estimated_timeout,
            handle,
        } => {
            info!(
                tx_id = %tx_id,
                poll_url = %poll_url,
                estimated_timeout_secs = estimated_timeout.as_secs(),
                "Build started"
            );
            let report = handle.await.context("build task panicked")?;
            if let Some(record) = service.progress(&tx_id).await? {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            if !report.is_success() {
                bail!(
                    "build {} failed: {}",
                    tx_id,
                    report.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            Ok(())
        }
    }
}
