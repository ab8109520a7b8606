//! Submission entry point: validate, then preview or build in the background

use crate::orchestrator::{Orchestrator, RunReport};
use crate::store::ProgressStore;
use blueprint_template::{ValidationErrors, ValidationReport, Validator};
use blueprint_types::{ProgressRecord, StoreError, TxId};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// What became of a submitted template.
#[derive(Debug)]
pub enum Submission {
    /// The template was rejected; nothing was provisioned.
    Invalid { errors: ValidationErrors },

    /// Validation only. Carries the rendered preview.
    Preview {
        report: Box<ValidationReport>,
        estimated_timeout: Duration,
    },

    /// The build was accepted and runs in the background.
    Accepted {
        tx_id: TxId,
        poll_url: String,
        estimated_timeout: Duration,
        handle: JoinHandle<RunReport>,
    },
}

impl Submission {
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            Submission::Invalid { .. } => None,
            Submission::Preview { report, .. } => Some(report.tx_id),
            Submission::Accepted { tx_id, .. } => Some(*tx_id),
        }
    }
}

/// Validates submissions and hands accepted ones to the orchestrator.
pub struct TemplateService {
    validator: Validator,
    orchestrator: Arc<Orchestrator>,
    progress: Arc<dyn ProgressStore>,
}

impl TemplateService {
    /// `progress` must be the store the orchestrator reports to.
    pub fn new(
        validator: Validator,
        orchestrator: Arc<Orchestrator>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            validator,
            orchestrator,
            progress,
        }
    }

    /// Validate `input` and, unless only validation was asked for, start
    /// building it.
    ///
    /// Validation failures are part of the returned [`Submission`]; only a
    /// progress store failure is an error.
    #[instrument(skip_all)]
    pub async fn submit(&self, input: Value, only_validate: bool) -> Result<Submission, StoreError> {
        let report = match self.validator.validate(&input).await {
            Ok(report) => report,
            Err(errors) => {
                info!(errors = errors.len(), "Template rejected");
                return Ok(Submission::Invalid { errors });
            }
        };

        let estimated_timeout = self
            .orchestrator
            .config()
            .estimated_timeout(report.wait_budget(), report.component_ids.len());

        if only_validate || report.template.only_validate {
            info!(tx_id = %report.tx_id, "Template validated");
            return Ok(Submission::Preview {
                report: Box::new(report),
                estimated_timeout,
            });
        }

        let tx_id = report.tx_id;
        let estimated_ms = u64::try_from(estimated_timeout.as_millis()).unwrap_or(u64::MAX);
        let poll_url = self
            .progress
            .create(ProgressRecord::new(
                tx_id,
                input.clone(),
                report.total_steps,
                estimated_ms,
            ))
            .await?;

        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move { orchestrator.run(report, input).await });
        info!(tx_id = %tx_id, poll_url = %poll_url, "Build accepted");

        Ok(Submission::Accepted {
            tx_id,
            poll_url,
            estimated_timeout,
            handle,
        })
    }

    /// Current progress of a run.
    pub async fn progress(&self, tx_id: &TxId) -> Result<Option<ProgressRecord>, StoreError> {
        self.progress.get(tx_id).await
    }
}
