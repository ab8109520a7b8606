//! Error types for the orchestrator

use blueprint_template::BuildError;
use blueprint_types::StoreError;
use thiserror::Error;

/// Classifies failures a retry loop may try again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Failure reported by the deployment API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deployer error{}: {message}", status_suffix(.status))]
pub struct DeployerError {
    /// HTTP status, `None` for transport failures and timeouts.
    pub status: Option<u16>,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl DeployerError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl Retryable for DeployerError {
    /// 400..409 are the caller's fault and terminal; conflicts, server
    /// errors and transport failures may succeed on another attempt.
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => !(400..409).contains(&status),
            None => true,
        }
    }
}

/// Failure of a single health probe request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),
}

/// Outcome of a health wait that never saw a healthy answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("{url} did not answer within the probe timeout")]
    TimedOut { url: String },

    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{url} answered with status {status} but is not healthy")]
    Unhealthy { url: String, status: u16 },
}

impl HealthError {
    pub(crate) fn from_probe(url: &str, error: ProbeError) -> Self {
        match error {
            ProbeError::Timeout => HealthError::TimedOut {
                url: url.to_string(),
            },
            ProbeError::Connect(reason) => HealthError::Unreachable {
                url: url.to_string(),
                reason,
            },
        }
    }
}

impl Retryable for HealthError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Failure to provision one component.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Deployer(#[from] DeployerError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error("deployer response for {ref_id} has no string id")]
    MissingId { ref_id: String },

    #[error("{ref_id} has no {field}")]
    MissingField { ref_id: String, field: &'static str },

    #[error("could not read the CA certificate from {url}: {reason}")]
    CaInfo { url: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("orchestrator is missing its {0}")]
    MissingCollaborator(&'static str),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
