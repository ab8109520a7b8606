//! Progress (webhook) and debug records of a build run

use crate::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run status as seen by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Success,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Error)
    }
}

/// Externally persisted progress of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub tx_id: TxId,
    pub status: RunStatus,
    pub step: u32,
    pub total_steps: u32,
    /// Last human readable message.
    pub message: String,
    /// Current lookup table snapshot.
    pub resolved_template: Value,
    /// Template as submitted, kept for audit and replay.
    pub input_template: Value,
    pub estimated_timeout_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(tx_id: TxId, input_template: Value, total_steps: u32, estimated_timeout_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            tx_id,
            status: RunStatus::Pending,
            step: 0,
            total_steps,
            message: "build queued".to_string(),
            resolved_template: Value::Null,
            input_template,
            estimated_timeout_ms,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update.
    pub fn apply(&mut self, update: ProgressUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(step) = update.step {
            self.step = step;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(resolved) = update.resolved_template {
            self.resolved_template = resolved;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a [`ProgressRecord`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: Option<RunStatus>,
    pub step: Option<u32>,
    pub message: Option<String>,
    pub resolved_template: Option<Value>,
}

impl ProgressUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: Value) -> Self {
        self.resolved_template = Some(snapshot);
        self
    }
}

/// Record persisted at the end of a run for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugRecord {
    pub tx_id: TxId,
    pub outcome: RunStatus,
    pub input_template: Value,
    /// Lookup table as it stood when the run ended.
    pub lookup: Value,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_update_leaves_other_fields() {
        let mut record = ProgressRecord::new(TxId::generate(), json!({"a": 1}), 3, 1000);
        record.apply(ProgressUpdate::status(RunStatus::InProgress).with_step(1));
        assert_eq!(record.status, RunStatus::InProgress);
        assert_eq!(record.step, 1);
        assert_eq!(record.message, "build queued");

        record.apply(ProgressUpdate::default().with_message("added a new peer: p1"));
        assert_eq!(record.status, RunStatus::InProgress);
        assert_eq!(record.message, "added a new peer: p1");
        assert!(!record.status.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(RunStatus::InProgress).unwrap(),
            json!("in_progress")
        );
    }
}
