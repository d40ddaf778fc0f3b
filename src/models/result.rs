//! The pipeline's per-job outcome record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DetectedEntity;

/// Lifecycle state of a job. Only `Completed` and `Failed` are terminal
/// and persisted to the audit store; the others are stamped by the
/// orchestrator as it moves through stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Validating,
    Extracting,
    Detecting,
    Redacting,
    Signing,
    Auditing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Detecting => "detecting",
            Self::Redacting => "redacting",
            Self::Signing => "signing",
            Self::Auditing => "auditing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The pipeline's output record for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default)]
    pub entity_count: usize,
    #[serde(default)]
    pub entities: Vec<DetectedEntity>,
    pub output_path: Option<String>,
    pub error: Option<String>,
    pub duration_s: f64,
    pub created_at: DateTime<Utc>,
}

impl ProcessResult {
    pub fn failed(job_id: impl Into<String>, filename: impl Into<String>, error: impl Into<String>, duration_s: f64) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Failed,
            entity_count: 0,
            entities: Vec::new(),
            output_path: None,
            error: Some(error.into()),
            duration_s,
            created_at: Utc::now(),
        }
    }

    pub fn completed(
        job_id: impl Into<String>,
        filename: impl Into<String>,
        entities: Vec<DetectedEntity>,
        output_path: impl Into<String>,
        duration_s: f64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Completed,
            entity_count: entities.len(),
            entities,
            output_path: Some(output_path.into()),
            error: None,
            duration_s,
            created_at: Utc::now(),
        }
    }
}
