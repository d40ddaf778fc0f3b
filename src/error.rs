//! Crate-wide error taxonomy.
//!
//! Each stage raises its own variant; the orchestrator is the only code
//! that decides which errors are user-caused (validation) versus
//! internal (everything else gets a generic message at the API boundary
//! while the full detail stays in the logs).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input failed a validator gate. User-caused; reported verbatim.
    #[error("validation rejected: {0}")]
    ValidationReject(String),

    /// PDF is structurally broken past the validator gates, or OCR
    /// produced nothing and the page has no native text.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A NER chunk failed inference; the chunk is skipped and detection
    /// continues with the other chunks. Carried for logging, never
    /// aborts a job.
    #[error("NER chunk failed: {0}")]
    DetectionWarning(String),

    /// Key material is corrupt or the PDF could not be written.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The audit store could not be reached; pipeline artifacts remain
    /// on disk but the run is reported as failed.
    #[error("audit write failed: {0}")]
    AuditWrite(String),

    /// A stage exceeded its share of `processing_timeout_seconds`.
    #[error("job timed out after {0:.1}s")]
    Timeout(f64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
