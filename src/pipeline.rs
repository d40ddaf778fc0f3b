//! Orchestrates the six stages for one job: validate, extract, detect,
//! resolve, redact, sign, audit. Each blocking stage runs inside
//! `tokio::task::spawn_blocking` so a per-job timeout can preempt it and
//! concurrent jobs don't starve each other's worker threads. Stage
//! transitions log at `info`; gate failures log at `warn`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::audit::AuditStore;
use crate::config::PipelineConfig;
use crate::detector::{Detector, NerTagger};
use crate::error::PipelineError;
use crate::extractor::TextExtractor;
use crate::models::ProcessResult;
use crate::redactor::Redactor;
use crate::resolver::Resolver;
use crate::signer::Signer;
use crate::validator::Validator;

pub struct Pipeline {
    config: PipelineConfig,
    validator: Arc<Validator>,
    extractor: Arc<TextExtractor>,
    detector: Detector,
    resolver: Resolver,
    redactor: Arc<Redactor>,
    signer: Arc<Signer>,
    audit: Arc<AuditStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, ner: Option<Arc<dyn NerTagger>>) -> crate::error::Result<Self> {
        config.ensure_directories()?;
        let ner = if config.ner_enabled { ner } else { None };
        Ok(Self {
            validator: Arc::new(Validator::new(config.max_size_bytes())),
            extractor: Arc::new(TextExtractor::new()),
            detector: Detector::new(ner),
            resolver: Resolver::new(),
            redactor: Arc::new(Redactor::new()),
            signer: Arc::new(Signer::load_or_generate(&config.keys_dir)?),
            audit: Arc::new(AuditStore::open(&config.audit_db_path)?),
            config,
        })
    }

    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Runs the full pipeline for one job. Always returns `Ok`; failures
    /// are captured as a `FAILED` `ProcessResult` rather than propagated,
    /// since the orchestrator's contract is "exactly one terminal
    /// outcome, always audited."
    pub async fn run(&self, job_id: &str, path: &Path, original_filename: &str) -> ProcessResult {
        let start = Instant::now();
        tracing::info!(job_id, original_filename, "pipeline start");

        let timeout = std::time::Duration::from_secs(self.config.processing_timeout_seconds);
        let outcome = tokio::time::timeout(
            timeout,
            self.run_stages(job_id, path, original_filename, start),
        )
        .await;

        let mut result = match outcome {
            Ok(result) => result,
            Err(_) => ProcessResult::failed(
                job_id,
                original_filename,
                PipelineError::Timeout(start.elapsed().as_secs_f64()).to_string(),
                start.elapsed().as_secs_f64(),
            ),
        };

        let audit = Arc::clone(&self.audit);
        let audit_record = result.clone();
        let audit_outcome = match tokio::task::spawn_blocking(move || audit.log(&audit_record)).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(PipelineError::AuditWrite(format!("audit task panicked: {join_err}"))),
        };
        if let Err(e) = audit_outcome {
            tracing::error!(job_id, error = %e, "audit write failed");
            result.status = crate::models::JobStatus::Failed;
            result.error = Some(PipelineError::AuditWrite(e.to_string()).to_string());
        } else {
            tracing::info!(job_id, "pipeline AUDIT ✓");
        }
        tracing::info!(
            job_id,
            entities = result.entity_count,
            duration_s = result.duration_s,
            "pipeline end"
        );
        result
    }

    async fn run_stages(
        &self,
        job_id: &str,
        path: &Path,
        original_filename: &str,
        start: Instant,
    ) -> ProcessResult {
        let validator = Arc::clone(&self.validator);
        let validate_path = path.to_path_buf();
        let validation = match tokio::task::spawn_blocking(move || validator.validate(&validate_path)).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(PipelineError::Io(std::io::Error::other(format!(
                "validate task panicked: {join_err}"
            )))),
        };
        if let Err(e) = validation {
            tracing::warn!(job_id, error = %e, "pipeline VALIDATE failed");
            if let Err(move_err) = self.validator.reject(path, job_id, &self.config.error_dir) {
                tracing::error!(job_id, error = %move_err, "could not quarantine rejected input");
            }
            return ProcessResult::failed(job_id, original_filename, e.to_string(), start.elapsed().as_secs_f64());
        }
        tracing::info!(job_id, "pipeline VALIDATE ✓");

        let extractor = Arc::clone(&self.extractor);
        let extract_path = path.to_path_buf();
        let extraction = match tokio::task::spawn_blocking(move || extractor.extract(&extract_path)).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(PipelineError::Io(std::io::Error::other(format!(
                "extract task panicked: {join_err}"
            )))),
        };
        let pages = match extraction {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!(job_id, error = %e, "pipeline EXTRACT failed");
                return ProcessResult::failed(job_id, original_filename, e.to_string(), start.elapsed().as_secs_f64());
            }
        };
        tracing::info!(job_id, pages = pages.len(), "pipeline EXTRACT ✓");

        let mut entities = Vec::new();
        for page in &pages {
            entities.extend(self.detector.detect(&page.text, page.page_number));
        }
        tracing::info!(job_id, entities = entities.len(), "pipeline DETECT ✓");

        let page_map: HashMap<usize, _> = pages.into_iter().map(|p| (p.page_number, p)).collect();
        self.resolver.resolve(&mut entities, &page_map);
        tracing::info!(job_id, "pipeline RESOLVE ✓");

        let redacted_path = self.redacted_path(job_id);
        let redactor = Arc::clone(&self.redactor);
        let redact_input = path.to_path_buf();
        let redact_output = redacted_path.clone();
        let redact_entities = entities.clone();
        let redaction = match tokio::task::spawn_blocking(move || {
            redactor.redact(&redact_input, &redact_entities, &redact_output)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(join_err) => Err(PipelineError::Io(std::io::Error::other(format!(
                "redact task panicked: {join_err}"
            )))),
        };
        if let Err(e) = redaction {
            tracing::error!(job_id, error = %e, "pipeline REDACT failed");
            return ProcessResult::failed(job_id, original_filename, e.to_string(), start.elapsed().as_secs_f64());
        }
        tracing::info!(job_id, "pipeline REDACT ✓");

        let signed_path = self.signed_path(job_id);
        let signer = Arc::clone(&self.signer);
        let sign_input = redacted_path.clone();
        let sign_output = signed_path.clone();
        let signing = match tokio::task::spawn_blocking(move || signer.sign(&sign_input, &sign_output)).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(PipelineError::Io(std::io::Error::other(format!(
                "sign task panicked: {join_err}"
            )))),
        };
        if let Err(e) = signing {
            tracing::error!(job_id, error = %e, "pipeline SIGN failed");
            let _ = std::fs::remove_file(&redacted_path);
            return ProcessResult::failed(job_id, original_filename, e.to_string(), start.elapsed().as_secs_f64());
        }
        tracing::info!(job_id, "pipeline SIGN ✓");

        ProcessResult::completed(
            job_id,
            original_filename,
            entities,
            signed_path.to_string_lossy().into_owned(),
            start.elapsed().as_secs_f64(),
        )
    }

    /// Re-reads a signed file's embedded metadata and checks it against
    /// the resident key.
    pub fn verify(&self, signed_path: &Path) -> crate::error::Result<bool> {
        self.signer.verify(signed_path)
    }

    pub fn stats(&self) -> crate::error::Result<crate::audit::AuditStats> {
        self.audit.get_stats()
    }

    fn redacted_path(&self, job_id: &str) -> PathBuf {
        self.config.processed_dir.join(format!("{job_id}_redacted.pdf"))
    }

    fn signed_path(&self, job_id: &str) -> PathBuf {
        self.config.signed_dir.join(format!("{job_id}_signed.pdf"))
    }
}
