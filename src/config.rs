//! Process configuration: the five directory roles, size limit, NER
//! toggle, and per-job timeout.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables (via `dotenvy`, loaded once at startup in `main.rs`). Kept
//! deliberately plain: this pipeline's config surface is a handful of
//! paths and scalars, not a multi-source precedence problem.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_max_size_mb() -> u64 {
    50
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_ner_enabled() -> bool {
    true
}

/// Directory roles and limits the pipeline reads at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Files moved here by the ingestion trigger before processing starts.
    pub processing_dir: PathBuf,
    /// Redacted-but-unsigned artifacts land here.
    pub processed_dir: PathBuf,
    /// Final signed artifacts land here.
    pub signed_dir: PathBuf,
    /// Quarantined inputs that failed validation land here.
    pub error_dir: PathBuf,
    /// Holds `signing_key.pem`.
    pub keys_dir: PathBuf,
    /// SQLite audit database path.
    pub audit_db_path: PathBuf,

    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_ner_enabled")]
    pub ner_enabled: bool,
    #[serde(default = "default_timeout_seconds")]
    pub processing_timeout_seconds: u64,
}

impl PipelineConfig {
    /// Load from a TOML file, then apply `SECURE_DOC_AI_*` environment
    /// overrides for the fields most often tuned per-deployment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SECURE_DOC_AI_MAX_SIZE_MB") {
            if let Ok(v) = v.parse() {
                self.max_size_mb = v;
            }
        }
        if let Ok(v) = std::env::var("SECURE_DOC_AI_NER_ENABLED") {
            if let Ok(v) = v.parse() {
                self.ner_enabled = v;
            }
        }
        if let Ok(v) = std::env::var("SECURE_DOC_AI_TIMEOUT_SECONDS") {
            if let Ok(v) = v.parse() {
                self.processing_timeout_seconds = v;
            }
        }
    }

    /// Ensure the directories this pipeline owns exist. Each directory
    /// is owned by exactly one stage of the pipeline.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.processing_dir,
            &self.processed_dir,
            &self.signed_dir,
            &self.error_dir,
            &self.keys_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.audit_db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_toml() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("config.toml");
        std::fs::write(
            &toml_path,
            format!(
                r#"
                processing_dir = "{d}/processing"
                processed_dir = "{d}/processed"
                signed_dir = "{d}/signed"
                error_dir = "{d}/error"
                keys_dir = "{d}/keys"
                audit_db_path = "{d}/audit.db"
                "#,
                d = dir.path().display()
            ),
        )
        .unwrap();

        let config = PipelineConfig::load(&toml_path).unwrap();
        assert_eq!(config.max_size_mb, 50);
        assert!(config.ner_enabled);
        assert_eq!(config.processing_timeout_seconds, 120);
    }
}
