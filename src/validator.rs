//! Structural input gates: extension, sniffed MIME, size, encryption,
//! page count. Cheap checks first so hostile or malformed input never
//! reaches the PDF parser.

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "tiff", "tif"];
const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/tiff",
];
const MAX_PAGES: usize = 50;

pub struct Validator {
    max_size_bytes: u64,
}

impl Validator {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    /// Runs all five gates in order; the first failure aborts.
    pub fn validate(&self, path: &Path) -> Result<()> {
        self.check_extension(path)?;
        self.check_mime(path)?;
        self.check_size(path)?;
        if self.is_pdf_extension(path) {
            self.check_pdf(path)?;
        }
        Ok(())
    }

    /// Moves a rejected input into `error_dir`, UUID-prefixed to avoid
    /// collisions with concurrent jobs.
    pub fn reject(&self, path: &Path, job_id: &str, error_dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(error_dir)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let dest = error_dir.join(format!("{job_id}_{name}"));
        std::fs::rename(path, &dest)?;
        Ok(dest)
    }

    fn is_pdf_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
    }

    fn check_extension(&self, path: &Path) -> Result<()> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(PipelineError::ValidationReject(
                "unsupported file extension".into(),
            )),
        }
    }

    fn check_mime(&self, path: &Path) -> Result<()> {
        let kind = infer::get_from_path(path)
            .map_err(PipelineError::Io)?
            .ok_or_else(|| PipelineError::ValidationReject("unrecognized file content".into()))?;
        if ALLOWED_MIME_TYPES.contains(&kind.mime_type()) {
            Ok(())
        } else {
            Err(PipelineError::ValidationReject(format!(
                "content does not match an allowed type: sniffed {}",
                kind.mime_type()
            )))
        }
    }

    fn check_size(&self, path: &Path) -> Result<()> {
        let size = std::fs::metadata(path)?.len();
        if size <= self.max_size_bytes {
            Ok(())
        } else {
            Err(PipelineError::ValidationReject(format!(
                "file size {size} bytes exceeds limit of {} bytes",
                self.max_size_bytes
            )))
        }
    }

    fn check_pdf(&self, path: &Path) -> Result<()> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| PipelineError::ValidationReject(format!("could not open PDF: {e}")))?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(PipelineError::ValidationReject(
                "encrypted PDFs are not supported".into(),
            ));
        }
        let page_count = doc.get_pages().len();
        if page_count > MAX_PAGES {
            return Err(PipelineError::ValidationReject(format!(
                "page count {page_count} exceeds limit of {MAX_PAGES}"
            )));
        }
        Ok(())
    }
}
