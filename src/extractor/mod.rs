//! Produces per-page text plus geometric text blocks from a PDF or a
//! standalone raster image, triggering OCR when native PDF text is too
//! sparse to be real.

pub(crate) mod layout;
mod ocr;

use std::path::Path;

use lopdf::content::Content;

use crate::error::{PipelineError, Result};
use crate::models::PageContent;

const OCR_TRIGGER_MIN_CHARS: usize = 20;

pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, path: &Path) -> Result<Vec<PageContent>> {
        let kind = infer::get_from_path(path)
            .map_err(PipelineError::Io)?
            .ok_or_else(|| PipelineError::Extraction("unrecognized file content".into()))?;

        match kind.mime_type() {
            "application/pdf" => self.extract_pdf(path),
            "image/jpeg" | "image/png" | "image/tiff" => {
                Ok(vec![ocr::ocr_image(path)?])
            }
            other => Err(PipelineError::Extraction(format!(
                "unsupported content type for extraction: {other}"
            ))),
        }
    }

    fn extract_pdf(&self, path: &Path) -> Result<Vec<PageContent>> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| PipelineError::Extraction(format!("could not open PDF: {e}")))?;

        let mut pages = Vec::new();
        for (index, (page_num_1indexed, page_id)) in doc.get_pages().into_iter().enumerate() {
            let native = self.extract_native_page(&doc, page_id, index)?;
            let non_whitespace = native.text.chars().filter(|c| !c.is_whitespace()).count();

            let page = if non_whitespace < OCR_TRIGGER_MIN_CHARS {
                match ocr::ocr_pdf_page(path, page_num_1indexed, index) {
                    Ok(ocr_page) => ocr_page,
                    Err(_) => {
                        // OCR unavailable on a page that needs it: degrade to
                        // empty text rather than abort the job.
                        tracing::warn!(page = index, "OCR unavailable, page degrades to empty text");
                        native
                    }
                }
            } else {
                native
            };
            pages.push(page);
        }
        Ok(pages)
    }

    fn extract_native_page(
        &self,
        doc: &lopdf::Document,
        page_id: (u32, u16),
        index: usize,
    ) -> Result<PageContent> {
        let bytes = doc
            .get_page_content(page_id)
            .map_err(|e| PipelineError::Extraction(format!("could not read page content: {e}")))?;
        let content = Content::decode(&bytes)
            .map_err(|e| PipelineError::Extraction(format!("could not decode content stream: {e}")))?;
        Ok(layout::LayoutWalker::new(index).run(&content.operations))
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}
