//! A single PII entity detected in a document's extracted text.

use serde::{Deserialize, Serialize};

/// Which matcher family produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitySource {
    Regex,
    Ner,
    Ocr,
}

impl EntitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Ner => "ner",
            Self::Ocr => "ocr",
        }
    }
}

/// A PII entity detected at a half-open character range `[start, end)`
/// within one page's extracted text.
///
/// Immutable after construction except for `bbox`, which the resolver
/// fills in exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub entity_type: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub page: usize,
    pub source: EntitySource,
    /// `[x0, y0, x1, y1]` in PDF user-space points. Absent until the
    /// resolver (or the OCR extractor, which supplies it directly) sets it.
    pub bbox: Option<[f64; 4]>,
}

impl DetectedEntity {
    pub fn new(
        entity_type: impl Into<String>,
        text: impl Into<String>,
        start: usize,
        end: usize,
        confidence: f32,
        page: usize,
        source: EntitySource,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            start,
            end,
            confidence,
            page,
            source,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }
}
