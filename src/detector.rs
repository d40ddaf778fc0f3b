//! PII detection: a closed regex vocabulary plus an optional injected
//! named-entity tagger, merged and deduplicated into one ordered stream.
//!
//! Patterns are compiled once into `LazyLock` statics rather than
//! re-compiled per call.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::PipelineError;
use crate::models::{DetectedEntity, EntitySource};

const NER_CHUNK_SIZE: usize = 450;
const NER_MIN_CONFIDENCE: f32 = 0.90;
const NER_MIN_LEN: usize = 3;

struct Pattern {
    tag: &'static str,
    regex: &'static LazyLock<Regex>,
}

static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static PHONE_US_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap()
});

static PHONE_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\+91[\s-]?)?[6-9]\d{4}[\s-]?\d{5}\b").unwrap());

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static AADHAAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\s\d{4}\s\d{4}\b").unwrap());

static PAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]{5}\d{4}[A-Z]\b").unwrap());

static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap());

static DATE_OF_BIRTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:0?[1-9]|[12]\d|3[01])[/.\-](?:0?[1-9]|1[0-2])[/.\-](?:19|20)\d{2}\b").unwrap()
});

static IP_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
    )
    .unwrap()
});

static URL_LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:https?://)?(?:www\.)?linkedin\.com/in/[\w-]+\b").unwrap()
});

static URL_GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:https?://)?(?:www\.)?github\.com/[\w-]+\b").unwrap()
});

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern { tag: "SSN", regex: &SSN_RE },
        Pattern { tag: "PHONE_US", regex: &PHONE_US_RE },
        Pattern { tag: "PHONE_IN", regex: &PHONE_IN_RE },
        Pattern { tag: "EMAIL", regex: &EMAIL_RE },
        Pattern { tag: "AADHAAR", regex: &AADHAAR_RE },
        Pattern { tag: "PAN", regex: &PAN_RE },
        Pattern { tag: "CREDIT_CARD", regex: &CREDIT_CARD_RE },
        Pattern { tag: "DATE_OF_BIRTH", regex: &DATE_OF_BIRTH_RE },
        Pattern { tag: "IP_ADDRESS", regex: &IP_ADDRESS_RE },
        Pattern { tag: "URL_LINKEDIN", regex: &URL_LINKEDIN_RE },
        Pattern { tag: "URL_GITHUB", regex: &URL_GITHUB_RE },
    ]
});

/// A single named-entity hit, offsets relative to the chunk it was tagged from.
#[derive(Debug, Clone)]
pub struct NerHit {
    pub label: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// An injectable named-entity capability. Absence means regex-only
/// detection; presence never guarantees a hit, only that inference ran.
/// A chunk-level `Err` means that one chunk's inference failed (model
/// crashed, backend unreachable, ...) — distinct from absence, it is
/// logged as a `DetectionWarning` and detection continues with the
/// remaining chunks.
pub trait NerTagger: Send + Sync {
    fn tag(&self, chunk: &str) -> std::result::Result<Vec<NerHit>, String>;
}

pub struct Detector {
    ner: Option<Arc<dyn NerTagger>>,
}

impl Detector {
    pub fn new(ner: Option<Arc<dyn NerTagger>>) -> Self {
        Self { ner }
    }

    pub fn detect(&self, page_text: &str, page: usize) -> Vec<DetectedEntity> {
        let mut entities = self.detect_regex(page_text, page);
        entities.extend(self.detect_ner(page_text, page));
        dedup(&mut entities);
        entities
    }

    fn detect_regex(&self, page_text: &str, page: usize) -> Vec<DetectedEntity> {
        let mut out = Vec::new();
        for pattern in PATTERNS.iter() {
            for m in pattern.regex.find_iter(page_text) {
                out.push(DetectedEntity::new(
                    pattern.tag,
                    m.as_str(),
                    m.start(),
                    m.end(),
                    1.0,
                    page,
                    EntitySource::Regex,
                ));
            }
        }
        out
    }

    fn detect_ner(&self, page_text: &str, page: usize) -> Vec<DetectedEntity> {
        let Some(tagger) = &self.ner else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut origin = 0usize;
        for chunk in chunk_chars(page_text, NER_CHUNK_SIZE) {
            match tagger.tag(chunk) {
                Ok(hits) => {
                    for hit in hits {
                        let entity_type = match hit.label.as_str() {
                            "PER" => "PERSON",
                            "LOC" => "LOCATION",
                            "ORG" => "ORGANIZATION",
                            _ => continue,
                        };
                        if hit.text.chars().count() < NER_MIN_LEN || hit.score < NER_MIN_CONFIDENCE {
                            continue;
                        }
                        out.push(DetectedEntity::new(
                            entity_type,
                            hit.text,
                            origin + hit.start,
                            origin + hit.end,
                            hit.score,
                            page,
                            EntitySource::Ner,
                        ));
                    }
                }
                Err(e) => {
                    let warning = PipelineError::DetectionWarning(e);
                    tracing::warn!(page, error = %warning, "NER chunk failed, skipping chunk");
                }
            }
            origin += chunk.chars().count();
        }
        out
    }
}

/// Splits `text` into consecutive chunks of at most `max_chars` characters
/// without slicing inside a UTF-8 code point.
fn chunk_chars(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut last_boundary = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..last_boundary]);
            start = last_boundary;
            count = 0;
        }
        last_boundary = idx;
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}

/// Sorts by `(start asc, confidence desc)`, then drops any entity whose
/// start lies within the previously kept entity's `[start, end)`.
fn dedup(entities: &mut Vec<DetectedEntity>) {
    entities.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap())
    });
    let mut kept: Vec<DetectedEntity> = Vec::with_capacity(entities.len());
    for entity in entities.drain(..) {
        if let Some(prev) = kept.last() {
            if entity.start < prev.end {
                continue;
            }
        }
        kept.push(entity);
    }
    *entities = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ssn() {
        let detector = Detector::new(None);
        let entities = detector.detect("SSN: 123-45-6789", 0);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, "SSN");
        assert_eq!(entities[0].text, "123-45-6789");
        assert_eq!(entities[0].confidence, 1.0);
    }

    #[test]
    fn finds_email_and_ip() {
        let detector = Detector::new(None);
        let entities = detector.detect("contact jane@example.com from 10.0.0.1", 0);
        let types: Vec<_> = entities.iter().map(|e| e.entity_type.as_str()).collect();
        assert!(types.contains(&"EMAIL"));
        assert!(types.contains(&"IP_ADDRESS"));
    }

    struct StubTagger;
    impl NerTagger for StubTagger {
        fn tag(&self, chunk: &str) -> std::result::Result<Vec<NerHit>, String> {
            if let Some(pos) = chunk.find("john") {
                Ok(vec![NerHit {
                    label: "PER".into(),
                    text: "john".into(),
                    start: pos,
                    end: pos + 4,
                    score: 0.95,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn overlap_dedup_prefers_longer_regex_match() {
        let detector = Detector::new(Some(Arc::new(StubTagger)));
        let text = "reach john@example.com for details";
        let entities = detector.detect(text, 0);
        let emails: Vec<_> = entities.iter().filter(|e| e.entity_type == "EMAIL").collect();
        let persons: Vec<_> = entities.iter().filter(|e| e.entity_type == "PERSON").collect();
        assert_eq!(emails.len(), 1);
        assert!(persons.is_empty());
    }

    #[test]
    fn ner_rejects_low_confidence_and_short_matches() {
        struct WeakTagger;
        impl NerTagger for WeakTagger {
            fn tag(&self, _chunk: &str) -> std::result::Result<Vec<NerHit>, String> {
                Ok(vec![NerHit {
                    label: "LOC".into(),
                    text: "NY".into(),
                    start: 0,
                    end: 2,
                    score: 0.5,
                }])
            }
        }
        let detector = Detector::new(Some(Arc::new(WeakTagger)));
        let entities = detector.detect("NY is a city", 0);
        assert!(entities.is_empty());
    }

    #[test]
    fn ner_chunk_failure_logs_warning_and_continues() {
        struct FlakyTagger;
        impl NerTagger for FlakyTagger {
            fn tag(&self, chunk: &str) -> std::result::Result<Vec<NerHit>, String> {
                if chunk.contains("john") {
                    Err("backend unreachable".into())
                } else {
                    Ok(Vec::new())
                }
            }
        }
        let detector = Detector::new(Some(Arc::new(FlakyTagger)));
        let entities = detector.detect("reach john@example.com for details", 0);
        let persons: Vec<_> = entities.iter().filter(|e| e.entity_type == "PERSON").collect();
        assert!(persons.is_empty());
        let emails: Vec<_> = entities.iter().filter(|e| e.entity_type == "EMAIL").collect();
        assert_eq!(emails.len(), 1);
    }
}
