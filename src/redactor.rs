//! Burns opaque rectangles into a copy of the input PDF. Destructive:
//! the text-showing operation under a redacted rectangle is blanked in
//! the content stream, not merely painted over, so no glyphs survive
//! under the black fill.

use std::collections::HashMap;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::Object;

use crate::error::{PipelineError, Result};
use crate::extractor::layout::{LayoutWalker, SpanRef};
use crate::models::DetectedEntity;

const MIN_FALLBACK_TEXT_LEN: usize = 4;

pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, input: &Path, entities: &[DetectedEntity], output: &Path) -> Result<()> {
        let mut doc = lopdf::Document::load(input)
            .map_err(|e| PipelineError::Extraction(format!("could not open PDF to redact: {e}")))?;

        let mut by_page: HashMap<usize, Vec<&DetectedEntity>> = HashMap::new();
        for entity in entities {
            by_page.entry(entity.page).or_default().push(entity);
        }

        let pages = doc.get_pages();
        for (index, (_page_num, page_id)) in pages.into_iter().enumerate() {
            let Some(page_entities) = by_page.get(&index) else {
                continue;
            };
            self.redact_page(&mut doc, page_id, page_entities)?;
        }

        doc.compress();
        doc.save(output)
            .map_err(|e| PipelineError::Extraction(format!("could not save redacted PDF: {e}")))?;
        Ok(())
    }

    fn redact_page(
        &self,
        doc: &mut lopdf::Document,
        page_id: (u32, u16),
        entities: &[&DetectedEntity],
    ) -> Result<()> {
        let bytes = doc
            .get_page_content(page_id)
            .map_err(|e| PipelineError::Extraction(format!("could not read page content: {e}")))?;
        let content = Content::decode(&bytes)
            .map_err(|e| PipelineError::Extraction(format!("could not decode content stream: {e}")))?;

        let (_page_text, spans) = LayoutWalker::new(0).run_with_refs(&content.operations);

        let mut rects: Vec<[f64; 4]> = Vec::new();
        let mut blanked_ops: Vec<usize> = Vec::new();

        for entity in entities {
            if let Some(bbox) = entity.bbox {
                rects.push(bbox);
                for span in &spans {
                    if intersects(span.block.bbox, bbox) {
                        blanked_ops.push(span.op_index);
                    }
                }
                continue;
            }
            if entity.text.chars().count() < MIN_FALLBACK_TEXT_LEN {
                continue;
            }
            if let Some(span) = first_matching_span(&spans, &entity.text) {
                rects.push(span.block.bbox);
                blanked_ops.push(span.op_index);
            }
        }

        let mut operations = content.operations;
        for idx in blanked_ops {
            blank_operation(&mut operations[idx]);
        }
        for rect in rects {
            operations.extend(fill_rect_operations(rect));
        }

        let encoded = Content { operations }
            .encode()
            .map_err(|e| PipelineError::Extraction(format!("could not encode content stream: {e}")))?;
        doc.change_page_content(page_id, encoded)
            .map_err(|e| PipelineError::Extraction(format!("could not write page content: {e}")))?;
        Ok(())
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}

fn intersects(a: [f64; 4], b: [f64; 4]) -> bool {
    a[0] < b[2] && b[0] < a[2] && a[1] < b[3] && b[1] < a[3]
}

/// Finds the first span (in reading order) whose text contains
/// `needle`, honoring the redactor's "only the first match" rule.
fn first_matching_span<'a>(spans: &'a [SpanRef], needle: &str) -> Option<&'a SpanRef> {
    spans.iter().find(|s| s.block.text.contains(needle))
}

/// Replaces a `Tj`/`TJ` operation's operands with an empty show, so no
/// glyph is emitted for it, without disturbing surrounding operators
/// that depend on operation count (e.g. `BT`/`ET` pairing).
fn blank_operation(op: &mut Operation) {
    match op.operator.as_str() {
        "Tj" => {
            op.operands = vec![Object::string_literal("")];
        }
        "TJ" => {
            op.operands = vec![Object::Array(vec![])];
        }
        _ => {}
    }
}

fn fill_rect_operations(bbox: [f64; 4]) -> Vec<Operation> {
    let [x0, y0, x1, y1] = bbox;
    let w = (x1 - x0).max(0.0);
    let h = (y1 - y0).max(0.0);
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("re", vec![x0.into(), y0.into(), w.into(), h.into()]),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntitySource;
    use lopdf::content::Operation as Op;
    use lopdf::StringFormat;

    fn build_page_pdf(doc: &mut lopdf::Document, text: &str) -> (u32, u16) {
        let content = Content {
            operations: vec![
                Op::new("BT", vec![]),
                Op::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
                Op::new(
                    "Tm",
                    vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 700.into()],
                ),
                Op::new(
                    "Tj",
                    vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
                ),
                Op::new("ET", vec![]),
            ],
        };
        let stream_data = content.encode().unwrap();
        let content_id = doc.add_object(lopdf::Stream::new(lopdf::dictionary! {}, stream_data));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id
        });
        let pages = lopdf::dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1
        };
        doc.objects.insert(pages_id, lopdf::Object::Dictionary(pages));
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id
        });
        doc.trailer.set("Root", catalog_id);
        (page_id.0, page_id.1)
    }

    #[test]
    fn short_bboxless_entity_is_skipped() {
        let mut doc = lopdf::Document::with_version("1.5");
        build_page_pdf(&mut doc, "SSN: 123-45-6789");
        let entity = DetectedEntity::new("X", "A", 0, 1, 1.0, 0, EntitySource::Regex);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        doc.save(&input).unwrap();

        Redactor::new().redact(&input, &[entity], &output).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn bbox_entity_blanks_intersecting_span() {
        let mut doc = lopdf::Document::with_version("1.5");
        build_page_pdf(&mut doc, "Hello");
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        doc.save(&input).unwrap();

        let entity = DetectedEntity::new("X", "Hello", 0, 5, 1.0, 0, EntitySource::Regex)
            .with_bbox([72.0, 700.0, 100.0, 712.0]);
        Redactor::new().redact(&input, &[entity], &output).unwrap();

        let redacted = lopdf::Document::load(&output).unwrap();
        let page_id = *redacted.get_pages().values().next().unwrap();
        let content_bytes = redacted.get_page_content(page_id).unwrap();
        let content = Content::decode(&content_bytes).unwrap();
        let has_text = content.operations.iter().any(|op| {
            op.operator == "Tj"
                && matches!(op.operands.first(), Some(Object::String(s, _)) if !s.is_empty())
        });
        assert!(!has_text);
    }
}
