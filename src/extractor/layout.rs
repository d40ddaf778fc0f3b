//! Walks a PDF page's content stream operators to build page text and
//! text blocks together, constructively, so that no block's character
//! range ever needs to be recovered by searching the assembled text
//! after the fact.
//!
//! `lopdf` has no font-metrics or rendering engine, so each span's
//! rectangle is an approximation: position comes from the tracked text
//! matrix, height from the active font size, width from character count
//! times a fixed average-advance factor. This trades exact glyph
//! geometry for something good enough to anchor a redaction rectangle,
//! which only needs to cover the text, not hug it.

use lopdf::content::Operation;
use lopdf::Object;

use crate::models::{PageContent, TextBlock};

const AVG_CHAR_WIDTH_FACTOR: f64 = 0.5;
const DEFAULT_FONT_SIZE: f64 = 10.0;
const SAME_LINE_EPSILON: f64 = 0.75;
/// Horizontal gaps smaller than `font_size * this` are treated as a span
/// continuing the previous one (e.g. a font change mid-word) rather than
/// a word boundary, so no separator is inserted between them.
const WORD_GAP_FACTOR: f64 = 0.2;

/// 2D affine text matrix `[a, b, c, d, e, f]`.
#[derive(Clone, Copy)]
struct Matrix([f64; 6]);

impl Matrix {
    fn identity() -> Self {
        Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    fn translated(self, tx: f64, ty: f64) -> Self {
        let [a, b, c, d, e, f] = self.0;
        Self([a, b, c, d, tx * a + ty * c + e, tx * b + ty * d + f])
    }

    fn origin(self) -> (f64, f64) {
        (self.0[4], self.0[5])
    }
}

pub struct LayoutWalker {
    page_number: usize,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f64,
    buffer: String,
    blocks: Vec<TextBlock>,
    last_line_y: Option<f64>,
    last_line_end_x: Option<f64>,
    op_indices: Vec<usize>,
    current_op_index: usize,
}

/// A block paired with the index of the content-stream operation (`Tj`
/// or `TJ`) that produced it, so a caller can go back and mutate that
/// exact operation.
pub struct SpanRef {
    pub block: TextBlock,
    pub op_index: usize,
}

impl LayoutWalker {
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
            font_size: DEFAULT_FONT_SIZE,
            buffer: String::new(),
            blocks: Vec::new(),
            last_line_y: None,
            last_line_end_x: None,
            op_indices: Vec::new(),
            current_op_index: 0,
        }
    }

    pub fn run(mut self, operations: &[Operation]) -> PageContent {
        for op in operations {
            self.apply(op);
        }
        PageContent {
            page_number: self.page_number,
            text: self.buffer,
            blocks: self.blocks,
            ocr_used: false,
        }
    }

    /// Like `run`, but also returns, per block, the index into
    /// `operations` of the `Tj`/`TJ` operation that produced it.
    pub fn run_with_refs(mut self, operations: &[Operation]) -> (PageContent, Vec<SpanRef>) {
        for (idx, op) in operations.iter().enumerate() {
            self.current_op_index = idx;
            self.apply(op);
        }
        let refs = self
            .blocks
            .iter()
            .cloned()
            .zip(self.op_indices.iter().copied())
            .map(|(block, op_index)| SpanRef { block, op_index })
            .collect();
        let page = PageContent {
            page_number: self.page_number,
            text: self.buffer,
            blocks: self.blocks,
            ocr_used: false,
        };
        (page, refs)
    }

    fn apply(&mut self, op: &Operation) {
        match op.operator.as_str() {
            "BT" => {
                self.text_matrix = Matrix::identity();
                self.line_matrix = Matrix::identity();
            }
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(as_f64) {
                    self.font_size = size;
                }
            }
            "Tm" => {
                if op.operands.len() == 6 {
                    let mut m = [0.0; 6];
                    for (i, slot) in m.iter_mut().enumerate() {
                        *slot = as_f64(&op.operands[i]).unwrap_or(0.0);
                    }
                    self.text_matrix = Matrix(m);
                    self.line_matrix = self.text_matrix;
                }
            }
            "Td" | "TD" => {
                if op.operands.len() == 2 {
                    let tx = as_f64(&op.operands[0]).unwrap_or(0.0);
                    let ty = as_f64(&op.operands[1]).unwrap_or(0.0);
                    self.line_matrix = self.line_matrix.translated(tx, ty);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => {
                self.line_matrix = self.line_matrix.translated(0.0, -self.font_size);
                self.text_matrix = self.line_matrix;
            }
            "Tj" => {
                if let Some(text) = op.operands.first().and_then(as_pdf_string) {
                    self.show_text(&text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut combined = String::new();
                    for item in items {
                        if let Some(text) = as_pdf_string(item) {
                            combined.push_str(&text);
                        }
                    }
                    if !combined.is_empty() {
                        self.show_text(&combined);
                    }
                }
            }
            _ => {}
        }
    }

    fn show_text(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let (x0, y0) = self.text_matrix.origin();
        let height = self.font_size.max(1.0);
        let width = (trimmed.chars().count() as f64) * self.font_size * AVG_CHAR_WIDTH_FACTOR;
        let bbox = [x0, y0, x0 + width.max(1.0), y0 + height];

        let same_line = self
            .last_line_y
            .map(|y| (y - y0).abs() < SAME_LINE_EPSILON)
            .unwrap_or(true);
        if !self.buffer.is_empty() {
            if !same_line {
                self.buffer.push('\n');
            } else {
                let gap = self.last_line_end_x.map(|end_x| x0 - end_x).unwrap_or(f64::INFINITY);
                if gap > self.font_size * WORD_GAP_FACTOR {
                    self.buffer.push(' ');
                }
            }
        }
        self.last_line_y = Some(y0);
        self.last_line_end_x = Some(bbox[2]);

        let char_start = self.buffer.chars().count();
        self.buffer.push_str(trimmed);
        let char_end = self.buffer.chars().count();

        self.blocks.push(TextBlock {
            text: trimmed.to_string(),
            bbox,
            page_number: self.page_number,
            char_start,
            char_end,
        });
        self.op_indices.push(self.current_op_index);
    }
}

fn as_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn as_pdf_string(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}
