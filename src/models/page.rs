//! Extractor output: per-page text plus the geometric blocks it was built from.

/// An atomic unit of extracted text: its literal text, its rectangle in
/// PDF user-space points, and the half-open character range it occupies
/// in its page's full text.
///
/// Invariant: for any block, `char_end - char_start == block.text.chars().count()`
/// is *not* required verbatim (separators contribute to the page text but
/// not to any block's own text) — what is required is that blocks are
/// appended in reading order with non-decreasing `char_start` per page.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub text: String,
    pub bbox: [f64; 4],
    pub page_number: usize,
    pub char_start: usize,
    pub char_end: usize,
}

/// Extracted content for a single page.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page_number: usize,
    pub text: String,
    pub blocks: Vec<TextBlock>,
    pub ocr_used: bool,
}

impl PageContent {
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            text: String::new(),
            blocks: Vec::new(),
            ocr_used: false,
        }
    }

    /// Blocks whose character range overlaps `[start, end)`.
    ///
    /// Blocks are sorted by `char_start`, so once a block starts at or
    /// after `end` no later block can overlap either.
    pub fn blocks_overlapping(&self, start: usize, end: usize) -> Vec<&TextBlock> {
        let mut out = Vec::new();
        for block in &self.blocks {
            if block.char_end <= start {
                continue;
            }
            if block.char_start >= end {
                break;
            }
            out.push(block);
        }
        out
    }
}
