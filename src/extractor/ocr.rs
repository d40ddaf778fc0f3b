//! Shells out to `pdftoppm` and `tesseract` rather than linking an OCR
//! engine in-process. Word-level boxes come from tesseract's TSV output
//! mode, since entities need a rectangle per word, not just a text blob.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use crate::error::{PipelineError, Result};
use crate::models::{PageContent, TextBlock};

const TSV_WORD_LEVEL: &str = "5";
const TSV_PAGE_LEVEL: &str = "1";

struct TsvWord {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    text: String,
}

fn run_tesseract_tsv(image_path: &Path) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(image_path)
        .arg("stdout")
        .args(["-l", "eng", "tsv"])
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Extraction("tesseract not found (install tesseract-ocr)".into())
            } else {
                PipelineError::Io(e)
            }
        })?;
    if !output.status.success() {
        return Err(PipelineError::Extraction(format!(
            "tesseract failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses tesseract TSV output into word-level boxes and the page's
/// rasterized height in pixels (from the level-1 page row).
fn parse_tsv(tsv: &str) -> (Vec<TsvWord>, f64) {
    let mut words = Vec::new();
    let mut page_height_px = 0.0;
    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level = cols[0];
        let left: f64 = cols[6].parse().unwrap_or(0.0);
        let top: f64 = cols[7].parse().unwrap_or(0.0);
        let width: f64 = cols[8].parse().unwrap_or(0.0);
        let height: f64 = cols[9].parse().unwrap_or(0.0);
        if level == TSV_PAGE_LEVEL {
            page_height_px = height;
            continue;
        }
        if level != TSV_WORD_LEVEL {
            continue;
        }
        let text = cols[11].trim().to_string();
        if text.is_empty() {
            continue;
        }
        words.push(TsvWord { left, top, width, height, text });
    }
    (words, page_height_px)
}

/// Builds a `PageContent` from tesseract TSV words, scaling pixel
/// coordinates to PDF user-space points by `scale` (72/300 for a
/// rasterized PDF page, 1.0 for an already-1:1 image) and flipping the
/// vertical axis (image coordinates grow downward, PDF points upward).
fn page_content_from_tsv(page_number: usize, tsv: &str, scale: f64) -> PageContent {
    let (words, page_height_px) = parse_tsv(tsv);
    let page_height_pt = page_height_px * scale;

    let mut page = PageContent::new(page_number);
    page.ocr_used = true;
    let mut cursor = 0usize;
    for word in words {
        if !page.text.is_empty() {
            page.text.push(' ');
        }
        let char_start = cursor;
        page.text.push_str(&word.text);
        let char_end = char_start + word.text.chars().count();
        cursor = char_end + 1;

        let x0 = word.left * scale;
        let x1 = (word.left + word.width) * scale;
        let y1 = page_height_pt - word.top * scale;
        let y0 = page_height_pt - (word.top + word.height) * scale;

        page.blocks.push(TextBlock {
            text: word.text,
            bbox: [x0, y0, x1, y1],
            page_number,
            char_start,
            char_end,
        });
    }
    page
}

/// Rasterizes page `page_number` (1-indexed, as `pdftoppm` expects) of
/// `pdf_path` at 300 DPI and OCRs the result.
pub fn ocr_pdf_page(pdf_path: &Path, page_number_1indexed: u32, page_index_0: usize) -> Result<PageContent> {
    let temp_dir = TempDir::new().map_err(PipelineError::Io)?;
    let prefix = temp_dir.path().join("page");
    let page_str = page_number_1indexed.to_string();

    let status = Command::new("pdftoppm")
        .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
        .arg(pdf_path)
        .arg(&prefix)
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::Extraction("pdftoppm not found (install poppler-utils)".into())
            } else {
                PipelineError::Io(e)
            }
        })?;
    if !status.success() {
        return Err(PipelineError::Extraction(
            "pdftoppm failed to rasterize page".into(),
        ));
    }

    let image_path = find_rasterized_page(temp_dir.path(), page_number_1indexed)
        .ok_or_else(|| PipelineError::Extraction("no raster produced for page".into()))?;
    let tsv = run_tesseract_tsv(&image_path)?;
    Ok(page_content_from_tsv(page_index_0, &tsv, 72.0 / 300.0))
}

fn find_rasterized_page(dir: &Path, page_number: u32) -> Option<std::path::PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_number, width = digits);
        let path = dir.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().map(|e| e == "png").unwrap_or(false))
}

/// OCRs a standalone raster image at 1:1 pixel-to-point scale.
pub fn ocr_image(image_path: &Path) -> Result<PageContent> {
    let tsv = run_tesseract_tsv(image_path)?;
    Ok(page_content_from_tsv(0, &tsv, 1.0))
}
