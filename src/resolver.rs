//! Maps each entity's character range to a bounding box via its page's
//! text blocks. The subtlest piece of the pipeline: see module-level
//! docs in `models::page` for the block-overlap contract this leans on.

use std::collections::HashMap;

use crate::models::{DetectedEntity, PageContent};

pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves bboxes in place. Entities that already carry a bbox
    /// (OCR-sourced) are left untouched.
    pub fn resolve(&self, entities: &mut [DetectedEntity], pages: &HashMap<usize, PageContent>) {
        for entity in entities.iter_mut() {
            if entity.bbox.is_some() {
                continue;
            }
            let Some(page) = pages.get(&entity.page) else {
                continue;
            };
            let blocks = page.blocks_overlapping(entity.start, entity.end);
            entity.bbox = union_bbox(&blocks);
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

fn union_bbox(blocks: &[&crate::models::TextBlock]) -> Option<[f64; 4]> {
    let mut iter = blocks.iter();
    let first = iter.next()?.bbox;
    let mut union = first;
    for block in iter {
        let b = block.bbox;
        union[0] = union[0].min(b[0]);
        union[1] = union[1].min(b[1]);
        union[2] = union[2].max(b[2]);
        union[3] = union[3].max(b[3]);
    }
    Some(union)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntitySource, TextBlock};

    fn block(text: &str, bbox: [f64; 4], start: usize, end: usize) -> TextBlock {
        TextBlock {
            text: text.to_string(),
            bbox,
            page_number: 0,
            char_start: start,
            char_end: end,
        }
    }

    #[test]
    fn single_block_resolves_verbatim() {
        let mut page = PageContent::new(0);
        page.blocks.push(block("123-45-6789", [10.0, 20.0, 60.0, 32.0], 5, 16));
        let mut pages = HashMap::new();
        pages.insert(0, page);

        let mut entities = vec![DetectedEntity::new("SSN", "123-45-6789", 5, 16, 1.0, 0, EntitySource::Regex)];
        Resolver::new().resolve(&mut entities, &pages);
        assert_eq!(entities[0].bbox, Some([10.0, 20.0, 60.0, 32.0]));
    }

    #[test]
    fn multi_block_unions_rectangles() {
        let mut page = PageContent::new(0);
        page.blocks.push(block("alice.long.name@exam", [10.0, 700.0, 90.0, 712.0], 0, 20));
        page.blocks.push(block("ple.com", [10.0, 688.0, 50.0, 700.0], 20, 27));
        let mut pages = HashMap::new();
        pages.insert(0, page);

        let mut entities = vec![DetectedEntity::new(
            "EMAIL",
            "alice.long.name@example.com",
            0,
            27,
            1.0,
            0,
            EntitySource::Regex,
        )];
        Resolver::new().resolve(&mut entities, &pages);
        assert_eq!(entities[0].bbox, Some([10.0, 688.0, 90.0, 712.0]));
    }

    #[test]
    fn no_overlap_leaves_bbox_unset() {
        let page = PageContent::new(0);
        let mut pages = HashMap::new();
        pages.insert(0, page);
        let mut entities = vec![DetectedEntity::new("SSN", "x", 0, 1, 1.0, 0, EntitySource::Regex)];
        Resolver::new().resolve(&mut entities, &pages);
        assert_eq!(entities[0].bbox, None);
    }

    #[test]
    fn ocr_supplied_bbox_is_untouched() {
        let page = PageContent::new(0);
        let mut pages = HashMap::new();
        pages.insert(0, page);
        let mut entities =
            vec![DetectedEntity::new("SSN", "x", 0, 1, 1.0, 0, EntitySource::Ocr).with_bbox([1.0, 2.0, 3.0, 4.0])];
        Resolver::new().resolve(&mut entities, &pages);
        assert_eq!(entities[0].bbox, Some([1.0, 2.0, 3.0, 4.0]));
    }
}
