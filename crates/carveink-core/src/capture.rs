//! Capture regions: which verse owns a given stretch of the canvas.
//!
//! Verse rects usually leave gaps between them (line spacing, underline
//! padding). Capture regions close those gaps by splitting each gap at its
//! vertical midpoint, so a pen stroke anywhere between the first verse's top
//! and the last verse's bottom is attributed to exactly one verse.

use kurbo::Rect;
use std::collections::{BTreeMap, HashMap};

/// Verse number as laid out on the page.
pub type VerseNumber = u32;

/// Build non-overlapping capture regions from the current verse rects.
///
/// Verses are ordered top to bottom by their rect's top edge (ties broken by
/// verse number). Adjacent regions share the midpoint between the previous
/// rect's bottom and the current rect's top. Each region keeps its verse's
/// horizontal extent. Non-finite or empty rects are ignored, and a verse whose
/// computed region has no height is left out.
pub fn capture_regions(rects: &HashMap<VerseNumber, Rect>) -> BTreeMap<VerseNumber, Rect> {
    let mut ordered: Vec<(VerseNumber, Rect)> = rects
        .iter()
        .map(|(&verse, &rect)| (verse, rect.abs()))
        .filter(|(_, rect)| rect.is_finite() && rect.area() > 0.0)
        .collect();
    ordered.sort_by(|(va, a), (vb, b)| a.y0.total_cmp(&b.y0).then(va.cmp(vb)));

    let mut regions = BTreeMap::new();
    for (i, &(verse, rect)) in ordered.iter().enumerate() {
        let top = match i.checked_sub(1).map(|p| ordered[p].1) {
            Some(prev) => (prev.y1 + rect.y0) / 2.0,
            None => rect.y0,
        };
        let bottom = match ordered.get(i + 1).map(|&(_, next)| next) {
            Some(next) => (rect.y1 + next.y0) / 2.0,
            None => rect.y1,
        };

        if bottom - top <= 0.0 {
            log::debug!("verse {verse}: degenerate capture region ({top}..{bottom}), skipped");
            continue;
        }
        regions.insert(verse, Rect::new(rect.x0, top, rect.x1, bottom));
    }
    regions
}
