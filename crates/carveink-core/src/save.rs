//! Save pipeline: splitting a finished gesture into per-verse fragments.
//!
//! Planning is pure. The session applies the plan to its in-memory state and
//! then hands `requests` and `page_ink` to the store.

use crate::capture::{VerseNumber, capture_regions};
use crate::config::EngineConfig;
use crate::ink::{Drawing, InkError, intersects_inclusive};
use crate::model::{ChapterId, VerseDrawing, VerseUpdateRequest};
use crate::persistence::VerseInk;
use crate::placement::to_local;
use kurbo::Rect;
use std::collections::{BTreeMap, HashMap};

/// Everything one save writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavePlan {
    /// New in-memory ink of each updated verse, in verse order.
    pub verses: Vec<VerseInk>,
    /// One request per updated verse, in the same order.
    pub requests: Vec<VerseUpdateRequest>,
    /// Encoded full canvas ink for the page cache.
    pub page_ink: Vec<u8>,
}

impl SavePlan {
    /// Number of verses whose ink this save updates.
    pub fn updated_verse_count(&self) -> usize {
        self.requests.len()
    }
}

/// Verses whose capture region touches the changed region.
pub fn affected_verses(regions: &BTreeMap<VerseNumber, Rect>, changed_region: Rect) -> Vec<VerseNumber> {
    regions
        .iter()
        .filter(|(_, region)| intersects_inclusive(**region, changed_region))
        .map(|(&verse, _)| verse)
        .collect()
}

/// Rect used to cut one verse's fragment out of the canvas ink: the capture
/// region inset on both sides. Only the topmost verse reaches up into the
/// top padding; every other verse stops at its own capture region top, which
/// the previous verse's region already ends at.
pub fn verse_clip_rect(capture: Rect, topmost: bool, config: &EngineConfig) -> Rect {
    let inset = config.horizontal_inset;
    let top = if topmost { capture.y0 - config.top_padding } else { capture.y0 };
    let mut rect = Rect::new(capture.x0, top, capture.x1, capture.y1);
    if rect.width() > 2.0 * inset {
        rect.x0 += inset;
        rect.x1 -= inset;
    }
    rect
}

/// Plan the writes for a completed gesture.
///
/// `drawing` is the full canvas ink, `changed_region` the bounds of what the
/// gesture touched. `existing` yields the verse's current active record, if
/// any, so updated verses keep their identity in memory.
#[allow(clippy::too_many_arguments)]
pub fn plan_save(
    chapter: &ChapterId,
    drawing: &Drawing,
    changed_region: Rect,
    rects: &HashMap<VerseNumber, Rect>,
    offsets: &HashMap<VerseNumber, f64>,
    existing: impl Fn(VerseNumber) -> Option<VerseDrawing>,
    config: &EngineConfig,
    now: i64,
) -> Result<SavePlan, InkError> {
    let mut plan = SavePlan {
        page_ink: drawing.to_bytes()?,
        ..SavePlan::default()
    };
    if !changed_region.is_finite() {
        log::warn!("save: ignoring non-finite changed region {changed_region:?}");
        return Ok(plan);
    }

    let regions = capture_regions(rects);
    let page_top = regions.values().map(|r| r.y0).fold(f64::INFINITY, f64::min);
    for verse in affected_verses(&regions, changed_region.abs()) {
        let (Some(capture), Some(rect)) = (regions.get(&verse), rects.get(&verse)) else {
            continue;
        };
        let clipped = drawing.clipped_precisely(verse_clip_rect(*capture, capture.y0 <= page_top, config));
        if clipped.is_empty() {
            log::debug!("save: verse {verse} touched but clipped to nothing");
            continue;
        }

        let rect = rect.abs();
        let local = to_local(&clipped, rect, config);
        let ink = local.to_bytes()?;
        let offset = offsets.get(&verse).copied().filter(|o| o.is_finite());

        let mut record = existing(verse).unwrap_or_else(|| VerseDrawing::new(chapter.clone(), verse, Vec::new(), now));
        record.ink = ink.clone();
        record.updated_at = now;
        record.base_width = Some(rect.width());
        record.base_height = Some(rect.height());
        if offset.is_some() {
            record.base_first_underline_offset = offset;
        }

        plan.requests.push(VerseUpdateRequest {
            chapter: chapter.clone(),
            verse,
            ink,
            base_width: Some(rect.width()),
            base_height: Some(rect.height()),
            base_first_underline_offset: offset,
            updated_at: now,
            replace_base: false,
        });
        plan.verses.push(VerseInk { record, local });
    }

    log::debug!(
        "save: {} verse fragment(s) from {} stroke(s)",
        plan.updated_verse_count(),
        drawing.len()
    );
    Ok(plan)
}
