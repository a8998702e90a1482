//! Conversion between stored drawing records and the engine's in-memory ink.
//!
//! Stores keep every historical record of a verse. This module decides which
//! record is active, whether a save updates or inserts, and turns a chapter's
//! records into decoded verse ink ready for composition.

use crate::capture::VerseNumber;
use crate::ink::Drawing;
use crate::model::{
    ChapterId, PageDrawing, VerseDrawing, VerseUpdateRequest, now_epoch_seconds, verse_drawing_id,
};
use crate::placement::BaseMetrics;
use crate::storage::{DrawingStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pick the active record among one verse's history.
///
/// A record flagged `is_presented` wins; otherwise the most recently updated
/// one (the later creation breaks ties).
pub fn main_drawing<'a, I>(records: I) -> Option<&'a VerseDrawing>
where
    I: IntoIterator<Item = &'a VerseDrawing>,
{
    let mut latest: Option<&VerseDrawing> = None;
    for record in records {
        if record.is_presented {
            return Some(record);
        }
        let newer = latest.is_none_or(|l| (record.updated_at, record.created_at) > (l.updated_at, l.created_at));
        if newer {
            latest = Some(record);
        }
    }
    latest
}

/// What a store should do with one update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Overwrite the ink of the record with this id.
    Update { id: String },
    /// Create a new record for the verse.
    Insert,
}

/// Decide between updating the verse's active record and inserting a new one.
pub fn plan_update(records: &[VerseDrawing], request: &VerseUpdateRequest) -> UpdatePlan {
    let siblings = records
        .iter()
        .filter(|r| r.chapter == request.chapter && r.verse == request.verse);
    match main_drawing(siblings) {
        Some(active) => UpdatePlan::Update { id: active.id.clone() },
        None => UpdatePlan::Insert,
    }
}

/// Everything stored for one chapter. Both store backends keep one of these
/// per chapter and share the mutation logic below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterRecords {
    #[serde(default)]
    pub verses: Vec<VerseDrawing>,
    #[serde(default)]
    pub page: Option<PageDrawing>,
}

impl ChapterRecords {
    /// Records sorted by verse, then by creation.
    pub fn sorted_verses(&self) -> Vec<VerseDrawing> {
        let mut verses = self.verses.clone();
        verses.sort_by_key(|r| (r.verse, r.created_at));
        verses
    }

    /// One verse's records, most recently updated first.
    pub fn verse_history(&self, verse: VerseNumber) -> Vec<VerseDrawing> {
        let mut history: Vec<VerseDrawing> = self.verses.iter().filter(|r| r.verse == verse).cloned().collect();
        history.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.created_at.cmp(&a.created_at)));
        history
    }

    /// Apply one update request.
    pub fn apply_update(&mut self, request: &VerseUpdateRequest) {
        match plan_update(&self.verses, request) {
            UpdatePlan::Update { id } => {
                if let Some(record) = self.verses.iter_mut().find(|r| r.id == id) {
                    record.ink = request.ink.clone();
                    record.updated_at = request.updated_at;
                    if request.replace_base {
                        record.base_width = request.base_width;
                        record.base_height = request.base_height;
                        record.base_first_underline_offset = request.base_first_underline_offset;
                    } else {
                        // Base metadata only changes when the request carries it.
                        record.base_width = request.base_width.or(record.base_width);
                        record.base_height = request.base_height.or(record.base_height);
                        record.base_first_underline_offset =
                            request.base_first_underline_offset.or(record.base_first_underline_offset);
                    }
                    log::debug!("updated drawing {} (verse {})", id, request.verse);
                }
            }
            UpdatePlan::Insert => {
                // Ids carry whole seconds; step past any record created in the same second.
                let mut created_at = request.updated_at;
                while self
                    .verses
                    .iter()
                    .any(|r| r.id == verse_drawing_id(&request.chapter, request.verse, created_at))
                {
                    created_at += 1;
                }
                let mut record = VerseDrawing::new(request.chapter.clone(), request.verse, request.ink.clone(), created_at);
                record.updated_at = request.updated_at;
                record.base_width = request.base_width;
                record.base_height = request.base_height;
                record.base_first_underline_offset = request.base_first_underline_offset;
                log::debug!("inserted drawing {} (verse {})", record.id, request.verse);
                self.verses.push(record);
            }
        }
    }

    /// Flag `id` as presented and clear the flag on its siblings.
    pub fn select_active(&mut self, verse: VerseNumber, id: &str) -> StorageResult<()> {
        if !self.verses.iter().any(|r| r.verse == verse && r.id == id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        for record in self.verses.iter_mut().filter(|r| r.verse == verse) {
            record.is_presented = record.id == id;
        }
        Ok(())
    }

    /// Fill in a missing baseline anchor on the verse's active record.
    /// Returns whether anything changed.
    pub fn set_base_underline_offset(&mut self, verse: VerseNumber, offset: f64) -> bool {
        let Some(id) = main_drawing(self.verses.iter().filter(|r| r.verse == verse)).map(|r| r.id.clone()) else {
            return false;
        };
        match self.verses.iter_mut().find(|r| r.id == id) {
            Some(record) if record.base_first_underline_offset.is_none() => {
                record.base_first_underline_offset = Some(offset);
                true
            }
            _ => false,
        }
    }

    /// Replace the page cache.
    pub fn upsert_page(&mut self, chapter: &ChapterId, ink: Vec<u8>) {
        self.page = Some(PageDrawing {
            chapter: chapter.clone(),
            ink,
            updated_at: now_epoch_seconds(),
        });
    }
}

/// A verse's active record together with its decoded local ink.
#[derive(Debug, Clone, PartialEq)]
pub struct VerseInk {
    pub record: VerseDrawing,
    pub local: Drawing,
}

impl VerseInk {
    pub fn verse(&self) -> VerseNumber {
        self.record.verse
    }

    pub fn base(&self) -> BaseMetrics {
        BaseMetrics::from(&self.record)
    }

    /// Build the store request that writes this ink and its base metadata
    /// back exactly as held in memory.
    pub fn to_request(&self, updated_at: i64) -> StorageResult<VerseUpdateRequest> {
        let ink = self
            .local
            .to_bytes()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(VerseUpdateRequest {
            chapter: self.record.chapter.clone(),
            verse: self.record.verse,
            ink,
            base_width: self.record.base_width,
            base_height: self.record.base_height,
            base_first_underline_offset: self.record.base_first_underline_offset,
            updated_at,
            replace_base: true,
        })
    }
}

/// Decode a chapter's records into one active ink per verse, sorted by verse.
///
/// Records whose blob does not decode, or decodes to no strokes, never take
/// part in selection; decode failures are logged and skipped.
pub fn decode_active(records: Vec<VerseDrawing>) -> Vec<VerseInk> {
    let mut by_verse: BTreeMap<VerseNumber, Vec<VerseInk>> = BTreeMap::new();
    for record in records {
        match Drawing::from_bytes(&record.ink) {
            Ok(local) if !local.is_empty() => {
                by_verse.entry(record.verse).or_default().push(VerseInk { record, local });
            }
            Ok(_) => {}
            Err(e) => log::warn!("skipping drawing {} (verse {}): {}", record.id, record.verse, e),
        }
    }

    by_verse
        .into_values()
        .filter_map(|candidates| {
            let active_id = main_drawing(candidates.iter().map(|c| &c.record))?.id.clone();
            candidates.into_iter().find(|c| c.record.id == active_id)
        })
        .collect()
}

/// Result of fetching one chapter, tagged with the chapter it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterLoad {
    pub chapter: ChapterId,
    pub verses: Vec<VerseInk>,
    /// Decoded page cache, if one exists and decodes.
    pub page: Option<Drawing>,
}

/// Fetch and decode everything needed to show a chapter.
///
/// Fetch failures degrade to an empty chapter rather than failing the session.
pub async fn load_chapter<S: DrawingStore + ?Sized>(store: &S, chapter: &ChapterId) -> ChapterLoad {
    let verses = match store.fetch_verse_drawings(chapter).await {
        Ok(records) => decode_active(records),
        Err(e) => {
            log::error!("fetching verse drawings for {} failed: {}", chapter, e);
            Vec::new()
        }
    };

    let page = match store.fetch_page_drawing(chapter).await {
        Ok(Some(page)) => match Drawing::from_bytes(&page.ink) {
            Ok(drawing) => Some(drawing),
            Err(e) => {
                log::warn!("ignoring page cache for {}: {}", chapter, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            log::error!("fetching page drawing for {} failed: {}", chapter, e);
            None
        }
    };

    log::info!(
        "loaded {}: {} verse drawing(s), page cache {}",
        chapter,
        verses.len(),
        if page.is_some() { "present" } else { "absent" }
    );
    ChapterLoad {
        chapter: chapter.clone(),
        verses,
        page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::{InkStyle, Stroke};
    use kurbo::Point;

    fn chapter() -> ChapterId {
        ChapterId::new("genesis", 1)
    }

    fn ink() -> Vec<u8> {
        Drawing::from_strokes(vec![Stroke::from_locations(
            [Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
            InkStyle::default(),
        )])
        .to_bytes()
        .unwrap()
    }

    fn record(verse: VerseNumber, created_at: i64, updated_at: i64) -> VerseDrawing {
        let mut r = VerseDrawing::new(chapter(), verse, ink(), created_at);
        r.updated_at = updated_at;
        r
    }

    fn request(verse: VerseNumber, updated_at: i64) -> VerseUpdateRequest {
        VerseUpdateRequest {
            chapter: chapter(),
            verse,
            ink: ink(),
            base_width: Some(300.0),
            base_height: None,
            base_first_underline_offset: None,
            updated_at,
            replace_base: false,
        }
    }

    #[test]
    fn test_main_drawing_prefers_presented() {
        let mut old = record(1, 10, 10);
        old.is_presented = true;
        let new = record(1, 20, 30);

        assert_eq!(main_drawing([&new, &old]).unwrap().id, old.id);
    }

    #[test]
    fn test_main_drawing_falls_back_to_latest_update() {
        let a = record(1, 10, 50);
        let b = record(1, 20, 30);
        assert_eq!(main_drawing([&a, &b]).unwrap().id, a.id);
        assert!(main_drawing(std::iter::empty()).is_none());
    }

    #[test]
    fn test_plan_update_vs_insert() {
        let records = vec![record(1, 10, 10)];
        assert_eq!(
            plan_update(&records, &request(1, 99)),
            UpdatePlan::Update { id: records[0].id.clone() }
        );
        assert_eq!(plan_update(&records, &request(2, 99)), UpdatePlan::Insert);
    }

    #[test]
    fn test_apply_update_keeps_base_metadata_when_absent() {
        let mut records = ChapterRecords::default();
        let mut existing = record(1, 10, 10);
        existing.base_height = Some(44.0);
        records.verses.push(existing);

        records.apply_update(&request(1, 99));
        let updated = &records.verses[0];
        assert_eq!(updated.updated_at, 99);
        assert_eq!(updated.base_width, Some(300.0));
        assert_eq!(updated.base_height, Some(44.0));
        assert_eq!(records.verses.len(), 1);
    }

    #[test]
    fn test_apply_update_replaces_base_metadata_when_asked() {
        let mut records = ChapterRecords::default();
        let mut existing = record(1, 10, 10);
        existing.base_height = Some(44.0);
        existing.base_first_underline_offset = Some(12.0);
        records.verses.push(existing);

        let mut restore = request(1, 99);
        restore.replace_base = true;
        records.apply_update(&restore);
        let updated = &records.verses[0];
        assert_eq!(updated.base_width, Some(300.0));
        assert_eq!(updated.base_height, None);
        assert_eq!(updated.base_first_underline_offset, None);
    }

    #[test]
    fn test_apply_update_inserts_unique_ids() {
        let mut records = ChapterRecords::default();
        // A stray record already holds the id verse 2 would get at t=99.
        let mut stray = record(3, 99, 99);
        stray.id = verse_drawing_id(&chapter(), 2, 99);
        records.verses.push(stray);

        records.apply_update(&request(2, 99));
        records.apply_update(&request(2, 99));

        let history = records.verse_history(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "genesis.1.2.100");
        assert_eq!(history[0].updated_at, 99);
    }

    #[test]
    fn test_select_active_is_exclusive() {
        let mut records = ChapterRecords::default();
        records.verses.push(record(1, 10, 10));
        records.verses.push(record(1, 20, 20));
        records.verses[1].is_presented = true;

        let target = records.verses[0].id.clone();
        records.select_active(1, &target).unwrap();
        let presented: Vec<_> = records.verses.iter().filter(|r| r.is_presented).collect();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].id, target);

        assert!(matches!(records.select_active(1, "nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_backfill_only_when_missing() {
        let mut records = ChapterRecords::default();
        records.verses.push(record(1, 10, 10));

        assert!(records.set_base_underline_offset(1, 12.0));
        assert!(!records.set_base_underline_offset(1, 30.0));
        assert_eq!(records.verses[0].base_first_underline_offset, Some(12.0));
        assert!(!records.set_base_underline_offset(9, 1.0));
    }

    #[test]
    fn test_decode_active_skips_corrupt_and_empty() {
        let good = record(1, 10, 10);
        let mut corrupt = record(2, 10, 10);
        corrupt.ink = b"garbage".to_vec();
        let mut empty = record(3, 10, 10);
        empty.ink = Drawing::new().to_bytes().unwrap();
        // A newer but corrupt version must not shadow the older readable one.
        let mut newer_corrupt = record(1, 20, 20);
        newer_corrupt.ink = b"{".to_vec();

        let active = decode_active(vec![corrupt, good.clone(), empty, newer_corrupt]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].record.id, good.id);
        assert_eq!(active[0].local.len(), 1);
    }

    #[test]
    fn test_decode_active_sorted_by_verse() {
        let active = decode_active(vec![record(5, 1, 1), record(2, 1, 1), record(9, 1, 1)]);
        let verses: Vec<_> = active.iter().map(VerseInk::verse).collect();
        assert_eq!(verses, vec![2, 5, 9]);
    }
}
