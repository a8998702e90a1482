//! Composition of verse ink into the single page drawing.
//!
//! The composer owns the current verse rects, first-baseline offsets and the
//! composited drawing. Layout events either trigger a full rebuild (merge every
//! verse's placed ink), a localized replace (swap one verse's placed ink in
//! place), or nothing. Until every inked verse has a usable rect, a page-level
//! cache may stand in for the composite so the canvas is never blank while
//! layout is still being measured.

use crate::capture::VerseNumber;
use crate::config::EngineConfig;
use crate::ink::{Drawing, clip_strokes_by_bounds, remove_intersecting};
use crate::persistence::VerseInk;
use crate::placement::place;
use kurbo::Rect;
use std::collections::{BTreeMap, HashMap};

/// Readiness of the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    /// No verse ink loaded.
    Empty,
    /// Some inked verse still lacks a non-empty rect.
    AwaitingLayout,
    /// Every inked verse has a rect; full rebuilds are possible.
    Ready,
}

/// What an event did to the composited drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionChange {
    Unchanged,
    /// The page cache was installed verbatim.
    PageCache,
    FullRebuild,
    LocalizedReplace { verse: VerseNumber },
}

impl CompositionChange {
    pub fn is_changed(self) -> bool {
        self != CompositionChange::Unchanged
    }
}

fn usable(rect: &Rect) -> bool {
    rect.is_finite() && rect.abs().area() > 0.0
}

fn rects_close(a: Rect, b: Rect, tolerance: f64) -> bool {
    (a.x0 - b.x0).abs() <= tolerance
        && (a.y0 - b.y0).abs() <= tolerance
        && (a.x1 - b.x1).abs() <= tolerance
        && (a.y1 - b.y1).abs() <= tolerance
}

/// Composition state for one chapter.
#[derive(Debug, Clone)]
pub struct Composer {
    config: EngineConfig,
    verses: BTreeMap<VerseNumber, VerseInk>,
    rects: HashMap<VerseNumber, Rect>,
    offsets: HashMap<VerseNumber, f64>,
    /// Last placement of each verse, as it appears in `combined`.
    placed: BTreeMap<VerseNumber, Drawing>,
    combined: Drawing,
    /// Set once verse ink (or user ink) has replaced the page cache.
    composed: bool,
    backfills: Vec<(VerseNumber, f64)>,
}

impl Composer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            verses: BTreeMap::new(),
            rects: HashMap::new(),
            offsets: HashMap::new(),
            placed: BTreeMap::new(),
            combined: Drawing::new(),
            composed: false,
            backfills: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The drawing currently shown on the canvas.
    pub fn combined(&self) -> &Drawing {
        &self.combined
    }

    pub fn rects(&self) -> &HashMap<VerseNumber, Rect> {
        &self.rects
    }

    pub fn offsets(&self) -> &HashMap<VerseNumber, f64> {
        &self.offsets
    }

    pub fn verse(&self, verse: VerseNumber) -> Option<&VerseInk> {
        self.verses.get(&verse)
    }

    /// Verses that currently have ink, in verse order.
    pub fn inked_verses(&self) -> impl Iterator<Item = VerseNumber> + '_ {
        self.verses.keys().copied()
    }

    /// Placed ink of one verse from the last rebuild or replace.
    pub fn placed(&self, verse: VerseNumber) -> Option<&Drawing> {
        self.placed.get(&verse)
    }

    /// True iff at least one verse has ink and every such verse has a
    /// non-empty rect.
    pub fn can_rebuild(&self) -> bool {
        !self.verses.is_empty()
            && self
                .verses
                .keys()
                .all(|v| self.rects.get(v).is_some_and(usable))
    }

    pub fn state(&self) -> ComposerState {
        if self.verses.is_empty() {
            ComposerState::Empty
        } else if self.can_rebuild() {
            ComposerState::Ready
        } else {
            ComposerState::AwaitingLayout
        }
    }

    /// Replace all verse ink with freshly fetched drawings.
    pub fn set_drawings(&mut self, drawings: Vec<VerseInk>) -> CompositionChange {
        self.verses = drawings.into_iter().map(|d| (d.verse(), d)).collect();
        self.placed.clear();
        // Offsets reported before the fetch landed still count as first sightings.
        let known: Vec<(VerseNumber, f64)> = self.offsets.iter().map(|(&v, &o)| (v, o)).collect();
        for (verse, offset) in known {
            self.backfill_anchor(verse, offset);
        }
        log::debug!("composer: {} inked verse(s), state {:?}", self.verses.len(), self.state());
        if self.can_rebuild() {
            self.full_rebuild()
        } else {
            CompositionChange::Unchanged
        }
    }

    /// Show the cached page drawing, unless verse ink has already been composed.
    pub fn set_page_drawing(&mut self, drawing: Drawing) -> CompositionChange {
        if self.composed {
            log::debug!("composer: page cache arrived after composition, ignored");
            return CompositionChange::Unchanged;
        }
        self.combined = drawing;
        CompositionChange::PageCache
    }

    /// Install the drawing produced directly by the ink surface.
    pub fn set_combined(&mut self, drawing: Drawing) {
        self.combined = drawing;
        self.composed = true;
    }

    /// Insert or replace one verse's ink without touching the composite.
    /// The verse's cached placement is refreshed for later replaces.
    pub fn upsert_verse(&mut self, ink: VerseInk) {
        let verse = ink.verse();
        let placed = self.place_verse(&ink, verse);
        self.verses.insert(verse, ink);
        match placed {
            Some(placed) => {
                self.placed.insert(verse, placed);
            }
            None => {
                self.placed.remove(&verse);
            }
        }
    }

    /// Forget one verse's ink without touching the composite.
    pub fn remove_verse(&mut self, verse: VerseNumber) -> Option<VerseInk> {
        self.placed.remove(&verse);
        self.verses.remove(&verse)
    }

    pub fn pending_backfill_count(&self) -> usize {
        self.backfills.len()
    }

    /// Anchors learned for verses whose stored ink had none, since the last call.
    pub fn take_backfills(&mut self) -> Vec<(VerseNumber, f64)> {
        std::mem::take(&mut self.backfills)
    }

    /// Record `offset` as the saved anchor of a verse whose ink has none.
    fn backfill_anchor(&mut self, verse: VerseNumber, offset: f64) {
        let Some(ink) = self.verses.get_mut(&verse) else {
            return;
        };
        if ink.record.base_first_underline_offset.is_none() {
            log::debug!("verse {verse}: backfilling baseline anchor {offset}");
            ink.record.base_first_underline_offset = Some(offset);
            self.backfills.push((verse, offset));
        }
    }

    /// React to a verse's rect moving or resizing.
    pub fn verse_frame_updated(&mut self, verse: VerseNumber, rect: Rect) -> CompositionChange {
        if !rect.is_finite() {
            log::warn!("verse {verse}: ignoring non-finite rect {rect:?}");
            return CompositionChange::Unchanged;
        }
        if let Some(&current) = self.rects.get(&verse) {
            if rects_close(current, rect, self.config.frame_tolerance) {
                return CompositionChange::Unchanged;
            }
        }

        let was_ready = self.can_rebuild();
        let previous = self.rects.insert(verse, rect);
        if !self.verses.contains_key(&verse) || !usable(&rect) {
            return CompositionChange::Unchanged;
        }
        self.relayout(verse, previous, was_ready)
    }

    /// React to a verse's baseline offsets changing. Only the first one is used.
    pub fn verse_underline_offsets_updated(&mut self, verse: VerseNumber, offsets: &[f64]) -> CompositionChange {
        let first = offsets.first().copied().filter(|o| o.is_finite());
        let current = self.offsets.get(&verse).copied();
        let unchanged = match (current, first) {
            (Some(a), Some(b)) => (a - b).abs() <= self.config.frame_tolerance,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return CompositionChange::Unchanged;
        }

        match first {
            Some(offset) => {
                self.offsets.insert(verse, offset);
                self.backfill_anchor(verse, offset);
            }
            None => {
                self.offsets.remove(&verse);
            }
        }

        let was_ready = self.can_rebuild();
        match self.rects.get(&verse).copied() {
            Some(rect) if usable(&rect) && self.verses.contains_key(&verse) => {
                self.relayout(verse, Some(rect), was_ready)
            }
            _ => CompositionChange::Unchanged,
        }
    }

    fn relayout(&mut self, verse: VerseNumber, previous: Option<Rect>, was_ready: bool) -> CompositionChange {
        if self.can_rebuild() && !was_ready {
            self.full_rebuild()
        } else {
            // Ready before and after, or still waiting on other verses.
            self.localized_replace(verse, previous)
        }
    }

    fn place_verse(&self, ink: &VerseInk, verse: VerseNumber) -> Option<Drawing> {
        let rect = self.rects.get(&verse).filter(|r| usable(r))?;
        let offset = self.offsets.get(&verse).copied();
        Some(place(&ink.local, &ink.base(), *rect, offset, &self.config))
    }

    /// Merge every verse's placed ink into a new composite.
    ///
    /// An empty merge leaves the current composite untouched.
    pub fn full_rebuild(&mut self) -> CompositionChange {
        let mut ordered: Vec<(VerseNumber, Rect)> = self.rects.iter().map(|(&v, &r)| (v, r)).collect();
        ordered.sort_by_key(|&(v, _)| v);

        let mut merged = Drawing::new();
        let mut placed = BTreeMap::new();
        for (verse, _) in ordered {
            let Some(ink) = self.verses.get(&verse) else {
                continue;
            };
            let Some(drawing) = self.place_verse(ink, verse) else {
                continue;
            };
            merged.append(drawing.clone());
            placed.insert(verse, drawing);
        }

        if merged.is_empty() {
            log::debug!("full rebuild produced no strokes, keeping current composite");
            return CompositionChange::Unchanged;
        }
        log::debug!("full rebuild: {} stroke(s) from {} verse(s)", merged.len(), placed.len());
        self.combined = merged;
        self.placed = placed;
        self.composed = true;
        CompositionChange::FullRebuild
    }

    /// Swap out one verse's placed ink in the current composite.
    ///
    /// Strokes intersecting the union of the verse's previous and current rect
    /// (extended upward by the top padding) are excised, along with the
    /// verse's previous placement; the fresh placement is appended. Ink of
    /// other verses caught in the excision is restored from their placements.
    pub fn localized_replace(&mut self, verse: VerseNumber, previous: Option<Rect>) -> CompositionChange {
        let Some(rect) = self.rects.get(&verse).copied().filter(usable) else {
            return CompositionChange::Unchanged;
        };
        let Some(ink) = self.verses.get(&verse) else {
            return CompositionChange::Unchanged;
        };
        let fresh = place(&ink.local, &ink.base(), rect, self.offsets.get(&verse).copied(), &self.config);

        let mut region = previous.filter(usable).map_or(rect, |p| p.union(rect)).abs();
        region.y0 -= self.config.top_padding;

        let stale = self.placed.remove(&verse).unwrap_or_default();
        let mut kept = remove_intersecting(&self.combined, region);
        kept.strokes.retain(|s| !stale.strokes.contains(s));

        let removed: Vec<_> = self.combined.strokes.iter().filter(|s| !kept.strokes.contains(s)).collect();
        let removed_bounds = removed.iter().map(|s| s.bounds()).reduce(|a, b| a.union(b));

        if let Some(removed_bounds) = removed_bounds {
            let mut restored = Vec::new();
            for (other, placed) in &self.placed {
                for stroke in clip_strokes_by_bounds(&placed.strokes, removed_bounds) {
                    if !kept.strokes.contains(&stroke) {
                        log::debug!("verse {verse}: restoring collateral stroke of verse {other}");
                        restored.push(stroke);
                    }
                }
            }
            kept.strokes.extend(restored);
        }

        kept.append(fresh.clone());
        self.combined = kept;
        self.placed.insert(verse, fresh);
        self.composed = true;
        CompositionChange::LocalizedReplace { verse }
    }
}
