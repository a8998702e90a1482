//! Chapter session: the single owner of one chapter's canvas state.
//!
//! Every mutation takes `&mut self`, so layout events, loads and saves for a
//! chapter are applied one at a time in the order they arrive. Store I/O is
//! awaited inside those calls; in-memory state is only touched on our side of
//! each await.

use crate::capture::VerseNumber;
use crate::composer::{Composer, ComposerState, CompositionChange};
use crate::config::EngineConfig;
use crate::history::{CommandHistory, InkCommand, VerseChange};
use crate::ink::Drawing;
use crate::model::{ChapterId, VerseDrawing, VerseUpdateRequest, now_epoch_seconds};
use crate::persistence::{ChapterLoad, VerseInk, load_chapter};
use crate::save::plan_save;
use crate::storage::{DrawingStore, StorageError, StorageResult};
use kurbo::Rect;
use std::sync::Arc;

/// Events that drive composition, one per layout or data change.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// Freshly fetched verse ink.
    SetDrawings(Vec<VerseInk>),
    /// Cached page drawing, shown until layout is known.
    SetPageDrawing(Drawing),
    VerseFrameUpdated { verse: VerseNumber, rect: Rect },
    /// Baseline offsets of a verse's lines; only the first is used.
    VerseUnderlineOffsetsUpdated { verse: VerseNumber, offsets: Vec<f64> },
}

type Listener = Box<dyn FnMut(&Drawing) + Send>;

/// Composition engine for one chapter page.
pub struct ChapterSession<S: DrawingStore> {
    chapter: ChapterId,
    store: Arc<S>,
    composer: Composer,
    history: CommandHistory,
    listeners: Vec<Listener>,
    /// Anchors learned but not yet written to the store.
    pending_backfills: Vec<(VerseNumber, f64)>,
}

impl<S: DrawingStore> ChapterSession<S> {
    pub fn new(chapter: ChapterId, store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            chapter,
            store,
            history: CommandHistory::new(config.max_undo_history),
            composer: Composer::new(config),
            listeners: Vec::new(),
            pending_backfills: Vec::new(),
        }
    }

    pub fn chapter(&self) -> &ChapterId {
        &self.chapter
    }

    pub fn config(&self) -> &EngineConfig {
        self.composer.config()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn state(&self) -> ComposerState {
        self.composer.state()
    }

    /// The drawing the ink surface should render.
    pub fn current_composited_drawing(&self) -> &Drawing {
        self.composer.combined()
    }

    /// Call `listener` with the new composite whenever it changes.
    pub fn subscribe(&mut self, listener: impl FnMut(&Drawing) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self) {
        let drawing = self.composer.combined();
        for listener in &mut self.listeners {
            listener(drawing);
        }
    }

    fn notify_if(&mut self, change: CompositionChange) -> CompositionChange {
        if change.is_changed() {
            self.notify();
        }
        change
    }

    /// Apply one event.
    pub fn apply(&mut self, event: CanvasEvent) -> CompositionChange {
        let change = match event {
            CanvasEvent::SetDrawings(drawings) => self.composer.set_drawings(drawings),
            CanvasEvent::SetPageDrawing(drawing) => self.composer.set_page_drawing(drawing),
            CanvasEvent::VerseFrameUpdated { verse, rect } => self.composer.verse_frame_updated(verse, rect),
            CanvasEvent::VerseUnderlineOffsetsUpdated { verse, offsets } => {
                self.composer.verse_underline_offsets_updated(verse, &offsets)
            }
        };
        self.notify_if(change)
    }

    /// Text layout entry point: a verse's rect.
    pub fn report_verse_rect(&mut self, verse: VerseNumber, rect: Rect) -> CompositionChange {
        self.apply(CanvasEvent::VerseFrameUpdated { verse, rect })
    }

    /// Text layout entry point: a verse's first baseline offset, if it has one.
    pub fn report_first_baseline_offset(&mut self, verse: VerseNumber, offset: Option<f64>) -> CompositionChange {
        self.apply(CanvasEvent::VerseUnderlineOffsetsUpdated {
            verse,
            offsets: offset.into_iter().collect(),
        })
    }

    /// Force a full rebuild from the current verse ink and layout.
    pub fn rebuild(&mut self) -> CompositionChange {
        let change = self.composer.full_rebuild();
        self.notify_if(change)
    }

    /// Fetch the current chapter. The result is applied with [`Self::apply_load`].
    pub async fn load(&self) -> ChapterLoad {
        load_chapter(self.store.as_ref(), &self.chapter).await
    }

    /// Apply a finished load. Loads for another chapter are discarded.
    pub fn apply_load(&mut self, load: ChapterLoad) -> bool {
        if load.chapter != self.chapter {
            log::warn!("discarding stale load for {} (now showing {})", load.chapter, self.chapter);
            return false;
        }
        if let Some(page) = load.page {
            self.apply(CanvasEvent::SetPageDrawing(page));
        }
        self.apply(CanvasEvent::SetDrawings(load.verses));
        true
    }

    /// Load the current chapter and apply it.
    pub async fn reload(&mut self) -> bool {
        let load = self.load().await;
        self.apply_load(load)
    }

    /// Switch to another chapter, dropping all layout, ink and history.
    pub fn change_chapter(&mut self, chapter: ChapterId) {
        log::info!("session: {} -> {}", self.chapter, chapter);
        self.chapter = chapter;
        self.composer = Composer::new(self.composer.config().clone());
        self.history.clear();
        self.pending_backfills.clear();
        self.notify();
    }

    /// Persist a completed gesture.
    ///
    /// `drawing` becomes the composite immediately. Each verse whose capture
    /// region touches `changed_region` gets its clipped fragment written back,
    /// and the page cache is replaced. Returns the number of verses updated.
    /// Store errors are returned after the in-memory state has been updated.
    pub async fn save_drawing(&mut self, drawing: Drawing, changed_region: Rect) -> StorageResult<usize> {
        let composer = &self.composer;
        let plan = plan_save(
            &self.chapter,
            &drawing,
            changed_region,
            composer.rects(),
            composer.offsets(),
            |verse| composer.verse(verse).map(|ink| ink.record.clone()),
            composer.config(),
            now_epoch_seconds(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let composite_before = self.composer.combined().clone();
        self.composer.set_combined(drawing.clone());

        let mut changes = Vec::with_capacity(plan.verses.len());
        for ink in plan.verses {
            let verse = ink.verse();
            let before = self.composer.verse(verse).cloned();
            self.composer.upsert_verse(ink.clone());
            changes.push(VerseChange {
                verse,
                before,
                after: ink,
            });
        }
        if composite_before != drawing || !changes.is_empty() {
            self.history.push(InkCommand {
                composite_before,
                composite_after: drawing,
                verses: changes,
            });
        }
        self.notify();

        let count = plan.requests.len();
        if !plan.requests.is_empty() {
            self.store.update_drawings(plan.requests).await?;
        }
        self.store.upsert_page_drawing(&self.chapter, plan.page_ink).await?;
        log::info!("saved {}: {} verse(s) updated", self.chapter, count);
        Ok(count)
    }

    /// Ink surface entry point for a finished stroke gesture.
    pub async fn stroke_gesture_completed(&mut self, drawing: Drawing, changed_region: Rect) -> StorageResult<usize> {
        self.save_drawing(drawing, changed_region).await
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Revert the last saved gesture, in memory and in the store.
    pub async fn undo(&mut self) -> StorageResult<bool> {
        let Some(command) = self.history.undo() else {
            return Ok(false);
        };
        let now = now_epoch_seconds();
        let requests = command
            .verses
            .iter()
            .map(|change| change.undo_request(now))
            .collect::<StorageResult<Vec<_>>>()?;

        for change in &command.verses {
            match &change.before {
                Some(before) => self.composer.upsert_verse(before.clone()),
                None => {
                    self.composer.remove_verse(change.verse);
                }
            }
        }
        self.restore_composite(command.composite_before, requests).await?;
        Ok(true)
    }

    /// Re-apply the last undone gesture.
    pub async fn redo(&mut self) -> StorageResult<bool> {
        let Some(command) = self.history.redo() else {
            return Ok(false);
        };
        let now = now_epoch_seconds();
        let requests = command
            .verses
            .iter()
            .map(|change| change.redo_request(now))
            .collect::<StorageResult<Vec<_>>>()?;

        for change in &command.verses {
            self.composer.upsert_verse(change.after.clone());
        }
        self.restore_composite(command.composite_after, requests).await?;
        Ok(true)
    }

    async fn restore_composite(
        &mut self,
        composite: Drawing,
        requests: Vec<VerseUpdateRequest>,
    ) -> StorageResult<()> {
        let page_ink = composite
            .to_bytes()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.composer.set_combined(composite);
        self.notify();

        if !requests.is_empty() {
            self.store.update_drawings(requests).await?;
        }
        self.store.upsert_page_drawing(&self.chapter, page_ink).await
    }

    /// All stored versions of one verse, newest first.
    pub async fn verse_history(&self, verse: VerseNumber) -> StorageResult<Vec<VerseDrawing>> {
        self.store.fetch_verse_history(&self.chapter, verse).await
    }

    /// Continue from another stored version of a verse.
    ///
    /// The flag flip is persisted, then the chapter is refetched and
    /// recomposed. Undo history is dropped since it refers to the old ink.
    pub async fn select_active_drawing(&mut self, verse: VerseNumber, id: &str) -> StorageResult<()> {
        self.store.select_active_drawing(&self.chapter, verse, id).await?;
        log::info!("verse {verse}: presenting {id}");
        self.history.clear();
        self.reload().await;
        Ok(())
    }

    /// Number of learned anchors not yet written to the store.
    pub fn pending_backfill_count(&self) -> usize {
        self.pending_backfills.len() + self.composer.pending_backfill_count()
    }

    /// Write learned baseline anchors into the store. Returns how many were
    /// written; on error the unwritten ones stay queued.
    pub async fn persist_anchor_backfills(&mut self) -> StorageResult<usize> {
        self.pending_backfills.extend(self.composer.take_backfills());
        let pending = std::mem::take(&mut self.pending_backfills);

        for (i, &(verse, offset)) in pending.iter().enumerate() {
            if let Err(e) = self.store.set_base_underline_offset(&self.chapter, verse, offset).await {
                log::error!("backfilling anchor for verse {verse} failed: {e}");
                self.pending_backfills.extend_from_slice(&pending[i..]);
                return Err(e);
            }
        }
        Ok(pending.len())
    }
}
