//! In-memory drawing store.

use super::{BoxFuture, DrawingStore, StorageError, StorageResult};
use crate::capture::VerseNumber;
use crate::model::{ChapterId, PageDrawing, VerseDrawing, VerseUpdateRequest};
use crate::persistence::ChapterRecords;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    chapters: RwLock<HashMap<ChapterId, ChapterRecords>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing update planning.
    pub fn insert_record(&self, record: VerseDrawing) -> StorageResult<()> {
        let mut chapters = self.write()?;
        chapters.entry(record.chapter.clone()).or_default().verses.push(record);
        Ok(())
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, HashMap<ChapterId, ChapterRecords>>> {
        self.chapters
            .write()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, HashMap<ChapterId, ChapterRecords>>> {
        self.chapters
            .read()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))
    }
}

impl DrawingStore for MemoryStore {
    fn fetch_verse_drawings(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            let chapters = self.read()?;
            Ok(chapters.get(&chapter).map(ChapterRecords::sorted_verses).unwrap_or_default())
        })
    }

    fn fetch_verse_history(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
    ) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            let chapters = self.read()?;
            Ok(chapters.get(&chapter).map(|c| c.verse_history(verse)).unwrap_or_default())
        })
    }

    fn fetch_page_drawing(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Option<PageDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            let chapters = self.read()?;
            Ok(chapters.get(&chapter).and_then(|c| c.page.clone()))
        })
    }

    fn update_drawings(&self, requests: Vec<VerseUpdateRequest>) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut chapters = self.write()?;
            for request in &requests {
                chapters.entry(request.chapter.clone()).or_default().apply_update(request);
            }
            Ok(())
        })
    }

    fn upsert_page_drawing(&self, chapter: &ChapterId, ink: Vec<u8>) -> BoxFuture<'_, StorageResult<()>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            let mut chapters = self.write()?;
            chapters.entry(chapter.clone()).or_default().upsert_page(&chapter, ink);
            Ok(())
        })
    }

    fn select_active_drawing(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
        id: &str,
    ) -> BoxFuture<'_, StorageResult<()>> {
        let chapter = chapter.clone();
        let id = id.to_string();
        Box::pin(async move {
            let mut chapters = self.write()?;
            chapters
                .get_mut(&chapter)
                .ok_or_else(|| StorageError::NotFound(id.clone()))?
                .select_active(verse, &id)
        })
    }

    fn set_base_underline_offset(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
        offset: f64,
    ) -> BoxFuture<'_, StorageResult<()>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            let mut chapters = self.write()?;
            if let Some(records) = chapters.get_mut(&chapter) {
                records.set_base_underline_offset(verse, offset);
            }
            Ok(())
        })
    }
}
