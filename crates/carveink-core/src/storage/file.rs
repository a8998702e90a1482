//! File-based drawing store for native platforms.

use super::{BoxFuture, DrawingStore, StorageError, StorageResult};
use crate::capture::VerseNumber;
use crate::model::{ChapterId, PageDrawing, VerseDrawing, VerseUpdateRequest};
use crate::persistence::ChapterRecords;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// File-based storage for native platforms.
///
/// Each chapter lives in one JSON file holding every verse record and the
/// page cache. Writes go through a single lock so read-modify-write cycles on
/// the same chapter file never interleave.
pub struct FileStore {
    /// Base directory for chapter files.
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a new file store with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/carveink/drawings/`
    /// On Windows: `%LOCALAPPDATA%\carveink\drawings\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("carveink").join("drawings"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Get the file path for a chapter.
    fn chapter_path(&self, chapter: &ChapterId) -> PathBuf {
        // Sanitize to be safe for filenames
        let safe_book: String = chapter
            .book
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.{}.json", safe_book, chapter.chapter))
    }

    fn read_chapter(&self, chapter: &ChapterId) -> StorageResult<ChapterRecords> {
        let path = self.chapter_path(chapter);
        if !path.exists() {
            return Ok(ChapterRecords::default());
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| {
            StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    fn write_chapter(&self, chapter: &ChapterId, records: &ChapterRecords) -> StorageResult<()> {
        let path = self.chapter_path(chapter);
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(&path, json)
            .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Read a chapter, apply `f`, and write it back under the write lock.
    fn modify_chapter<T>(
        &self,
        chapter: &ChapterId,
        f: impl FnOnce(&mut ChapterRecords) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Other(format!("Lock error: {}", e)))?;
        let mut records = self.read_chapter(chapter)?;
        let result = f(&mut records)?;
        self.write_chapter(chapter, &records)?;
        Ok(result)
    }
}

impl DrawingStore for FileStore {
    fn fetch_verse_drawings(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move { Ok(self.read_chapter(&chapter)?.sorted_verses()) })
    }

    fn fetch_verse_history(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
    ) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move { Ok(self.read_chapter(&chapter)?.verse_history(verse)) })
    }

    fn fetch_page_drawing(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Option<PageDrawing>>> {
        let chapter = chapter.clone();
        Box::pin(async move { Ok(self.read_chapter(&chapter)?.page) })
    }

    fn update_drawings(&self, requests: Vec<VerseUpdateRequest>) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut chapters: Vec<ChapterId> = requests.iter().map(|r| r.chapter.clone()).collect();
            chapters.sort();
            chapters.dedup();

            for chapter in chapters {
                self.modify_chapter(&chapter, |records| {
                    for request in requests.iter().filter(|r| r.chapter == chapter) {
                        records.apply_update(request);
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })
    }

    fn upsert_page_drawing(&self, chapter: &ChapterId, ink: Vec<u8>) -> BoxFuture<'_, StorageResult<()>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            self.modify_chapter(&chapter, |records| {
                records.upsert_page(&chapter, ink);
                Ok(())
            })
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
        Box::pin(async move { self.modify_chapter(&chapter, |records| records.select_active(verse, &id)) })
    }

    fn set_base_underline_offset(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
        offset: f64,
    ) -> BoxFuture<'_, StorageResult<()>> {
        let chapter = chapter.clone();
        Box::pin(async move {
            self.modify_chapter(&chapter, |records| {
                records.set_base_underline_offset(verse, offset);
                Ok(())
            })
        })
    }
}
