//! Storage abstraction for verse and page drawings.

mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

pub use memory::MemoryStore;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;

use crate::capture::VerseNumber;
use crate::model::{ChapterId, PageDrawing, VerseDrawing, VerseUpdateRequest};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Drawing not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Persistence backend for verse ink and page caches.
///
/// Implementations must serialize writes touching the same chapter; sessions
/// for different chapters may call into one store concurrently.
pub trait DrawingStore: Send + Sync {
    /// All verse records of a chapter, every historical version included,
    /// sorted by verse.
    fn fetch_verse_drawings(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>>;

    /// All historical records of one verse, most recently updated first.
    fn fetch_verse_history(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
    ) -> BoxFuture<'_, StorageResult<Vec<VerseDrawing>>>;

    /// The cached composited page, if any.
    fn fetch_page_drawing(&self, chapter: &ChapterId) -> BoxFuture<'_, StorageResult<Option<PageDrawing>>>;

    /// Write new ink into each verse's active record, inserting a record for
    /// verses that have none.
    fn update_drawings(&self, requests: Vec<VerseUpdateRequest>) -> BoxFuture<'_, StorageResult<()>>;

    /// Replace the chapter's page cache.
    fn upsert_page_drawing(&self, chapter: &ChapterId, ink: Vec<u8>) -> BoxFuture<'_, StorageResult<()>>;

    /// Mark `id` as the presented record of its verse, clearing the flag on
    /// every sibling in the same write.
    fn select_active_drawing(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
        id: &str,
    ) -> BoxFuture<'_, StorageResult<()>>;

    /// Record the first-baseline anchor on the verse's active record if it has none.
    fn set_base_underline_offset(
        &self,
        chapter: &ChapterId,
        verse: VerseNumber,
        offset: f64,
    ) -> BoxFuture<'_, StorageResult<()>>;
}
