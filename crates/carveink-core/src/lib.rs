//! CarveInk Core Library
//!
//! Verse-anchored ink composition for hand-traced scripture pages. Ink drawn
//! across a chapter page is split into per-verse fragments stored in a
//! layout-independent local space, then recomposed into one page drawing
//! whenever the text layout moves.

pub mod capture;
pub mod composer;
pub mod config;
pub mod history;
pub mod ink;
pub mod model;
pub mod persistence;
pub mod placement;
pub mod save;
pub mod session;
pub mod storage;

pub use capture::{VerseNumber, capture_regions};
pub use composer::{Composer, ComposerState, CompositionChange};
pub use config::{ConfigError, EngineConfig};
pub use history::{CommandHistory, InkCommand, VerseChange};
pub use ink::{
    Drawing, InkError, InkPoint, InkStyle, InkTool, Stroke, clip_stroke_precisely, clip_strokes_by_bounds,
    remove_intersecting,
};
pub use model::{ChapterId, PageDrawing, VerseDrawing, VerseUpdateRequest};
pub use persistence::{ChapterLoad, VerseInk, load_chapter, main_drawing};
pub use placement::{BaseMetrics, Placement, compute_placement, place, to_local};
pub use save::{SavePlan, plan_save};
pub use session::{CanvasEvent, ChapterSession};
pub use storage::{DrawingStore, MemoryStore, StorageError, StorageResult};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStore;
