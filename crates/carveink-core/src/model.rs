//! Persisted drawing records.

use crate::capture::VerseNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of one chapter page: a book and a chapter number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChapterId {
    pub book: String,
    pub chapter: u32,
}

impl ChapterId {
    pub fn new(book: impl Into<String>, chapter: u32) -> Self {
        Self {
            book: book.into(),
            chapter,
        }
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.book, self.chapter)
    }
}

/// Seconds since the Unix epoch.
pub fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Composite record id: `"<book>.<chapter>.<verse>.<creationEpochSeconds>"`.
pub fn verse_drawing_id(chapter: &ChapterId, verse: VerseNumber, created_at: i64) -> String {
    format!("{}.{}.{}", chapter, verse, created_at)
}

/// One historical ink record for a verse.
///
/// `ink` holds strokes in verse-local coordinates; the `base_*` fields record
/// the layout they were captured under so placement can rescale them later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseDrawing {
    pub id: String,
    pub chapter: ChapterId,
    pub verse: VerseNumber,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(with = "base64_blob")]
    pub ink: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_first_underline_offset: Option<f64>,
    /// Marks the record shown on the canvas among a verse's history.
    #[serde(default)]
    pub is_presented: bool,
}

impl VerseDrawing {
    /// Create a fresh record stamped with the given creation time.
    pub fn new(chapter: ChapterId, verse: VerseNumber, ink: Vec<u8>, created_at: i64) -> Self {
        Self {
            id: verse_drawing_id(&chapter, verse, created_at),
            chapter,
            verse,
            created_at,
            updated_at: created_at,
            ink,
            base_width: None,
            base_height: None,
            base_first_underline_offset: None,
            is_presented: false,
        }
    }
}

/// Last known composited page, used only to avoid a blank first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDrawing {
    pub chapter: ChapterId,
    #[serde(with = "base64_blob")]
    pub ink: Vec<u8>,
    pub updated_at: i64,
}

impl PageDrawing {
    /// Page records are keyed by the chapter alone.
    pub fn id(&self) -> String {
        self.chapter.to_string()
    }
}

/// New local ink for one verse, produced by the save pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VerseUpdateRequest {
    pub chapter: ChapterId,
    pub verse: VerseNumber,
    pub ink: Vec<u8>,
    pub base_width: Option<f64>,
    pub base_height: Option<f64>,
    pub base_first_underline_offset: Option<f64>,
    pub updated_at: i64,
    /// Write the base fields as given, `None` included. Otherwise a `None`
    /// field leaves the stored value alone.
    pub replace_base: bool,
}

mod base64_blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verse_id_format() {
        let chapter = ChapterId::new("genesis", 1);
        let drawing = VerseDrawing::new(chapter, 3, Vec::new(), 1_700_000_000);
        assert_eq!(drawing.id, "genesis.1.3.1700000000");
    }

    #[test]
    fn test_blob_serialized_as_base64() {
        let mut drawing = VerseDrawing::new(ChapterId::new("john", 3), 16, vec![1, 2, 3], 10);
        drawing.base_width = Some(320.0);

        let json = serde_json::to_string(&drawing).unwrap();
        assert!(json.contains("\"ink\":\"AQID\""));
        assert!(!json.contains("base_height"));

        let back: VerseDrawing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, drawing);
    }

    #[test]
    fn test_page_id_is_chapter() {
        let page = PageDrawing {
            chapter: ChapterId::new("psalms", 23),
            ink: Vec::new(),
            updated_at: 0,
        };
        assert_eq!(page.id(), "psalms.23");
    }
}
