//! Ink model: strokes, their style, and whole drawings.
//!
//! A [`Drawing`] is the unit every other module works with. Verse fragments
//! are stored as drawings in verse-local coordinates; the page composite is a
//! drawing in canvas coordinates. Drawings round-trip through an opaque byte
//! blob (see [`Drawing::to_bytes`]) for persistence.

mod clip;
mod stroke;

pub use clip::{
    clip_stroke_precisely, clip_strokes_by_bounds, contains_inclusive, intersects_inclusive,
    remove_intersecting,
};
pub use stroke::{InkPoint, Stroke, StrokeId};

use kurbo::{Affine, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version tag written into every ink blob.
pub const INK_FORMAT_VERSION: u32 = 1;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Nib the stroke was drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InkTool {
    #[default]
    Pen,
    Pencil,
    Marker,
    Monoline,
}

/// Ink properties carried unchanged through clipping and placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InkStyle {
    pub tool: InkTool,
    pub color: SerializableColor,
    /// Nominal nib width.
    pub width: f64,
}

impl InkStyle {
    pub fn new(tool: InkTool, color: Color, width: f64) -> Self {
        Self {
            tool,
            color: color.into(),
            width,
        }
    }

    /// Get the ink color as a peniko Color.
    pub fn color(&self) -> Color {
        self.color.into()
    }
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            tool: InkTool::default(),
            color: SerializableColor::black(),
            width: 2.0,
        }
    }
}

/// Ink blob codec errors.
#[derive(Debug, Error)]
pub enum InkError {
    #[error("Ink blob is empty")]
    Empty,
    #[error("Malformed ink blob: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported ink format version {0}")]
    UnsupportedFormat(u32),
    #[error("Ink contains non-finite geometry")]
    NonFinite,
}

/// On-disk envelope for a drawing.
#[derive(Serialize, Deserialize)]
struct InkBlob<S> {
    format: u32,
    strokes: S,
}

/// An ordered collection of strokes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    pub strokes: Vec<Stroke>,
}

impl Drawing {
    /// Create an empty drawing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_strokes(strokes: Vec<Stroke>) -> Self {
        Self { strokes }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Number of strokes.
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Union of all stroke bounds, or `None` for an empty drawing.
    pub fn bounds(&self) -> Option<Rect> {
        self.strokes
            .iter()
            .map(Stroke::bounds)
            .reduce(|acc, r| acc.union(r))
    }

    /// Union of the transformed control points of all strokes.
    pub fn path_bounds(&self) -> Option<Rect> {
        self.strokes
            .iter()
            .filter(|s| !s.is_empty())
            .map(Stroke::path_bounds)
            .reduce(|acc, r| acc.union(r))
    }

    /// Append all strokes of `other` on top of this drawing.
    pub fn append(&mut self, other: Drawing) {
        self.strokes.extend(other.strokes);
    }

    /// Return a copy with `affine` applied on top of every stroke transform.
    ///
    /// Strokes that would end up with non-finite geometry are dropped.
    pub fn transformed(&self, affine: Affine) -> Drawing {
        if !affine.is_finite() {
            return Drawing::new();
        }
        let strokes = self
            .strokes
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.transform(affine);
                s
            })
            .filter(|s| s.is_finite() && s.path_bounds().is_finite())
            .collect();
        Drawing { strokes }
    }

    /// Keep only the parts of strokes whose control points lie inside `rect`.
    pub fn clipped_precisely(&self, rect: Rect) -> Drawing {
        let strokes = self
            .strokes
            .iter()
            .filter_map(|s| clip_stroke_precisely(s, rect))
            .collect();
        Drawing { strokes }
    }

    /// Encode as a persisted ink blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, InkError> {
        if !self.strokes.iter().all(Stroke::is_finite) {
            return Err(InkError::NonFinite);
        }
        let blob = InkBlob {
            format: INK_FORMAT_VERSION,
            strokes: &self.strokes,
        };
        Ok(serde_json::to_vec(&blob)?)
    }

    /// Decode a persisted ink blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Drawing, InkError> {
        if bytes.is_empty() {
            return Err(InkError::Empty);
        }
        let blob: InkBlob<Vec<Stroke>> = serde_json::from_slice(bytes)?;
        if blob.format != INK_FORMAT_VERSION {
            return Err(InkError::UnsupportedFormat(blob.format));
        }
        if !blob.strokes.iter().all(Stroke::is_finite) {
            return Err(InkError::NonFinite);
        }
        Ok(Drawing {
            strokes: blob.strokes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn line(from: (f64, f64), to: (f64, f64)) -> Stroke {
        Stroke::from_locations([Point::new(from.0, from.1), Point::new(to.0, to.1)], InkStyle::default())
    }

    #[test]
    fn test_blob_roundtrip_preserves_strokes() {
        let mut stroke = line((0.0, 0.0), (10.0, 5.0));
        stroke.transform(Affine::translate((3.0, 4.0)));
        let drawing = Drawing::from_strokes(vec![stroke]);

        let bytes = drawing.to_bytes().unwrap();
        let decoded = Drawing::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, drawing);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Drawing::from_bytes(b""), Err(InkError::Empty)));
        assert!(matches!(Drawing::from_bytes(b"not ink"), Err(InkError::Malformed(_))));
        assert!(matches!(
            Drawing::from_bytes(br#"{"format":7,"strokes":[]}"#),
            Err(InkError::UnsupportedFormat(7))
        ));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let drawing = Drawing::from_strokes(vec![line((0.0, f64::INFINITY), (1.0, 1.0))]);
        assert!(matches!(drawing.to_bytes(), Err(InkError::NonFinite)));
    }

    #[test]
    fn test_transformed_drops_non_finite() {
        let drawing = Drawing::from_strokes(vec![line((0.0, 0.0), (1.0, 1.0))]);
        assert!(drawing.transformed(Affine::scale(f64::NAN)).is_empty());
        assert_eq!(drawing.transformed(Affine::translate((1.0, 1.0))).len(), 1);
    }

    #[test]
    fn test_bounds_union() {
        let drawing = Drawing::from_strokes(vec![line((0.0, 0.0), (10.0, 0.0)), line((5.0, 20.0), (5.0, 30.0))]);
        let bounds = drawing.path_bounds().unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 10.0, 30.0));
        assert!(Drawing::new().bounds().is_none());
    }

    #[test]
    fn test_color_conversion() {
        let style = InkStyle::new(InkTool::Marker, Color::from_rgba8(10, 20, 30, 255), 3.0);
        assert_eq!(style.color, SerializableColor::new(10, 20, 30, 255));
        assert_eq!(style.color().to_rgba8().g, 20);
    }
}
