//! Pen strokes.

use super::InkStyle;
use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the pen stroke a stroke was drawn as. Clipped fragments
/// keep their source stroke's id, so one drawing may hold several strokes
/// with the same id.
pub type StrokeId = Uuid;

/// A single sampled control point of a stroke, in stroke-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkPoint {
    /// Location in stroke-local coordinates.
    pub location: Point,
    /// Seconds since the start of the stroke.
    #[serde(default)]
    pub time_offset: f64,
    /// Pen force (1.0 = nominal).
    #[serde(default = "default_force")]
    pub force: f64,
    /// Nib size at this sample.
    #[serde(default = "default_size")]
    pub size: f64,
}

fn default_force() -> f64 {
    1.0
}

fn default_size() -> f64 {
    1.0
}

impl InkPoint {
    /// Create a point with nominal force and size.
    pub fn new(location: Point) -> Self {
        Self {
            location,
            time_offset: 0.0,
            force: default_force(),
            size: default_size(),
        }
    }

    /// Create a point sampled at `time_offset` seconds into the stroke.
    pub fn at(location: Point, time_offset: f64) -> Self {
        Self {
            time_offset,
            ..Self::new(location)
        }
    }

    fn is_finite(&self) -> bool {
        self.location.is_finite()
            && self.time_offset.is_finite()
            && self.force.is_finite()
            && self.size.is_finite()
    }
}

/// One pen stroke: a polyline of control points, an ink style, and the
/// transform mapping its local coordinates onto the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub(crate) id: StrokeId,
    /// Control points in stroke-local coordinates.
    pub points: Vec<InkPoint>,
    /// Ink properties.
    pub style: InkStyle,
    /// Local-to-canvas transform.
    #[serde(default = "identity")]
    pub transform: Affine,
}

fn identity() -> Affine {
    Affine::IDENTITY
}

impl Stroke {
    /// Create a stroke from canvas-space locations with an identity transform.
    pub fn from_locations(locations: impl IntoIterator<Item = Point>, style: InkStyle) -> Self {
        let points = locations
            .into_iter()
            .enumerate()
            .map(|(i, p)| InkPoint::at(p, i as f64 * 0.01))
            .collect();
        Self::from_points(points, style)
    }

    /// Create a stroke from sampled points.
    pub fn from_points(points: Vec<InkPoint>, style: InkStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            style,
            transform: Affine::IDENTITY,
        }
    }

    /// Rebuild this stroke around a different set of control points, keeping
    /// identity, style and transform.
    pub fn with_points(&self, points: Vec<InkPoint>) -> Self {
        Self {
            id: self.id,
            points,
            style: self.style.clone(),
            transform: self.transform,
        }
    }

    pub fn id(&self) -> StrokeId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Control point locations mapped onto the canvas.
    pub fn canvas_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().map(move |p| self.transform * p.location)
    }

    /// Bounding box of the transformed control points.
    pub fn path_bounds(&self) -> Rect {
        let mut points = self.canvas_points();
        let Some(first) = points.next() else {
            return Rect::ZERO;
        };
        points.fold(Rect::from_points(first, first), |r, p| r.union_pt(p))
    }

    /// Canvas-space bounds including half the nib width.
    pub fn bounds(&self) -> Rect {
        if self.points.is_empty() {
            return Rect::ZERO;
        }
        let half = (self.style.width / 2.0).max(0.0);
        self.path_bounds().inflate(half, half)
    }

    /// Apply a transform on top of the current one.
    pub fn transform(&mut self, affine: Affine) {
        self.transform = affine * self.transform;
    }

    /// Check that every coordinate and the transform are finite.
    pub fn is_finite(&self) -> bool {
        self.transform.is_finite()
            && self.style.width.is_finite()
            && self.points.iter().all(InkPoint::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_bounds() {
        let stroke = Stroke::from_locations(
            [Point::new(0.0, 0.0), Point::new(100.0, 50.0), Point::new(50.0, 100.0)],
            InkStyle::default(),
        );

        let bounds = stroke.path_bounds();
        assert!((bounds.x0).abs() < f64::EPSILON);
        assert!((bounds.y0).abs() < f64::EPSILON);
        assert!((bounds.x1 - 100.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_bounds_include_width() {
        let mut style = InkStyle::default();
        style.width = 4.0;
        let stroke = Stroke::from_locations([Point::new(10.0, 10.0), Point::new(20.0, 10.0)], style);

        let bounds = stroke.bounds();
        assert!((bounds.y0 - 8.0).abs() < 1e-9);
        assert!((bounds.y1 - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_composes() {
        let mut stroke = Stroke::from_locations([Point::new(1.0, 1.0)], InkStyle::default());
        stroke.transform(Affine::scale(2.0));
        stroke.transform(Affine::translate((10.0, 0.0)));

        let p = stroke.canvas_points().next().unwrap();
        assert!((p.x - 12.0).abs() < 1e-9);
        assert!((p.y - 2.0).abs() < 1e-9);
        // Local points are untouched.
        assert_eq!(stroke.points[0].location, Point::new(1.0, 1.0));
    }

    #[test]
    fn test_empty_stroke_bounds() {
        let stroke = Stroke::from_points(Vec::new(), InkStyle::default());
        assert_eq!(stroke.bounds(), Rect::ZERO);
    }

    #[test]
    fn test_non_finite_detected() {
        let stroke = Stroke::from_locations([Point::new(f64::NAN, 0.0)], InkStyle::default());
        assert!(!stroke.is_finite());
    }
}
