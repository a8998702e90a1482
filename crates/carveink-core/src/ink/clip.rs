//! Rectangular clipping and filtering of strokes.

use super::{Drawing, InkPoint, Stroke};
use kurbo::{Point, Rect};

/// Test whether two rectangles overlap, counting shared edges.
///
/// Zero-width or zero-height boxes (a perfectly vertical stroke, say) still
/// intersect whatever they touch.
pub fn intersects_inclusive(a: Rect, b: Rect) -> bool {
    let (a, b) = (a.abs(), b.abs());
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Point-in-rect test that includes all four edges.
pub fn contains_inclusive(rect: Rect, point: Point) -> bool {
    let rect = rect.abs();
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}

/// Keep only the strokes whose bounds intersect `rect`.
pub fn clip_strokes_by_bounds(strokes: &[Stroke], rect: Rect) -> Vec<Stroke> {
    strokes
        .iter()
        .filter(|s| intersects_inclusive(s.bounds(), rect))
        .cloned()
        .collect()
}

/// Clip a stroke to the control points that fall inside `rect`.
///
/// Returns `None` when the stroke's bounds miss `rect` or no control point
/// survives. The result keeps the stroke's id, style and transform.
pub fn clip_stroke_precisely(stroke: &Stroke, rect: Rect) -> Option<Stroke> {
    if !rect.is_finite() || !intersects_inclusive(stroke.bounds(), rect) {
        return None;
    }

    let transform = stroke.transform;
    let points: Vec<InkPoint> = stroke
        .points
        .iter()
        .filter(|p| contains_inclusive(rect, transform * p.location))
        .copied()
        .collect();

    if points.is_empty() {
        return None;
    }
    Some(stroke.with_points(points))
}

/// Return the strokes of `drawing` whose bounds do not intersect `rect`.
pub fn remove_intersecting(drawing: &Drawing, rect: Rect) -> Drawing {
    let strokes = drawing
        .strokes
        .iter()
        .filter(|s| !intersects_inclusive(s.bounds(), rect))
        .cloned()
        .collect();
    Drawing { strokes }
}
