//! Placement: mapping verse-local ink onto the current page layout.
//!
//! Verse ink is stored relative to a *local origin* at the verse rect's left
//! edge, `top_padding` above its top edge. In local space the verse rect's top
//! sits at `y = top_padding` and its first baseline at
//! `y = top_padding + first_underline_offset`.
//!
//! When the layout changes, ink is rescaled about a pivot at
//! `(horizontal_inset, anchor)` where `anchor` is the first baseline when it is
//! known both at save time and now, or the rect top otherwise. Horizontal
//! scale follows the text column width. Vertical scale only ever shrinks ink so
//! it stays inside the space below the anchor.

use crate::config::EngineConfig;
use crate::ink::Drawing;
use crate::model::VerseDrawing;
use kurbo::{Affine, Rect, Vec2};

/// Layout of a verse at the time its ink was saved.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseMetrics {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub first_underline_offset: Option<f64>,
}

impl From<&VerseDrawing> for BaseMetrics {
    fn from(drawing: &VerseDrawing) -> Self {
        Self {
            width: drawing.base_width,
            height: drawing.base_height,
            first_underline_offset: drawing.base_first_underline_offset,
        }
    }
}

/// A computed placement for one verse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Local-to-canvas transform.
    pub transform: Affine,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Whether the baseline anchor was used for the vertical pivot.
    pub anchored: bool,
}

/// Canvas position of the local origin for a verse rect.
pub fn local_origin(rect: Rect, config: &EngineConfig) -> Vec2 {
    Vec2::new(rect.x0, rect.y0 - config.top_padding)
}

/// Clamp a scale factor to a finite, non-negative value.
fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() { scale.max(0.0) } else { 1.0 }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Compute where `local` ink goes inside `rect`.
///
/// Returns `None` for a non-finite or empty rect, or empty ink.
pub fn compute_placement(
    local: &Drawing,
    base: &BaseMetrics,
    rect: Rect,
    current_offset: Option<f64>,
    config: &EngineConfig,
) -> Option<Placement> {
    let rect = rect.abs();
    if !rect.is_finite() || rect.area() <= 0.0 {
        return None;
    }
    let bounds = local.path_bounds()?;
    let inset = config.horizontal_inset;
    let pad = config.top_padding;

    let content_width = rect.width() - 2.0 * inset;
    let scale_x = match finite(base.width) {
        Some(base_width) if content_width > 0.0 => content_width / (base_width - 2.0 * inset).max(1.0),
        // Unknown base width: never enlarge, only shrink ink that overflows the column.
        _ => {
            let extent = bounds.x1 - inset;
            if extent > 0.0 && extent > content_width {
                (content_width / extent).min(1.0)
            } else {
                1.0
            }
        }
    };

    let (anchor_from, anchor_to, scale_y, anchored) =
        match (finite(base.first_underline_offset), finite(current_offset)) {
            (Some(from), Some(to)) => {
                let anchor_from = pad + from;
                let anchor_to = pad + to;
                let available = rect.height() + pad - anchor_to;
                let reference = match finite(base.height) {
                    Some(base_height) => base_height + pad - anchor_from,
                    None => bounds.y1 - anchor_from,
                };
                let scale_y = if reference > 0.0 {
                    (available / reference).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                (anchor_from, anchor_to, scale_y, true)
            }
            _ => {
                let scale_y = match finite(base.height) {
                    Some(base_height) if base_height > 0.0 => (rect.height() / base_height).min(1.0),
                    _ => 1.0,
                };
                (pad, pad, scale_y, false)
            }
        };

    let scale_x = sanitize_scale(scale_x);
    let scale_y = sanitize_scale(scale_y);
    let origin = local_origin(rect, config);
    let transform = Affine::translate(origin + Vec2::new(inset, anchor_to))
        * Affine::scale_non_uniform(scale_x, scale_y)
        * Affine::translate((-inset, -anchor_from));

    Some(Placement {
        transform,
        scale_x,
        scale_y,
        anchored,
    })
}

/// Place verse-local ink into canvas coordinates for the current layout.
///
/// Degenerate input yields an empty drawing.
pub fn place(
    local: &Drawing,
    base: &BaseMetrics,
    rect: Rect,
    current_offset: Option<f64>,
    config: &EngineConfig,
) -> Drawing {
    match compute_placement(local, base, rect, current_offset, config) {
        Some(placement) => local.transformed(placement.transform),
        None => Drawing::new(),
    }
}

/// Convert canvas ink captured for a verse into that verse's local space.
pub fn to_local(canvas: &Drawing, rect: Rect, config: &EngineConfig) -> Drawing {
    canvas.transformed(Affine::translate(-local_origin(rect.abs(), config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::{InkStyle, Stroke};
    use kurbo::Point;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn drawing(points: &[(f64, f64)]) -> Drawing {
        Drawing::from_strokes(vec![Stroke::from_locations(
            points.iter().map(|&(x, y)| Point::new(x, y)),
            InkStyle::default(),
        )])
    }

    fn assert_rect_close(a: Rect, b: Rect) {
        for (x, y) in [(a.x0, b.x0), (a.y0, b.y0), (a.x1, b.x1), (a.y1, b.y1)] {
            assert!((x - y).abs() < 0.01, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_same_layout_roundtrips() {
        let config = config();
        let rect = Rect::new(16.0, 120.0, 336.0, 168.0);
        let canvas = drawing(&[(40.0, 130.0), (120.0, 150.0), (200.0, 160.0)]);
        let base = BaseMetrics {
            width: Some(rect.width()),
            height: Some(rect.height()),
            first_underline_offset: Some(30.0),
        };

        let local = to_local(&canvas, rect, &config);
        let placed = place(&local, &base, rect, Some(30.0), &config);
        assert_rect_close(placed.path_bounds().unwrap(), canvas.path_bounds().unwrap());
    }

    #[test]
    fn test_follows_rect_translation() {
        let config = config();
        let local = drawing(&[(10.0, 20.0), (50.0, 30.0)]);
        let base = BaseMetrics {
            width: Some(200.0),
            height: Some(40.0),
            first_underline_offset: None,
        };

        let placed = place(&local, &base, Rect::new(0.0, 500.0, 200.0, 540.0), None, &config);
        let bounds = placed.path_bounds().unwrap();
        assert_rect_close(bounds, Rect::new(10.0, 512.0, 50.0, 522.0));
    }

    #[test]
    fn test_known_base_width_allows_enlarging() {
        let config = config();
        let local = drawing(&[(4.0, 10.0), (104.0, 10.0)]);
        let base = BaseMetrics {
            width: Some(108.0),
            ..Default::default()
        };

        let placement = compute_placement(&local, &base, Rect::new(0.0, 0.0, 208.0, 40.0), None, &config).unwrap();
        assert!((placement.scale_x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_base_width_never_enlarges() {
        let config = config();
        let local = drawing(&[(4.0, 10.0), (104.0, 10.0)]);
        let ink_width = 104.0;

        let placement = compute_placement(
            &local,
            &BaseMetrics::default(),
            Rect::new(0.0, 0.0, ink_width * 2.0, 40.0),
            None,
            &config,
        )
        .unwrap();
        assert!(placement.scale_x <= 1.0);

        let placed = place(&local, &BaseMetrics::default(), Rect::new(0.0, 0.0, ink_width * 2.0, 40.0), None, &config);
        let bounds = placed.path_bounds().unwrap();
        assert!((bounds.width() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_base_width_shrinks_overflow() {
        let config = config();
        let local = drawing(&[(4.0, 10.0), (204.0, 10.0)]);

        let placement =
            compute_placement(&local, &BaseMetrics::default(), Rect::new(0.0, 0.0, 108.0, 40.0), None, &config).unwrap();
        assert!((placement.scale_x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_anchor_tracks_reflow() {
        let config = config();
        // Saved with the baseline 20 below the rect top; a stroke sits right on it.
        let local = drawing(&[(20.0, 28.0), (80.0, 28.0)]);
        let base = BaseMetrics {
            width: Some(200.0),
            height: Some(40.0),
            first_underline_offset: Some(20.0),
        };

        // Larger font: the baseline moves to 32 below the top of a taller rect.
        let rect = Rect::new(0.0, 100.0, 200.0, 160.0);
        let placed = place(&local, &base, rect, Some(32.0), &config);
        let bounds = placed.path_bounds().unwrap();
        assert!((bounds.y0 - 132.0).abs() < 1e-9);
    }

    #[test]
    fn test_vertical_scale_never_enlarges() {
        let config = config();
        let local = drawing(&[(20.0, 28.0), (20.0, 48.0)]);
        let base = BaseMetrics {
            width: Some(200.0),
            height: Some(40.0),
            first_underline_offset: Some(20.0),
        };

        let tall = compute_placement(&local, &base, Rect::new(0.0, 0.0, 200.0, 400.0), Some(20.0), &config).unwrap();
        assert_eq!(tall.scale_y, 1.0);

        let short = compute_placement(&local, &base, Rect::new(0.0, 0.0, 200.0, 30.0), Some(20.0), &config).unwrap();
        assert!((short.scale_y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_vertical_scale_is_valid() {
        let config = config();
        let local = drawing(&[(20.0, 28.0), (20.0, 48.0)]);
        let base = BaseMetrics {
            width: Some(200.0),
            height: Some(40.0),
            first_underline_offset: Some(20.0),
        };

        let placement = compute_placement(&local, &base, Rect::new(0.0, 0.0, 200.0, 20.0), Some(20.0), &config).unwrap();
        assert_eq!(placement.scale_y, 0.0);
        let placed = local.transformed(placement.transform);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed.path_bounds().unwrap().height(), 0.0);
    }

    #[test]
    fn test_degenerate_rect_places_nothing() {
        let config = config();
        let local = drawing(&[(1.0, 1.0), (2.0, 2.0)]);
        assert!(place(&local, &BaseMetrics::default(), Rect::new(0.0, 0.0, 0.0, 10.0), None, &config).is_empty());
        assert!(place(&local, &BaseMetrics::default(), Rect::new(0.0, f64::NAN, 10.0, 10.0), None, &config).is_empty());
    }

    #[test]
    fn test_non_finite_metrics_fall_back() {
        let config = config();
        let local = drawing(&[(10.0, 10.0), (50.0, 10.0)]);
        let base = BaseMetrics {
            width: Some(f64::NAN),
            height: Some(f64::INFINITY),
            first_underline_offset: Some(f64::NAN),
        };

        let placement = compute_placement(&local, &base, Rect::new(0.0, 0.0, 200.0, 40.0), Some(10.0), &config).unwrap();
        assert_eq!(placement.scale_x, 1.0);
        assert!(!placement.anchored);
        assert!(placement.transform.is_finite());
    }
}
