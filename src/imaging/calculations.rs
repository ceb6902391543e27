//! Pure calculation functions for output dimensions and quality.
//!
//! All functions here are pure and testable without any I/O or images.

use serde::{Deserialize, Serialize};

/// Bounding box an image must fit into. An absent bound means "no cap".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConstraint {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl ResizeConstraint {
    pub fn new(max_width: Option<u32>, max_height: Option<u32>) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_width.is_none() && self.max_height.is_none()
    }
}

/// Calculate the target dimensions for a source image under a constraint.
///
/// The scale factor is the smallest ratio `bound / source` over the bounds
/// that are present, clamped to 1.0: images are only ever shrunk. Both axes
/// are rounded half-to-even with the same factor, so the aspect ratio drifts
/// by at most one pixel, and neither axis drops below 1.
///
/// Bounds of zero are rejected by configuration validation and never reach
/// this function.
///
/// # Examples
/// ```
/// # use shrinkix::imaging::{ResizeConstraint, plan_resize};
/// assert_eq!(plan_resize(100, 50, &ResizeConstraint::new(Some(50), None)), (50, 25));
/// assert_eq!(plan_resize(100, 50, &ResizeConstraint::default()), (100, 50));
/// ```
pub fn plan_resize(source_width: u32, source_height: u32, constraint: &ResizeConstraint) -> (u32, u32) {
    if constraint.is_unbounded() {
        return (source_width, source_height);
    }

    let scale = scale_factor(source_width, source_height, constraint);
    if scale >= 1.0 {
        return (source_width, source_height);
    }

    (
        scale_axis(source_width, scale),
        scale_axis(source_height, scale),
    )
}

fn scale_factor(source_width: u32, source_height: u32, constraint: &ResizeConstraint) -> f64 {
    let ratio = |bound: Option<u32>, source: u32| {
        bound.map_or(f64::INFINITY, |b| b as f64 / source as f64)
    };
    ratio(constraint.max_width, source_width)
        .min(ratio(constraint.max_height, source_height))
        .min(1.0)
}

fn scale_axis(source: u32, scale: f64) -> u32 {
    let scaled = (source as f64 * scale).round_ties_even() as u32;
    scaled.clamp(1, source)
}

/// Size-driven lossy quality: large images tolerate stronger compression.
///
/// `floor(30 + 65 × (1 − min(√(w·h) / 4096, 1)))`, so a thumbnail stays in the
/// 90s and anything of 16 megapixels or more gets 30.
pub fn adaptive_quality(width: u32, height: u32) -> u32 {
    let edge = (width as f64 * height as f64).sqrt();
    let pressure = (edge / 4096.0).min(1.0);
    (30.0 + 65.0 * (1.0 - pressure)).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(w: Option<u32>, h: Option<u32>) -> ResizeConstraint {
        ResizeConstraint::new(w, h)
    }

    // =========================================================================
    // plan_resize tests
    // =========================================================================

    #[test]
    fn width_bound_only() {
        assert_eq!(plan_resize(100, 50, &bounds(Some(50), None)), (50, 25));
    }

    #[test]
    fn no_bounds_is_identity() {
        assert_eq!(plan_resize(100, 50, &bounds(None, None)), (100, 50));
    }

    #[test]
    fn height_bound_only() {
        assert_eq!(plan_resize(400, 800, &bounds(None, Some(200))), (100, 200));
    }

    #[test]
    fn tighter_bound_wins() {
        // 2000x1000 into 1000x1000: width is the binding axis
        assert_eq!(plan_resize(2000, 1000, &bounds(Some(1000), Some(1000))), (1000, 500));
        // 1000x2000 into 1000x500: height is the binding axis
        assert_eq!(plan_resize(1000, 2000, &bounds(Some(1000), Some(500))), (250, 500));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(plan_resize(300, 200, &bounds(Some(1000), Some(1000))), (300, 200));
        assert_eq!(plan_resize(300, 200, &bounds(Some(300), None)), (300, 200));
    }

    #[test]
    fn never_returns_zero() {
        // 10000x1 squeezed to width 10 would round the height to 0
        assert_eq!(plan_resize(10000, 1, &bounds(Some(10), None)), (10, 1));
        assert_eq!(plan_resize(1, 10000, &bounds(Some(1), Some(1))), (1, 1));
    }

    #[test]
    fn rounds_half_to_even() {
        // 5 * 0.5 = 2.5 → 2, 3 * 0.5 = 1.5 → 2
        assert_eq!(plan_resize(10, 5, &bounds(Some(5), None)), (5, 2));
        assert_eq!(plan_resize(10, 3, &bounds(Some(5), None)), (5, 2));
    }

    #[test]
    fn invariants_hold_over_a_grid() {
        let sizes = [1u32, 2, 3, 7, 64, 99, 640, 1001, 4096];
        let caps = [None, Some(1), Some(2), Some(50), Some(333), Some(5000)];
        for &w in &sizes {
            for &h in &sizes {
                for &mw in &caps {
                    for &mh in &caps {
                        let (tw, th) = plan_resize(w, h, &bounds(mw, mh));
                        assert!(tw >= 1 && th >= 1, "{w}x{h} {mw:?}/{mh:?} → {tw}x{th}");
                        assert!(tw <= w && th <= h, "{w}x{h} {mw:?}/{mh:?} → {tw}x{th}");
                    }
                }
            }
        }
    }

    #[test]
    fn aspect_ratio_drift_within_one_pixel() {
        let (w, h) = (1234u32, 567u32);
        let (tw, th) = plan_resize(w, h, &bounds(Some(800), None));
        let expected_h = th as f64;
        let exact_h = tw as f64 * h as f64 / w as f64;
        assert!((expected_h - exact_h).abs() <= 1.0);
    }

    // =========================================================================
    // adaptive_quality tests
    // =========================================================================

    #[test]
    fn adaptive_quality_small_image_is_high() {
        assert_eq!(adaptive_quality(1, 1), 94);
    }

    #[test]
    fn adaptive_quality_saturates_at_30() {
        assert_eq!(adaptive_quality(4096, 4096), 30);
        assert_eq!(adaptive_quality(10000, 10000), 30);
    }

    #[test]
    fn adaptive_quality_midpoint() {
        // sqrt(2048*2048)/4096 = 0.5 → 30 + 32.5 = 62.5 → 62
        assert_eq!(adaptive_quality(2048, 2048), 62);
    }
}
