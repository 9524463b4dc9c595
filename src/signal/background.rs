//! Background estimation and removal.

use tracing::debug;

use crate::domain::{AnchorPoint, Trace};
use crate::error::{FitError, Result};
use crate::math::SmoothingSpline;

/// Minimum number of anchors for a cubic spline.
pub const MIN_ANCHORS: usize = 4;

/// Default number of windows used by [`auto_select_background`].
pub const DEFAULT_BACKGROUND_WINDOWS: usize = 15;

/// Subtract a smoothing-spline background through `anchors`, clamping the
/// result at zero.
///
/// Anchors may arrive in any order. The smoothing target equals the number of
/// anchors, so the spline follows the anchors closely while ignoring
/// sub-count jitter between them.
pub fn subtract_background(trace: &Trace, anchors: &[AnchorPoint]) -> Result<Trace> {
    if anchors.len() < MIN_ANCHORS {
        return Err(FitError::InsufficientData {
            operation: "background subtraction",
            required: MIN_ANCHORS,
            actual: anchors.len(),
        });
    }

    let points: Vec<(f64, f64)> = anchors.iter().map(|a| (a.x, a.y)).collect();
    let spline = SmoothingSpline::fit(&points, anchors.len() as f64)?;

    let y = trace
        .x()
        .iter()
        .zip(trace.y())
        .map(|(&x, &y)| (y - spline.eval(x)).max(0.0))
        .collect();

    debug!(anchors = anchors.len(), "background subtracted");
    Ok(trace.with_y(y))
}

/// Pick the minimum sample of each of `n_windows` contiguous index windows.
///
/// Windows are `len / n_windows` samples wide; when the trace is shorter than
/// `n_windows` every window is empty and no anchors are returned.
pub fn auto_select_background(trace: &Trace, n_windows: usize) -> Vec<AnchorPoint> {
    let n = trace.len();
    if n_windows == 0 {
        return Vec::new();
    }
    let width = n / n_windows;
    if width == 0 {
        return Vec::new();
    }

    let (x, y) = (trace.x(), trace.y());
    (0..n_windows)
        .filter_map(|w| {
            let start = w * width;
            let end = (start + width).min(n);
            if end <= start {
                return None;
            }
            let idx = (start..end).fold(start, |best, i| if y[i] < y[best] { i } else { best });
            Some(AnchorPoint { x: x[idx], y: y[idx] })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bumpy_trace() -> Trace {
        let x: Vec<f64> = (0..300).map(|i| i as f64 * 0.1).collect();
        let y = x
            .iter()
            .map(|&x| {
                let baseline = 50.0 + 2.0 * x;
                let peak = 400.0 * (-(x - 12.0).powi(2) / (2.0 * 0.3f64.powi(2))).exp();
                baseline + peak
            })
            .collect();
        Trace::new(x, y).unwrap()
    }

    #[test]
    fn too_few_anchors_is_an_error() {
        let trace = bumpy_trace();
        let anchors = vec![AnchorPoint { x: 0.0, y: 1.0 }; 3];
        assert!(matches!(
            subtract_background(&trace, &anchors),
            Err(FitError::InsufficientData { required: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn auto_background_picks_window_minima() {
        let trace = bumpy_trace();
        let anchors = auto_select_background(&trace, DEFAULT_BACKGROUND_WINDOWS);
        assert_eq!(anchors.len(), 15);
        // The baseline is increasing, so the first sample of each 20-sample
        // window is its minimum, except in the window holding the peak tail.
        for (w, a) in anchors.iter().enumerate() {
            if w == 6 {
                assert!(a.x > 12.5 && a.x < 14.0);
                continue;
            }
            assert_eq!(a.x, trace.x()[w * 20]);
        }
    }

    #[test]
    fn short_trace_yields_no_anchors() {
        let trace = Trace::new(vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 1.0]).unwrap();
        assert!(auto_select_background(&trace, 15).is_empty());
    }

    #[test]
    fn subtraction_removes_linear_baseline_and_stays_non_negative() {
        let trace = bumpy_trace();
        let anchors = auto_select_background(&trace, DEFAULT_BACKGROUND_WINDOWS);
        let flat = subtract_background(&trace, &anchors).unwrap();

        assert!(flat.y().iter().all(|&v| v >= 0.0));
        // Far from the peak the baseline is gone.
        assert!(flat.y()[10] < 2.0);
        assert!(flat.y()[250] < 2.0);
        // The peak survives.
        let top = flat.y()[120];
        assert!(top > 380.0, "peak height {top}");
    }

    #[test]
    fn repeated_subtraction_keeps_clamp_stable() {
        let trace = bumpy_trace();
        let anchors = auto_select_background(&trace, DEFAULT_BACKGROUND_WINDOWS);
        let once = subtract_background(&trace, &anchors).unwrap();
        let twice = subtract_background(&once, &anchors).unwrap();
        assert!(twice.y().iter().all(|&v| v >= 0.0));

        let rederived = auto_select_background(&once, DEFAULT_BACKGROUND_WINDOWS);
        let again = subtract_background(&once, &rederived).unwrap();
        assert!(again.y().iter().all(|&v| v >= 0.0));
        // Re-deriving anchors on a flattened trace changes almost nothing.
        for (a, b) in once.y().iter().zip(again.y()) {
            assert!((a - b).abs() < 1.0);
        }
    }

    #[test]
    fn anchor_order_does_not_matter() {
        let trace = bumpy_trace();
        let anchors = auto_select_background(&trace, 10);
        let mut reversed = anchors.clone();
        reversed.reverse();
        let a = subtract_background(&trace, &anchors).unwrap();
        let b = subtract_background(&trace, &reversed).unwrap();
        for (u, v) in a.y().iter().zip(b.y()) {
            assert!((u - v).abs() < 1e-9);
        }
    }
}
