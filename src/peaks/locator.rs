//! Automatic peak detection.
//!
//! Detection works on a Gaussian-smoothed copy of the trace and only reports
//! x positions: amplitudes are re-derived from the working trace at fit time,
//! so detection sensitivity stays independent of the fit window.
//!
//! Selection rules:
//! 1. local maxima only (a flat top reports its middle sample; the first and
//!    last samples never qualify)
//! 2. prominence ≥ `relative_prominence × (max(y) − min(y))`
//! 3. maxima closer than `min_distance` samples collapse onto the more
//!    prominent one (then the higher one, then the lower index)

use std::cmp::Ordering;

use crate::domain::Trace;
use crate::signal::gaussian_filter;

/// Peak search settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSearch {
    /// Gaussian smoothing applied before the search (in samples).
    pub smoothing_sigma: f64,
    /// Prominence threshold as a fraction of the smoothed y-range.
    pub relative_prominence: f64,
    /// Minimum index separation between reported peaks.
    pub min_distance: usize,
}

impl Default for PeakSearch {
    fn default() -> Self {
        Self {
            smoothing_sigma: 2.0,
            relative_prominence: 0.05,
            min_distance: 5,
        }
    }
}

/// Candidate peak positions with the default search settings.
pub fn find_peaks(trace: &Trace) -> Vec<f64> {
    find_peaks_with(trace, &PeakSearch::default())
}

pub fn find_peaks_with(trace: &Trace, search: &PeakSearch) -> Vec<f64> {
    let smoothed = gaussian_filter(trace.y(), search.smoothing_sigma);
    let Some((lo, hi)) = min_max(&smoothed) else {
        return Vec::new();
    };
    let threshold = (hi - lo) * search.relative_prominence;

    select_peaks(&smoothed, threshold, search.min_distance)
        .into_iter()
        .map(|i| trace.x()[i])
        .collect()
}

/// Indices of peaks in `y` passing the prominence and distance rules,
/// ascending.
pub fn select_peaks(y: &[f64], min_prominence: f64, min_distance: usize) -> Vec<usize> {
    let maxima = local_maxima(y);
    let prominence = prominences(y, &maxima);

    let candidates: Vec<(usize, f64)> = maxima
        .into_iter()
        .zip(prominence)
        .filter(|(_, p)| *p >= min_prominence)
        .collect();

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        let (ia, pa) = candidates[a];
        let (ib, pb) = candidates[b];
        pb.total_cmp(&pa)
            .then_with(|| y[ib].total_cmp(&y[ia]))
            .then_with(|| ia.cmp(&ib))
    });

    let mut keep = vec![true; candidates.len()];
    for &k in &order {
        if !keep[k] {
            continue;
        }
        let (ik, _) = candidates[k];
        for (j, &(ij, _)) in candidates.iter().enumerate() {
            if j != k && keep[j] && ij.abs_diff(ik) < min_distance {
                keep[j] = false;
            }
        }
    }

    candidates
        .iter()
        .zip(keep)
        .filter_map(|(&(i, _), kept)| kept.then_some(i))
        .collect()
}

/// Strict local maxima; plateaus report their (lower) middle index.
pub fn local_maxima(y: &[f64]) -> Vec<usize> {
    let n = y.len();
    let mut out = Vec::new();
    if n < 3 {
        return out;
    }

    let mut i = 1;
    while i < n - 1 {
        if y[i - 1] < y[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && y[ahead] == y[i] {
                ahead += 1;
            }
            if y[ahead] < y[i] {
                out.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Topographic prominence of each peak: height above the higher of the two
/// lowest points reached before climbing above the peak on either side.
pub fn prominences(y: &[f64], peaks: &[usize]) -> Vec<f64> {
    peaks
        .iter()
        .map(|&p| {
            let h = y[p];
            let mut left_min = h;
            for &v in y[..p].iter().rev() {
                if v > h {
                    break;
                }
                left_min = left_min.min(v);
            }
            let mut right_min = h;
            for &v in &y[p + 1..] {
                if v > h {
                    break;
                }
                right_min = right_min.min(v);
            }
            h - left_min.max(right_min)
        })
        .collect()
}

fn min_max(y: &[f64]) -> Option<(f64, f64)> {
    let cmp = |a: &f64, b: &f64| a.partial_cmp(b).unwrap_or(Ordering::Equal);
    let lo = y.iter().copied().min_by(cmp)?;
    let hi = y.iter().copied().max_by(cmp)?;
    Some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(x: f64, amp: f64, center: f64, sigma: f64) -> f64 {
        amp * (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
    }

    #[test]
    fn finds_single_bump() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &x)| gaussian(x, 10.0, 5.0, 1.0) + 0.05 * (i as f64 * 1.7).sin())
            .collect();
        let trace = Trace::new(x, y).unwrap();
        let peaks = find_peaks(&trace);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0] - 5.0).abs() <= 1.0);
    }

    #[test]
    fn edges_are_never_peaks() {
        let y = [5.0, 1.0, 0.0, 1.0, 5.0];
        assert!(local_maxima(&y).is_empty());
    }

    #[test]
    fn plateau_reports_middle() {
        let y = [0.0, 1.0, 3.0, 3.0, 3.0, 1.0, 0.0];
        assert_eq!(local_maxima(&y), vec![3]);
        let y = [0.0, 3.0, 3.0, 0.0];
        assert_eq!(local_maxima(&y), vec![1]);
    }

    #[test]
    fn prominence_measures_height_above_saddle() {
        //           0    1    2    3    4    5    6
        let y = [0.0, 4.0, 1.0, 6.0, 2.0, 3.0, 0.0];
        let peaks = local_maxima(&y);
        assert_eq!(peaks, vec![1, 3, 5]);
        let p = prominences(&y, &peaks);
        assert_eq!(p, vec![3.0, 6.0, 1.0]);
    }

    #[test]
    fn close_peaks_collapse_onto_more_prominent() {
        let mut y = vec![0.0; 30];
        y[10] = 5.0;
        y[13] = 8.0;
        y[25] = 4.0;
        assert_eq!(select_peaks(&y, 0.0, 5), vec![13, 25]);
        assert_eq!(select_peaks(&y, 0.0, 3), vec![10, 13, 25]);
    }

    #[test]
    fn weak_peaks_are_dropped() {
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&x| gaussian(x, 100.0, 3.0, 0.1) + gaussian(x, 2.0, 7.0, 0.1))
            .collect();
        let trace = Trace::new(x, y).unwrap();
        let peaks = find_peaks(&trace);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0] - 3.0).abs() < 0.06);
    }

    #[test]
    fn flat_trace_has_no_peaks() {
        let trace = Trace::new((0..20).map(|i| i as f64).collect(), vec![1.0; 20]).unwrap();
        assert!(find_peaks(&trace).is_empty());
    }
}
