//! Smoothing filters for working traces.
//!
//! Smoothing is best effort: parameters that cannot be honored on a short
//! trace (a Savitzky–Golay window below 3 samples, a non-positive sigma)
//! return the input unchanged instead of failing.

use nalgebra::{DMatrix, DVector};

use crate::domain::{SmoothingMethod, Trace};
use crate::math::solve_least_squares;

/// Gaussian kernels are truncated at this many standard deviations.
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Apply `method` to the trace ordinate.
pub fn smooth(trace: &Trace, method: SmoothingMethod) -> Trace {
    match method {
        SmoothingMethod::None => trace.clone(),
        SmoothingMethod::Gaussian { sigma } => trace.with_y(gaussian_filter(trace.y(), sigma)),
        SmoothingMethod::SavitzkyGolay { window, polyorder } => {
            trace.with_y(savitzky_golay(trace.y(), window, polyorder))
        }
    }
}

/// Gaussian filter in sample units with half-sample symmetric edges
/// (`d c b a | a b c d | d c b a`).
pub fn gaussian_filter(y: &[f64], sigma: f64) -> Vec<f64> {
    if !(sigma.is_finite() && sigma > 0.0) || y.is_empty() {
        return y.to_vec();
    }

    // Past the trace length the reflected kernel only repeats samples.
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5).min(y.len() as f64) as usize;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let d = k as f64 - radius as f64;
            (-0.5 * d * d / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }

    let n = y.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * y[reflect(i + k as isize - radius as isize, n)])
                .sum()
        })
        .collect()
}

fn reflect(mut i: isize, n: isize) -> usize {
    let period = 2 * n;
    i = i.rem_euclid(period);
    if i >= n {
        i = period - i - 1;
    }
    i as usize
}

/// Effective Savitzky–Golay `(window, polyorder)` for a trace of `len`
/// samples.
///
/// Even windows are widened by one; windows longer than the trace shrink to
/// the largest odd length that fits; `polyorder` is capped at `window - 1`.
/// Returns `None` when no window of at least 3 samples fits.
pub fn savgol_window(len: usize, window: usize, polyorder: usize) -> Option<(usize, usize)> {
    let mut window = if window % 2 == 0 { window + 1 } else { window };
    if window > len {
        window = if len % 2 == 1 { len } else { len.saturating_sub(1) };
    }
    if window < 3 {
        return None;
    }
    Some((window, polyorder.min(window - 1)))
}

/// Savitzky–Golay smoothing.
///
/// Interior samples use the convolution coefficients; the first and last
/// half-windows evaluate the polynomial fitted over the first/last full window.
pub fn savitzky_golay(y: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
    let Some((window, polyorder)) = savgol_window(y.len(), window, polyorder) else {
        return y.to_vec();
    };
    let half = window / 2;
    let design = vandermonde(window, polyorder);
    let Ok(pinv) = design.clone().pseudo_inverse(1e-12) else {
        return y.to_vec();
    };
    let coeffs: Vec<f64> = pinv.row(0).iter().copied().collect();

    let n = y.len();
    let mut out = y.to_vec();
    for i in half..n - half {
        out[i] = coeffs
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(c, v)| c * v)
            .sum();
    }

    fill_edge(&design, &y[..window], &mut out[..half], 0);
    fill_edge(&design, &y[n - window..], &mut out[n - half..], half + 1);
    out
}

/// Rows `(k - half)^j`, `k = 0..window`, `j = 0..=polyorder`.
fn vandermonde(window: usize, polyorder: usize) -> DMatrix<f64> {
    let half = (window / 2) as f64;
    DMatrix::from_fn(window, polyorder + 1, |k, j| (k as f64 - half).powi(j as i32))
}

fn fill_edge(design: &DMatrix<f64>, segment: &[f64], out: &mut [f64], first_row: usize) {
    let rhs = DVector::from_column_slice(segment);
    let Some(poly) = solve_least_squares(design, &rhs) else {
        return;
    };
    for (offset, slot) in out.iter_mut().enumerate() {
        *slot = design.row(first_row + offset).transpose().dot(&poly);
    }
}
