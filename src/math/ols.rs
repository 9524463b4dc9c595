//! Linear least squares via SVD.
//!
//! Used wherever the engine needs a small dense linear solve that may be tall
//! or rank deficient:
//!
//! ```text
//! minimize ‖A x - b‖²
//! ```
//!
//! - Savitzky–Golay filters fit a polynomial to a window (tall Vandermonde).
//! - The Levenberg–Marquardt step solves the damped normal equations, which
//!   can become near singular when a peak parameter is pinned to a bound.
//!
//! Nalgebra's `QR::solve` is intended for square systems, so SVD is used for
//! everything. Problem sizes here are tiny (≤ a few dozen columns).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Inverse of a symmetric positive semi-definite matrix, or `None` when it is
/// singular (rank deficient at `rel_tol` relative to the largest singular
/// value).
pub fn invert_symmetric(m: &DMatrix<f64>, rel_tol: f64) -> Option<DMatrix<f64>> {
    if m.nrows() != m.ncols() || m.nrows() == 0 {
        return None;
    }
    let svd = m.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }
    if svd.singular_values.iter().any(|&s| s <= s_max * rel_tol) {
        return None;
    }
    let inv = svd.pseudo_inverse(0.0).ok()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}
