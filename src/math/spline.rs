//! Natural cubic smoothing spline.
//!
//! For knots `t_1 < … < t_n` and values `y_i` the spline `g` minimizes
//!
//! ```text
//! Σ (y_i - g(t_i))² + α ∫ g''(t)² dt
//! ```
//!
//! using the Reinsch form: with the banded matrices `Q` (n × n-2) and
//! `R` (n-2 × n-2),
//!
//! ```text
//! (R + α QᵀQ) γ = Qᵀ y,    g = y - α Q γ
//! ```
//!
//! where `γ` holds the second derivatives at the interior knots.
//!
//! `α` is chosen so the residual sum of squares equals a smoothing target `s`
//! (bisection on `log α`, the residual is monotone in `α`). `s = 0` gives the
//! interpolating spline; a target above the straight-line residual gives the
//! least-squares line. Outside the knot range the spline continues linearly.

use nalgebra::{DMatrix, DVector};

use crate::error::{FitError, Result};
use crate::math::ols::solve_least_squares;

#[derive(Debug, Clone)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivatives at every knot (zero at both ends).
    second: Vec<f64>,
}

impl SmoothingSpline {
    /// Fit a smoothing spline with residual target `s`.
    ///
    /// Points are sorted by `x`; points sharing an `x` are merged by averaging
    /// their `y`. Requires at least 4 distinct knots.
    pub fn fit(points: &[(f64, f64)], s: f64) -> Result<Self> {
        let (knots, values) = sorted_unique(points);
        if knots.len() < 4 {
            return Err(FitError::InsufficientData {
                operation: "cubic smoothing spline",
                required: 4,
                actual: knots.len(),
            });
        }
        if knots.iter().chain(values.iter()).any(|v| !v.is_finite()) || !(s >= 0.0) {
            return Err(FitError::InvalidInput(
                "smoothing spline needs finite points and s >= 0".to_string(),
            ));
        }

        let system = ReinschSystem::new(&knots);
        let y = DVector::from_column_slice(&values);

        let alpha = if s == 0.0 {
            0.0
        } else {
            choose_alpha(&system, &y, &knots, s)
        };

        let (fitted, gamma) = system.solve(&y, alpha).ok_or_else(|| {
            FitError::InvalidInput("smoothing spline system is singular".to_string())
        })?;

        let n = knots.len();
        let mut second = vec![0.0; n];
        second[1..n - 1].copy_from_slice(gamma.as_slice());

        Ok(Self {
            knots,
            values: fitted.iter().copied().collect(),
            second,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = &self.knots;
        let g = &self.values;
        let c = &self.second;
        let n = t.len();

        if x <= t[0] {
            let h = t[1] - t[0];
            let slope = (g[1] - g[0]) / h - h * c[1] / 6.0;
            return g[0] + slope * (x - t[0]);
        }
        if x >= t[n - 1] {
            let h = t[n - 1] - t[n - 2];
            let slope = (g[n - 1] - g[n - 2]) / h + h * c[n - 2] / 6.0;
            return g[n - 1] + slope * (x - t[n - 1]);
        }

        let i = match t.binary_search_by(|k| k.total_cmp(&x)) {
            Ok(i) => return g[i],
            Err(i) => i - 1,
        };
        let h = t[i + 1] - t[i];
        let a = x - t[i];
        let b = t[i + 1] - x;
        (a * g[i + 1] + b * g[i]) / h
            - a * b / 6.0 * ((1.0 + a / h) * c[i + 1] + (1.0 + b / h) * c[i])
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }
}

struct ReinschSystem {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
}

impl ReinschSystem {
    fn new(t: &[f64]) -> Self {
        let n = t.len();
        let h: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
        let mut q = DMatrix::zeros(n, n - 2);
        let mut r = DMatrix::zeros(n - 2, n - 2);

        for j in 1..n - 1 {
            let col = j - 1;
            q[(j - 1, col)] = 1.0 / h[j - 1];
            q[(j, col)] = -1.0 / h[j - 1] - 1.0 / h[j];
            q[(j + 1, col)] = 1.0 / h[j];

            r[(col, col)] = (h[j - 1] + h[j]) / 3.0;
            if col + 1 < n - 2 {
                r[(col, col + 1)] = h[j] / 6.0;
                r[(col + 1, col)] = h[j] / 6.0;
            }
        }

        Self { q, r }
    }

    fn solve(&self, y: &DVector<f64>, alpha: f64) -> Option<(DVector<f64>, DVector<f64>)> {
        let qt = self.q.transpose();
        let lhs = &self.r + (&qt * &self.q) * alpha;
        let rhs = &qt * y;
        let gamma = match lhs.clone().cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => solve_least_squares(&lhs, &rhs)?,
        };
        let fitted = y - (&self.q * &gamma) * alpha;
        Some((fitted, gamma))
    }

    fn residual(&self, y: &DVector<f64>, alpha: f64) -> f64 {
        match self.solve(y, alpha) {
            Some((fitted, _)) => (y - fitted).norm_squared(),
            None => f64::INFINITY,
        }
    }
}

fn choose_alpha(system: &ReinschSystem, y: &DVector<f64>, t: &[f64], s: f64) -> f64 {
    let span = t[t.len() - 1] - t[0];
    let mean_h = span / (t.len() - 1) as f64;
    let scale = mean_h.powi(3);

    let mut lo = (scale * 1e-12).ln();
    let mut hi = (scale * 1e12).ln();
    if system.residual(y, hi.exp()) <= s {
        return hi.exp();
    }
    if system.residual(y, lo.exp()) >= s {
        return lo.exp();
    }

    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if system.residual(y, mid.exp()) < s {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-10 {
            break;
        }
    }
    lo.exp()
}

fn sorted_unique(points: &[(f64, f64)]) -> (Vec<f64>, Vec<f64>) {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut xs: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut ys: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut counts: Vec<usize> = Vec::with_capacity(sorted.len());
    for (x, y) in sorted {
        match xs.last() {
            Some(&last) if last == x => {
                let k = ys.len() - 1;
                ys[k] += y;
                counts[k] += 1;
            }
            _ => {
                xs.push(x);
                ys.push(y);
                counts.push(1);
            }
        }
    }
    for (y, c) in ys.iter_mut().zip(&counts) {
        *y /= *c as f64;
    }
    (xs, ys)
}
