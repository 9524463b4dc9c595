//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ r_i(p)²` for a residual function `r` over a box
//! `lower ≤ p ≤ upper`. Steps are solved from the Marquardt-scaled normal
//! equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! over the parameters not pinned at a bound, and projected back into the
//! box. The Jacobian is a forward difference (stepping backwards at an upper
//! bound), so the same solver serves the peak profiles and any externally
//! supplied pressure function.
//!
//! Termination:
//! - relative cost decrease below `ftol`
//! - projected step below `xtol`
//! - no improving step even at maximal damping (treated as converged, the
//!   point is a minimum to working precision)
//! - `max_iterations` reached (not converged)
//! - non-finite residuals at the starting point (not converged)

use nalgebra::{DMatrix, DVector};

use crate::math::ols::{invert_symmetric, solve_least_squares};

/// Closed box constraint for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn at_least(lower: f64) -> Self {
        Self::new(lower, f64::INFINITY)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

#[derive(Debug, Clone)]
pub struct LmConfig {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub initial_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ftol: 1e-12,
            xtol: 1e-12,
            initial_lambda: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    CostTolerance,
    StepTolerance,
    ExactFit,
    Stalled,
    MaxIterations,
    InvalidStart,
}

impl Termination {
    pub fn converged(self) -> bool {
        !matches!(self, Termination::MaxIterations | Termination::InvalidStart)
    }
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    /// Jacobian of the residuals at `params` (rows = residuals).
    pub jacobian: DMatrix<f64>,
    pub iterations: usize,
    pub termination: Termination,
}

impl LmOutcome {
    pub fn converged(&self) -> bool {
        self.termination.converged() && self.cost.is_finite()
    }

    /// Parameter covariance `(JᵀJ)⁻¹ · cost / (m - n)`.
    ///
    /// `None` when the problem has no residual degrees of freedom or `JᵀJ` is
    /// singular.
    pub fn covariance(&self) -> Option<DMatrix<f64>> {
        let m = self.jacobian.nrows();
        let n = self.jacobian.ncols();
        if n == 0 || m <= n {
            return None;
        }
        let jtj = self.jacobian.transpose() * &self.jacobian;
        let inv = invert_symmetric(&jtj, 1e-14)?;
        Some(inv * (self.cost / (m - n) as f64))
    }

    /// Square roots of the covariance diagonal; zeros when the covariance is
    /// unavailable.
    pub fn standard_errors(&self) -> Vec<f64> {
        let n = self.params.len();
        match self.covariance() {
            Some(cov) => (0..n)
                .map(|i| {
                    let v = cov[(i, i)];
                    if v.is_finite() && v >= 0.0 { v.sqrt() } else { 0.0 }
                })
                .collect(),
            None => vec![0.0; n],
        }
    }
}

const LAMBDA_MAX: f64 = 1e16;
const LAMBDA_MIN: f64 = 1e-15;

/// Run bounded Levenberg–Marquardt from `initial`.
///
/// `residual_fn` returns `None` when the parameters are outside the model's
/// domain; such trial points are rejected like a cost increase.
pub fn minimize<F>(
    residual_fn: F,
    initial: &[f64],
    bounds: &[Bound],
    config: &LmConfig,
) -> LmOutcome
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    debug_assert_eq!(initial.len(), bounds.len());
    let n = initial.len();
    let mut x: Vec<f64> = initial
        .iter()
        .zip(bounds)
        .map(|(&v, b)| b.clamp(v))
        .collect();

    let Some(mut r) = eval_finite(&residual_fn, &x) else {
        return LmOutcome {
            params: x,
            residuals: Vec::new(),
            cost: f64::INFINITY,
            jacobian: DMatrix::zeros(0, n),
            iterations: 0,
            termination: Termination::InvalidStart,
        };
    };
    let mut cost = sum_sq(&r);
    let mut jac = jacobian(&residual_fn, &x, &r, bounds);
    let mut lambda = config.initial_lambda;
    let mut iterations = 0;
    let mut termination = Termination::MaxIterations;

    if n == 0 || cost == 0.0 {
        termination = Termination::ExactFit;
    }

    while termination == Termination::MaxIterations && iterations < config.max_iterations {
        iterations += 1;

        let r_vec = DVector::from_column_slice(&r);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r_vec;

        // Parameters pinned at a bound with the descent direction pointing
        // outward take no part in this step.
        let free: Vec<usize> = (0..n)
            .filter(|&i| {
                let pinned_low = x[i] <= bounds[i].lower && grad[i] > 0.0;
                let pinned_high = x[i] >= bounds[i].upper && grad[i] < 0.0;
                !(pinned_low || pinned_high)
            })
            .collect();
        if free.is_empty() {
            termination = Termination::Stalled;
            break;
        }

        let diag_floor = jtj.diagonal().max().max(1.0) * 1e-12;
        let k = free.len();
        let mut damped = DMatrix::from_fn(k, k, |a, b| jtj[(free[a], free[b])]);
        for (a, &i) in free.iter().enumerate() {
            damped[(a, a)] += lambda * jtj[(i, i)].max(diag_floor);
        }
        let rhs = DVector::from_fn(k, |a, _| -grad[free[a]]);
        let reduced = match damped.clone().cholesky() {
            Some(chol) => Some(chol.solve(&rhs)),
            None => solve_least_squares(&damped, &rhs),
        };
        let Some(reduced) = reduced else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                termination = Termination::Stalled;
            }
            continue;
        };
        let mut step = vec![0.0; n];
        for (a, &i) in free.iter().enumerate() {
            step[i] = reduced[a];
        }

        let x_new: Vec<f64> = x
            .iter()
            .zip(step.iter())
            .zip(bounds)
            .map(|((&xi, &di), b)| b.clamp(xi + di))
            .collect();

        let step_norm = norm(x.iter().zip(&x_new).map(|(a, b)| b - a));
        let x_norm = norm(x.iter().copied());
        if step_norm <= config.xtol * (config.xtol + x_norm) {
            termination = Termination::StepTolerance;
            break;
        }

        match eval_finite(&residual_fn, &x_new) {
            Some(r_new) if sum_sq(&r_new) < cost => {
                let cost_new = sum_sq(&r_new);
                let decrease = cost - cost_new;
                x = x_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if cost == 0.0 {
                    termination = Termination::ExactFit;
                } else if decrease <= config.ftol * cost {
                    termination = Termination::CostTolerance;
                } else {
                    jac = jacobian(&residual_fn, &x, &r, bounds);
                }
            }
            _ => {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    termination = Termination::Stalled;
                }
            }
        }
    }

    let jac = jacobian(&residual_fn, &x, &r, bounds);
    LmOutcome {
        params: x,
        residuals: r,
        cost,
        jacobian: jac,
        iterations,
        termination,
    }
}

fn eval_finite<F>(residual_fn: &F, x: &[f64]) -> Option<Vec<f64>>
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    let r = residual_fn(x)?;
    if r.iter().all(|v| v.is_finite()) {
        Some(r)
    } else {
        None
    }
}

fn jacobian<F>(residual_fn: &F, x: &[f64], r0: &[f64], bounds: &[Bound]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    let m = r0.len();
    let n = x.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut shifted = x.to_vec();

    for j in 0..n {
        let h = f64::EPSILON.sqrt() * x[j].abs().max(1.0);
        // Step away from an upper bound so the shifted point stays feasible.
        let forward = if x[j] + h > bounds[j].upper { -h } else { h };

        let mut column = None;
        for step in [forward, -forward] {
            shifted[j] = x[j] + step;
            if let Some(rj) = eval_finite(residual_fn, &shifted) {
                column = Some((rj, step));
                break;
            }
        }
        shifted[j] = x[j];

        if let Some((rj, step)) = column {
            for i in 0..m {
                let d = (rj[i] - r0[i]) / step;
                jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
            }
        }
    }

    jac
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exponential_decay() {
        // y = 3 exp(-0.5 x)
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 * (-0.5 * x).exp()).collect();
        let residuals = |p: &[f64]| -> Option<Vec<f64>> {
            Some(
                xs.iter()
                    .zip(&ys)
                    .map(|(&x, &y)| y - p[0] * (-p[1] * x).exp())
                    .collect(),
            )
        };

        let out = minimize(
            residuals,
            &[1.0, 0.1],
            &[Bound::unbounded(), Bound::unbounded()],
            &LmConfig::default(),
        );
        assert!(out.converged(), "termination {:?}", out.termination);
        assert!((out.params[0] - 3.0).abs() < 1e-6);
        assert!((out.params[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn respects_bounds() {
        // Unconstrained optimum at p = -2; the box forces p >= 0.
        let residuals =
            |p: &[f64]| -> Option<Vec<f64>> { Some(vec![p[0] + 2.0, 0.5 * (p[0] + 2.0)]) };
        let out = minimize(residuals, &[5.0], &[Bound::at_least(0.0)], &LmConfig::default());
        assert!(out.converged());
        assert_eq!(out.params[0], 0.0);
    }

    #[test]
    fn invalid_start_is_reported() {
        let residuals = |_: &[f64]| -> Option<Vec<f64>> { Some(vec![f64::NAN]) };
        let out = minimize(residuals, &[1.0], &[Bound::unbounded()], &LmConfig::default());
        assert_eq!(out.termination, Termination::InvalidStart);
        assert!(!out.converged());
    }

    #[test]
    fn iteration_cap_is_not_convergence() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let residuals = |p: &[f64]| -> Option<Vec<f64>> {
            Some(xs.iter().map(|&x| 3.0 * (-0.5 * x).exp() - p[0] * (-p[1] * x).exp()).collect())
        };
        let config = LmConfig {
            max_iterations: 1,
            ..LmConfig::default()
        };
        let out = minimize(residuals, &[1.0, 0.1], &[Bound::unbounded(); 2], &config);
        assert_eq!(out.termination, Termination::MaxIterations);
        assert!(!out.converged());
    }

    #[test]
    fn standard_errors_are_zero_without_degrees_of_freedom() {
        let residuals = |p: &[f64]| -> Option<Vec<f64>> { Some(vec![p[0] - 1.0]) };
        let out = minimize(residuals, &[0.0], &[Bound::unbounded()], &LmConfig::default());
        assert_eq!(out.standard_errors(), vec![0.0]);
    }
}
