//! Fit-quality metrics for an EoS parameter set.

use crate::domain::{EosParameters, EvaluatedParameters, FitMetrics, ParameterErrors};
use crate::eos::models::PressureModel;
use crate::error::{FitError, Result};

/// Metrics of a manually chosen parameter set against `(V, P)` data.
///
/// All three parameters count as free for χ², and no standard errors are
/// available.
pub fn evaluate(
    model: &dyn PressureModel,
    params: &EosParameters,
    volumes: &[f64],
    pressures: &[f64],
) -> Result<EvaluatedParameters> {
    check_data(volumes, pressures)?;
    let residuals = residuals(model, params, volumes, pressures)?;
    let mut params = *params;
    params.b0_double_prime = Some(
        params
            .b0_double_prime
            .unwrap_or_else(|| model.implied_b0_double_prime(&params)),
    );
    Ok(EvaluatedParameters {
        params,
        metrics: compute_metrics(&residuals, pressures, 3, ParameterErrors::default()),
    })
}

/// `P_obs − P_calc` per sample.
pub fn residuals(
    model: &dyn PressureModel,
    params: &EosParameters,
    volumes: &[f64],
    pressures: &[f64],
) -> Result<Vec<f64>> {
    volumes
        .iter()
        .zip(pressures)
        .map(|(&v, &p)| Ok(p - model.pressure(v, params)?))
        .collect()
}

/// R², RMSE, reduced χ² and the largest absolute residual.
///
/// - `R² = 1 − SS_res/SS_tot`, 0 when the observations are constant
/// - `χ² = SS_res/(n − n_free)`, plain `SS_res` without degrees of freedom
pub fn compute_metrics(
    residuals: &[f64],
    observed: &[f64],
    n_free: usize,
    errors: ParameterErrors,
) -> FitMetrics {
    let n = residuals.len();
    if n == 0 {
        return FitMetrics {
            errors,
            ..FitMetrics::default()
        };
    }

    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let mean = observed.iter().sum::<f64>() / observed.len().max(1) as f64;
    let ss_tot: f64 = observed.iter().map(|p| (p - mean).powi(2)).sum();

    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let chi_squared = if n > n_free {
        ss_res / (n - n_free) as f64
    } else {
        ss_res
    };

    FitMetrics {
        r_squared,
        rmse: (ss_res / n as f64).sqrt(),
        chi_squared,
        max_abs_residual: signed_max_abs(residuals),
        errors,
    }
}

/// The residual with the largest magnitude, sign kept.
fn signed_max_abs(residuals: &[f64]) -> f64 {
    residuals
        .iter()
        .copied()
        .fold(0.0, |best: f64, r| if r.abs() > best.abs() { r } else { best })
}

pub(crate) fn check_data(volumes: &[f64], pressures: &[f64]) -> Result<()> {
    if volumes.len() != pressures.len() {
        return Err(FitError::InvalidInput(format!(
            "volume and pressure lengths differ ({} vs {})",
            volumes.len(),
            pressures.len()
        )));
    }
    if volumes.is_empty() {
        return Err(FitError::InsufficientData {
            operation: "EoS evaluation",
            required: 1,
            actual: 0,
        });
    }
    if volumes.iter().chain(pressures).any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInput("non-finite P-V sample".to_string()));
    }
    Ok(())
}
