//! Scripted restarts of the EoS fit.
//!
//! The pressure functions are strongly nonlinear in B0', so a single local
//! fit can stall from a poor seed. The retry controller runs a short fixed
//! list of seeds, each as an independent unlocked fit, and keeps the
//! successful result with the lowest rms.

use tracing::{debug, info, warn};

use crate::domain::{EosFitResult, EosParameters, LockFlags};
use crate::eos::fitter::EosFitter;
use crate::eos::models::PressureModel;

/// Bulk moduli swept by the last strategy.
pub const B0_SWEEP: [f64; 3] = [100.0, 150.0, 200.0];

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub label: String,
    pub seed: EosParameters,
    pub result: EosFitResult,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyReport {
    /// Every attempt in the order it ran.
    pub attempts: Vec<StrategyAttempt>,
    /// Index into `attempts` of the selected result.
    pub best: Option<usize>,
}

impl StrategyReport {
    pub fn best_result(&self) -> Option<&EosFitResult> {
        self.best.map(|i| &self.attempts[i].result)
    }
}

/// Seeds in the order they are tried.
///
/// 1. the caller's current parameters
/// 2. `(V[0], 130, 4)`
/// 3. `(V[0], B0, 4)` for each `B0` in [`B0_SWEEP`]
pub fn strategy_seeds(volumes: &[f64], current: &EosParameters) -> Vec<(String, EosParameters)> {
    let mut seeds = vec![("current parameters".to_string(), *current)];
    if let Some(&v_first) = volumes.first() {
        seeds.push(("default seed".to_string(), EosParameters::new(v_first, 130.0, 4.0)));
        seeds.extend(
            B0_SWEEP
                .iter()
                .map(|&b0| (format!("B0 sweep {b0:.0}"), EosParameters::new(v_first, b0, 4.0))),
        );
    }
    seeds
}

/// Run every strategy and select the best successful attempt.
///
/// Ties keep the earlier attempt. `best` is `None` when every attempt failed;
/// the caller decides what to fall back to.
pub fn fit_with_multiple_strategies<M: PressureModel>(
    fitter: &EosFitter<M>,
    volumes: &[f64],
    pressures: &[f64],
    current: &EosParameters,
) -> StrategyReport {
    let mut report = StrategyReport::default();

    for (label, seed) in strategy_seeds(volumes, current) {
        let result = fitter.fit(volumes, pressures, &seed, LockFlags::NONE);
        if result.success {
            debug!(strategy = %label, rms = result.rms, "strategy converged");
        } else {
            warn!(strategy = %label, message = %result.message, "strategy failed");
        }

        let improves = result.success
            && report
                .best_result()
                .is_none_or(|best| result.rms < best.rms);
        report.attempts.push(StrategyAttempt {
            label,
            seed,
            result,
        });
        if improves {
            report.best = Some(report.attempts.len() - 1);
        }
    }

    match report.best_result() {
        Some(best) => info!(
            attempts = report.attempts.len(),
            rms = best.rms,
            "multi-strategy fit selected a result"
        ),
        None => warn!(attempts = report.attempts.len(), "every fit strategy failed"),
    }
    report
}

/// Just the winning result of [`fit_with_multiple_strategies`].
pub fn best_fit<M: PressureModel>(
    fitter: &EosFitter<M>,
    volumes: &[f64],
    pressures: &[f64],
    current: &EosParameters,
) -> Option<EosFitResult> {
    let report = fit_with_multiple_strategies(fitter, volumes, pressures, current);
    let best = report.best?;
    report.attempts.into_iter().nth(best).map(|a| a.result)
}
