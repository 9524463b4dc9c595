use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{FailureReason, FitFailure, PeakBatch, PeakFitResult, ProfileKind, Trace};
use crate::math::{minimize, Bound, LmConfig, LmOutcome, Termination};
use crate::peaks::profile::{
    pseudo_voigt, pseudo_voigt_fwhm, voigt, voigt_eta, voigt_fwhm, voigt_peak_height,
};

/// Fewest samples a fit window may hold.
pub const MIN_WINDOW_SAMPLES: usize = 5;

const SEED_WIDTH: f64 = 0.1;
const SEED_ETA: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct PeakFitOptions {
    /// Samples with `|x - candidate| < half_window` enter the fit; also the
    /// allowed center shift and the width ceiling.
    pub half_window: f64,
    pub profile: ProfileKind,
    pub lm: LmConfig,
}

impl Default for PeakFitOptions {
    fn default() -> Self {
        Self {
            half_window: 3.0,
            profile: ProfileKind::PseudoVoigt,
            lm: LmConfig::default(),
        }
    }
}

/// Fit one peak profile around `candidate_x`.
///
/// Only the samples inside the window are used; the trace is not modified.
pub fn fit_peak(
    trace: &Trace,
    candidate_x: f64,
    opts: &PeakFitOptions,
) -> Result<PeakFitResult, FitFailure> {
    let fail = |reason| FitFailure {
        candidate_x,
        reason,
    };

    let Some(seed_idx) = trace.nearest_index(candidate_x) else {
        return Err(fail(FailureReason::InsufficientWindow));
    };
    let (xs, ys): (Vec<f64>, Vec<f64>) = trace
        .x()
        .iter()
        .zip(trace.y())
        .filter(|(x, _)| (*x - candidate_x).abs() < opts.half_window)
        .map(|(&x, &y)| (x, y))
        .unzip();
    if xs.len() < MIN_WINDOW_SAMPLES {
        return Err(fail(FailureReason::InsufficientWindow));
    }

    let window = Window {
        xs: &xs,
        ys: &ys,
        candidate_x,
        half_window: opts.half_window,
        seed_height: trace.y()[seed_idx],
    };
    let result = match opts.profile {
        ProfileKind::PseudoVoigt => window.fit_pseudo_voigt(&opts.lm),
        ProfileKind::Voigt => window.fit_voigt(&opts.lm),
    };
    result.map_err(fail)
}

/// Fit every candidate independently.
///
/// Candidates run in parallel; results and failures keep the candidate order.
/// A failed candidate never affects the others.
pub fn fit_peaks(trace: &Trace, candidates: &[f64], opts: &PeakFitOptions) -> PeakBatch {
    let outcomes: Vec<Result<PeakFitResult, FitFailure>> = candidates
        .par_iter()
        .map(|&candidate_x| fit_peak(trace, candidate_x, opts))
        .collect();

    let mut batch = PeakBatch::default();
    for outcome in outcomes {
        match outcome {
            Ok(result) => {
                debug!(
                    candidate = result.candidate_x,
                    center = result.center,
                    fwhm = result.fwhm,
                    "peak fitted"
                );
                batch.results.push(result);
            }
            Err(failure) => {
                warn!(
                    candidate = failure.candidate_x,
                    reason = %failure.reason,
                    "peak fit failed"
                );
                batch.failures.push(failure);
            }
        }
    }

    info!(
        profile = opts.profile.display_name(),
        fitted = batch.results.len(),
        failed = batch.failures.len(),
        "peak batch finished"
    );
    batch
}

struct Window<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    candidate_x: f64,
    half_window: f64,
    seed_height: f64,
}

impl Window<'_> {
    fn shape_bounds(&self) -> [Bound; 4] {
        let hw = self.half_window;
        [
            Bound::at_least(0.0),
            Bound::new(self.candidate_x - hw, self.candidate_x + hw),
            Bound::new(0.0, hw),
            Bound::new(0.0, hw),
        ]
    }

    fn fit_pseudo_voigt(&self, lm: &LmConfig) -> Result<PeakFitResult, FailureReason> {
        let residuals = |p: &[f64]| -> Option<Vec<f64>> {
            Some(
                self.xs
                    .iter()
                    .zip(self.ys)
                    .map(|(&x, &y)| y - pseudo_voigt(x, p[0], p[1], p[2], p[3], p[4]))
                    .collect(),
            )
        };
        let seed = [
            self.seed_height,
            self.candidate_x,
            SEED_WIDTH,
            SEED_WIDTH,
            SEED_ETA,
        ];
        let [a, c, s, g] = self.shape_bounds();
        let bounds = [a, c, s, g, Bound::new(0.0, 1.0)];

        let p = accept(minimize(residuals, &seed, &bounds, lm))?;
        Ok(PeakFitResult {
            profile: ProfileKind::PseudoVoigt,
            candidate_x: self.candidate_x,
            amplitude: p.params[0],
            center: p.params[1],
            sigma: p.params[2],
            gamma: p.params[3],
            eta: p.params[4],
            fwhm: pseudo_voigt_fwhm(p.params[2], p.params[3], p.params[4]),
            rms: p.rms,
        })
    }

    fn fit_voigt(&self, lm: &LmConfig) -> Result<PeakFitResult, FailureReason> {
        let residuals = |p: &[f64]| -> Option<Vec<f64>> {
            Some(
                self.xs
                    .iter()
                    .zip(self.ys)
                    .map(|(&x, &y)| y - voigt(x, p[0], p[1], p[2], p[3]))
                    .collect(),
            )
        };
        // The amplitude is an area here; seed it from the observed height.
        let seed_area = self.seed_height.max(0.0) / voigt_peak_height(SEED_WIDTH, SEED_WIDTH);
        let seed = [seed_area, self.candidate_x, SEED_WIDTH, SEED_WIDTH];

        let p = accept(minimize(residuals, &seed, &self.shape_bounds(), lm))?;
        let (sigma, gamma) = (p.params[2], p.params[3]);
        Ok(PeakFitResult {
            profile: ProfileKind::Voigt,
            candidate_x: self.candidate_x,
            amplitude: p.params[0],
            center: p.params[1],
            sigma,
            gamma,
            eta: voigt_eta(sigma, gamma),
            fwhm: voigt_fwhm(sigma, gamma),
            rms: p.rms,
        })
    }
}

struct Accepted {
    params: Vec<f64>,
    rms: f64,
}

fn accept(outcome: LmOutcome) -> Result<Accepted, FailureReason> {
    if outcome.termination == Termination::InvalidStart {
        return Err(FailureReason::ModelMismatch);
    }
    if !outcome.converged() || outcome.params.iter().any(|v| !v.is_finite()) {
        return Err(FailureReason::NoConvergence);
    }
    let m = outcome.residuals.len().max(1);
    Ok(Accepted {
        rms: (outcome.cost / m as f64).sqrt(),
        params: outcome.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::locator::find_peaks;

    fn pv_trace(step: f64, n: usize, a: f64, c: f64, s: f64, g: f64, eta: f64) -> Trace {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * step).collect();
        let y = x.iter().map(|&x| pseudo_voigt(x, a, c, s, g, eta)).collect();
        Trace::new(x, y).unwrap()
    }

    #[test]
    fn gaussian_bump_on_coarse_grid() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                10.0 * (-(x - 5.0).powi(2) / 2.0).exp() + 0.05 * (i as f64 * 1.7).sin()
            })
            .collect();
        let trace = Trace::new(x, y).unwrap();

        let candidates = find_peaks(&trace);
        assert_eq!(candidates.len(), 1);
        let batch = fit_peaks(&trace, &candidates, &PeakFitOptions::default());
        assert!(batch.failures.is_empty(), "{:?}", batch.failures);

        let peak = &batch.results[0];
        assert!((peak.center - 5.0).abs() < 0.1, "center {}", peak.center);
        assert!((peak.amplitude - 10.0).abs() < 1.0, "amplitude {}", peak.amplitude);
    }

    #[test]
    fn recovers_pseudo_voigt_parameters() {
        let trace = pv_trace(0.05, 400, 50.0, 10.0, 0.3, 0.2, 0.4);
        let peak = fit_peak(&trace, 10.1, &PeakFitOptions::default()).unwrap();
        assert!((peak.center - 10.0).abs() < 1e-3);
        assert!((peak.amplitude - 50.0).abs() < 0.5);
        assert!((peak.sigma - 0.3).abs() < 0.01);
        assert!((peak.gamma - 0.2).abs() < 0.01);
        assert!((peak.eta - 0.4).abs() < 0.02);
        assert!(peak.rms < 1e-3);
    }

    #[test]
    fn fitted_parameters_stay_inside_bounds() {
        // Skewed, noisy-looking data that no pseudo-Voigt matches exactly.
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&x| {
                let skew = if x > 5.0 { 0.8 } else { 0.2 };
                30.0 * (-(x - 5.0).powi(2) / (2.0 * skew * skew)).exp()
                    + 0.7 * (x * 13.0).sin()
            })
            .collect();
        let trace = Trace::new(x, y).unwrap();
        let opts = PeakFitOptions::default();
        let peak = fit_peak(&trace, 5.0, &opts).unwrap();

        assert!(peak.amplitude >= 0.0);
        assert!((peak.center - 5.0).abs() <= opts.half_window);
        assert!(peak.sigma >= 0.0 && peak.sigma <= opts.half_window);
        assert!(peak.gamma >= 0.0 && peak.gamma <= opts.half_window);
        assert!((0.0..=1.0).contains(&peak.eta));
    }

    #[test]
    fn sparse_window_is_rejected_without_fitting() {
        let trace = Trace::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 50.0],
            vec![0.0, 1.0, 5.0, 1.0, 0.0, 3.0],
        )
        .unwrap();
        let failure = fit_peak(&trace, 50.0, &PeakFitOptions::default()).unwrap_err();
        assert_eq!(failure.reason, FailureReason::InsufficientWindow);
        assert_eq!(failure.candidate_x, 50.0);
    }

    #[test]
    fn one_bad_candidate_does_not_sink_the_batch() {
        let mut x: Vec<f64> = (0..400).map(|i| i as f64 * 0.05).collect();
        x.extend([30.0, 40.0, 50.0]);
        let y: Vec<f64> = x
            .iter()
            .map(|&x| {
                pseudo_voigt(x, 20.0, 5.0, 0.2, 0.1, 0.3)
                    + pseudo_voigt(x, 12.0, 14.0, 0.25, 0.1, 0.6)
            })
            .collect();
        let trace = Trace::new(x, y).unwrap();

        let batch = fit_peaks(&trace, &[5.0, 40.0, 14.0], &PeakFitOptions::default());
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].candidate_x, 40.0);
        assert_eq!(batch.failures[0].reason, FailureReason::InsufficientWindow);
        // Order follows the candidates.
        assert!((batch.results[0].center - 5.0).abs() < 0.01);
        assert!((batch.results[1].center - 14.0).abs() < 0.01);
    }

    #[test]
    fn voigt_fit_reports_area_amplitude() {
        let x: Vec<f64> = (0..400).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = x.iter().map(|&x| voigt(x, 5.0, 10.0, 0.25, 0.15)).collect();
        let trace = Trace::new(x, y).unwrap();
        let opts = PeakFitOptions {
            profile: ProfileKind::Voigt,
            ..PeakFitOptions::default()
        };
        let peak = fit_peak(&trace, 10.0, &opts).unwrap();
        assert_eq!(peak.profile, ProfileKind::Voigt);
        assert!((peak.center - 10.0).abs() < 1e-3);
        assert!((peak.amplitude - 5.0).abs() < 0.1, "area {}", peak.amplitude);
        assert!((peak.fwhm - voigt_fwhm(0.25, 0.15)).abs() < 0.01);
        assert!(peak.eta > 0.0 && peak.eta < 1.0);
    }
}
