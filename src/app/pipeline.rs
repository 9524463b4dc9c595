//! Shared workflows used by the `peaks`, `eos` and `demo` commands.
//!
//! Peaks: smooth -> background -> candidates -> fit.
//! EoS: seed -> refine (plain, auto or multi-strategy) -> report.
//!
//! The commands then focus on presentation and exports.

use tracing::warn;

use crate::domain::{EosFitResult, EosMode, LockFlags, SmoothingMethod, Trace};
use crate::eos::{EosKind, StrategyReport};
use crate::error::{FitError, Result};
use crate::peaks::{PeakFitOptions, PeakSearch};
use crate::session::{EosSession, FitSource, PeakSession};

/// Resolved settings for one peak run.
#[derive(Debug, Clone)]
pub struct PeakPipeline {
    pub smoothing: SmoothingMethod,
    /// Windows for automatic background anchors; 0 skips background removal.
    pub background_windows: usize,
    pub search: PeakSearch,
    /// Hand-picked candidates. Empty means "search automatically".
    pub candidates: Vec<f64>,
    pub fit: PeakFitOptions,
}

impl Default for PeakPipeline {
    fn default() -> Self {
        Self {
            smoothing: SmoothingMethod::None,
            background_windows: crate::signal::DEFAULT_BACKGROUND_WINDOWS,
            search: PeakSearch::default(),
            candidates: Vec::new(),
            fit: PeakFitOptions::default(),
        }
    }
}

/// Execute the peak workflow on one pattern.
pub fn run_peaks(trace: Trace, config: &PeakPipeline) -> Result<PeakSession> {
    let mut session = PeakSession::new(trace);
    session.search = config.search;
    session.smooth(config.smoothing);

    if config.background_windows > 0 {
        session.auto_select_background(config.background_windows);
        match session.subtract_background() {
            Ok(()) => {}
            // Too short for the requested windows: keep the raw working copy.
            Err(FitError::InsufficientData { required, actual, .. }) => {
                warn!(required, actual, "background removal skipped");
            }
            Err(err) => return Err(err),
        }
    }

    if config.candidates.is_empty() {
        session.find_peaks();
    } else {
        for &x in &config.candidates {
            session.add_candidate(x)?;
        }
    }

    if session.candidates().is_empty() {
        warn!("no peak candidates; nothing to fit");
        return Ok(session);
    }
    session.fit_peaks(&config.fit)?;
    Ok(session)
}

/// Explicit starting values; `None` keeps the smart guess.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StartValues {
    pub v0: Option<f64>,
    pub b0: Option<f64>,
    pub b0_prime: Option<f64>,
}

/// Resolved settings for one EoS run.
#[derive(Debug, Clone)]
pub struct EosPipeline {
    pub model: EosKind,
    pub mode: EosMode,
    pub start: StartValues,
    pub locks: LockFlags,
    pub regularization: f64,
    pub regularization_target: f64,
}

impl Default for EosPipeline {
    fn default() -> Self {
        Self {
            model: EosKind::default(),
            mode: EosMode::default(),
            start: StartValues::default(),
            locks: LockFlags::NONE,
            regularization: 0.0,
            regularization_target: 4.0,
        }
    }
}

/// All outputs of one EoS run.
#[derive(Debug, Clone)]
pub struct EosRun {
    pub session: EosSession,
    pub result: EosFitResult,
    /// Set for [`EosMode::Auto`].
    pub source: Option<FitSource>,
    /// Set for [`EosMode::Strategies`].
    pub strategies: Option<StrategyReport>,
}

/// Execute the EoS workflow on one P–V data set.
pub fn run_eos(volumes: Vec<f64>, pressures: Vec<f64>, config: &EosPipeline) -> Result<EosRun> {
    let mut session = EosSession::new(volumes, pressures, config.model)?;
    let fitter = session.fitter_mut();
    fitter.regularization_strength = config.regularization;
    fitter.regularization_target = config.regularization_target;

    let guess = *session.parameters();
    let mut start = guess;
    start.v0 = config.start.v0.unwrap_or(guess.v0);
    start.b0 = config.start.b0.unwrap_or(guess.b0);
    start.b0_prime = config.start.b0_prime.unwrap_or(guess.b0_prime);
    session.set_parameters(start);
    session.set_locks(config.locks);

    let (result, source, strategies) = match config.mode {
        EosMode::Fit => (session.fit_unlocked()?, None, None),
        EosMode::Auto => {
            let auto = session.auto_fit();
            (auto.result, Some(auto.source), None)
        }
        EosMode::Strategies => {
            let report = session.fit_multiple_strategies();
            let result = match report.best_result() {
                Some(best) => best.clone(),
                None => EosFitResult::failed(*session.parameters(), "every fit strategy failed"),
            };
            (result, None, Some(report))
        }
    };

    Ok(EosRun {
        session,
        result,
        source,
        strategies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{diffraction_pattern, eos_dataset, SyntheticPeak};
    use crate::domain::EosParameters;

    #[test]
    fn peak_pipeline_with_manual_candidates() {
        let peaks = [
            SyntheticPeak::new(12.0, 300.0, 0.08),
            SyntheticPeak::new(18.5, 180.0, 0.1),
        ];
        let trace = diffraction_pattern(10.0, 25.0, 1500, &peaks, 0.0, 1).unwrap();
        let config = PeakPipeline {
            candidates: vec![18.45, 12.02],
            ..PeakPipeline::default()
        };
        let session = run_peaks(trace, &config).unwrap();
        assert_eq!(session.candidates(), &[12.02, 18.45]);
        let results = &session.results().results;
        assert_eq!(results.len(), 2);
        assert!((results[0].center - 12.0).abs() < 0.05);
    }

    #[test]
    fn short_pattern_skips_background_removal() {
        let x: Vec<f64> = (0..12).map(|i| 10.0 + 0.1 * i as f64).collect();
        let y = x
            .iter()
            .map(|&x| 5.0 + 100.0 * (-(x - 10.55).powi(2) / (2.0 * 0.15f64.powi(2))).exp())
            .collect();
        let trace = Trace::new(x, y).unwrap();

        let session = run_peaks(trace, &PeakPipeline::default()).unwrap();
        assert!(session.anchors().is_empty());
        assert_eq!(session.working(), session.original());
    }

    #[test]
    fn flat_pattern_yields_an_empty_batch() {
        let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let trace = Trace::new(x, vec![10.0; 200]).unwrap();

        let session = run_peaks(trace, &PeakPipeline::default()).unwrap();
        assert!(session.candidates().is_empty());
        assert!(session.results().results.is_empty());
        assert!(session.results().failures.is_empty());
    }

    #[test]
    fn eos_pipeline_applies_start_values_and_locks() {
        let truth = EosParameters::new(11.5, 130.0, 4.0);
        let (v, p) = eos_dataset(&EosKind::Bm3, &truth, 11.4, 9.6, 12, 0.0, 5).unwrap();
        let config = EosPipeline {
            start: StartValues {
                b0_prime: Some(4.0),
                ..StartValues::default()
            },
            locks: LockFlags {
                b0_prime: true,
                ..LockFlags::NONE
            },
            ..EosPipeline::default()
        };
        let run = run_eos(v, p, &config).unwrap();
        assert!(run.result.success);
        assert_eq!(run.result.params.b0_prime, 4.0);
        assert!((run.result.params.v0 - 11.5).abs() < 0.01);
        assert!(run.source.is_none());
    }

    #[test]
    fn eos_pipeline_strategies_mode_reports_attempts() {
        let truth = EosParameters::new(11.5, 130.0, 4.0);
        let (v, p) = eos_dataset(&EosKind::Vinet, &truth, 11.4, 9.6, 12, 0.0, 5).unwrap();
        let config = EosPipeline {
            model: EosKind::Vinet,
            mode: EosMode::Strategies,
            ..EosPipeline::default()
        };
        let run = run_eos(v, p, &config).unwrap();
        let report = run.strategies.unwrap();
        assert_eq!(report.attempts.len(), 5);
        assert!(run.result.success);
    }
}
