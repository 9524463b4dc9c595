use tracing::{info, warn};

use crate::domain::{EosFitResult, EosParameters, EvaluatedParameters, LockFlags, ParameterErrors};
use crate::eos::params::check_data;
use crate::eos::{self, EosFitter, EosKind, PressureModel, StrategyReport};
use crate::error::{FitError, Result};
use crate::report::{format_eos_report, CycleBlock};

/// Where the parameters of an [`EosSession::auto_fit`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitSource {
    SmartGuess,
    MultiStrategy,
    /// Every automatic attempt failed; the manual values were kept.
    ManualFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoFit {
    pub source: FitSource,
    pub result: EosFitResult,
}

/// Interactive EoS refinement over one P–V data set.
#[derive(Debug, Clone)]
pub struct EosSession {
    volumes: Vec<f64>,
    pressures: Vec<f64>,
    fitter: EosFitter<EosKind>,
    params: EosParameters,
    errors: ParameterErrors,
    locks: LockFlags,
    last_start: Option<EosParameters>,
}

impl EosSession {
    /// Start a session seeded with the smart initial guess.
    pub fn new(volumes: Vec<f64>, pressures: Vec<f64>, model: EosKind) -> Result<Self> {
        check_data(&volumes, &pressures)?;
        let fitter = EosFitter::new(model);
        let params = fitter.smart_initial_guess(&volumes);
        Ok(Self {
            volumes,
            pressures,
            fitter,
            params,
            errors: ParameterErrors::default(),
            locks: LockFlags::NONE,
            last_start: None,
        })
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn pressures(&self) -> &[f64] {
        &self.pressures
    }

    pub fn model(&self) -> EosKind {
        *self.fitter.model()
    }

    pub fn parameters(&self) -> &EosParameters {
        &self.params
    }

    pub fn errors(&self) -> &ParameterErrors {
        &self.errors
    }

    pub fn locks(&self) -> LockFlags {
        self.locks
    }

    /// The caller's locks plus any B0' the current model pins.
    pub fn effective_locks(&self) -> LockFlags {
        self.fitter.effective_locks(self.locks)
    }

    pub fn fitter(&self) -> &EosFitter<EosKind> {
        &self.fitter
    }

    /// Fitter settings (regularization, bounds, guess defaults).
    pub fn fitter_mut(&mut self) -> &mut EosFitter<EosKind> {
        &mut self.fitter
    }

    /// Switch pressure family. Current parameter values are kept.
    pub fn set_model(&mut self, model: EosKind) {
        self.fitter = self.fitter.clone().with_model(model);
        self.params.b0_double_prime = None;
    }

    pub fn set_parameters(&mut self, params: EosParameters) {
        self.params = params;
        self.errors = ParameterErrors::default();
    }

    pub fn set_locks(&mut self, locks: LockFlags) {
        self.locks = locks;
    }

    /// Metrics of the current values, without fitting.
    pub fn manual_fit(&self) -> Result<EvaluatedParameters> {
        eos::evaluate(self.fitter.model(), &self.params, &self.volumes, &self.pressures)
    }

    /// Back to the smart initial guess.
    pub fn reset_parameters(&mut self) -> &EosParameters {
        self.set_parameters(self.fitter.smart_initial_guess(&self.volumes));
        &self.params
    }

    /// Refine the unlocked parameters from the current values.
    ///
    /// The current values change only when the fit succeeds.
    pub fn fit_unlocked(&mut self) -> Result<EosFitResult> {
        if self.effective_locks().all_locked() {
            return Err(FitError::InvalidInput(
                "all parameters are locked; unlock at least one to fit".to_string(),
            ));
        }
        self.last_start = Some(self.params);
        let result = self
            .fitter
            .fit(&self.volumes, &self.pressures, &self.params, self.locks);
        if result.success {
            self.apply(&result);
        } else {
            warn!(message = %result.message, "fit of unlocked parameters failed");
        }
        Ok(result)
    }

    /// Smart-guess fit, then the retry strategies, then the manual values.
    pub fn auto_fit(&mut self) -> AutoFit {
        self.last_start = Some(self.params);

        let seed = self.fitter.smart_initial_guess(&self.volumes);
        let first = self
            .fitter
            .fit(&self.volumes, &self.pressures, &seed, LockFlags::NONE);
        if first.success {
            self.apply(&first);
            return AutoFit {
                source: FitSource::SmartGuess,
                result: first,
            };
        }
        info!(message = %first.message, "smart-guess fit failed, trying strategies");

        if let Some(best) =
            eos::best_fit(&self.fitter, &self.volumes, &self.pressures, &self.params)
        {
            self.apply(&best);
            return AutoFit {
                source: FitSource::MultiStrategy,
                result: best,
            };
        }

        warn!("every automatic fit failed, keeping the manual parameters");
        let mut result = EosFitResult::failed(
            self.params,
            "every automatic fit failed; manual parameters kept",
        );
        if let Ok(eval) = self.manual_fit() {
            result.params = eval.params;
            result.rms = eval.metrics.rmse;
            result.chi_squared = eval.metrics.chi_squared;
            result.r_squared = eval.metrics.r_squared;
        }
        AutoFit {
            source: FitSource::ManualFallback,
            result,
        }
    }

    /// Run the retry strategies from the current values.
    pub fn fit_multiple_strategies(&mut self) -> StrategyReport {
        self.last_start = Some(self.params);
        let report = eos::fit_with_multiple_strategies(
            &self.fitter,
            &self.volumes,
            &self.pressures,
            &self.params,
        );
        if let Some(best) = report.best_result().cloned() {
            self.apply(&best);
        }
        report
    }

    /// Refinement-style summary of the current values, plus the starting
    /// values of the last fit when they differ.
    pub fn report(&self) -> String {
        let mut blocks = vec![self.cycle_block(
            "RESULTS FROM CYCLE 1",
            &self.params,
            self.errors,
            self.last_start,
        )];
        if let Some(start) = self.last_start.filter(|s| *s != self.params) {
            blocks.push(self.cycle_block(
                "RESULTS FROM START",
                &start,
                ParameterErrors::default(),
                None,
            ));
        }
        format_eos_report(&blocks)
    }

    fn cycle_block(
        &self,
        title: &'static str,
        params: &EosParameters,
        errors: ParameterErrors,
        reference: Option<EosParameters>,
    ) -> CycleBlock {
        let model = self.fitter.model();
        let locks = self.effective_locks();
        let residuals =
            eos::params::residuals(model, params, &self.volumes, &self.pressures).ok();
        let metrics = residuals
            .as_deref()
            .map(|r| eos::compute_metrics(r, &self.pressures, locks.free_count(), errors));
        CycleBlock {
            title,
            params: *params,
            errors,
            reference,
            locks,
            b0_double_prime: params
                .b0_double_prime
                .unwrap_or_else(|| model.implied_b0_double_prime(params)),
            chi_squared: metrics.map(|m| m.chi_squared),
            max_delta_pressure: metrics.map(|m| m.max_abs_residual),
        }
    }

    /// Take the fitted V0, B0 and B0'. B0'' stays whatever the caller set,
    /// so an implied value never freezes into the next BM4 fit.
    fn apply(&mut self, result: &EosFitResult) {
        let b0_double_prime = self.params.b0_double_prime;
        self.params = result.params;
        self.params.b0_double_prime = b0_double_prime;
        self.errors = result.errors;
    }
}
