use tracing::debug;

use crate::domain::{EosFitResult, EosParameters, LockFlags, ParameterErrors};
use crate::eos::models::PressureModel;
use crate::eos::params::{check_data, compute_metrics, evaluate, residuals};
use crate::math::{minimize, Bound, LmConfig, Termination};

/// Box constraints on `(V0, B0, B0')`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EosBounds {
    pub v0: Bound,
    pub b0: Bound,
    pub b0_prime: Bound,
}

impl Default for EosBounds {
    fn default() -> Self {
        Self {
            v0: Bound::at_least(1e-9),
            b0: Bound::at_least(1e-9),
            b0_prime: Bound::new(1.0, 10.0),
        }
    }
}

impl EosBounds {
    fn to_array(self) -> [Bound; 3] {
        [self.v0, self.b0, self.b0_prime]
    }
}

/// Seed used when no better starting point is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialGuess {
    /// `V0 = max(V) · (1 + volume_margin)`.
    pub volume_margin: f64,
    pub b0: f64,
    pub b0_prime: f64,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            volume_margin: 0.02,
            b0: 130.0,
            b0_prime: 4.0,
        }
    }
}

/// Bounded least-squares refinement of EoS parameters with per-parameter
/// locks and an optional pull of B0' toward `regularization_target`.
#[derive(Debug, Clone)]
pub struct EosFitter<M> {
    model: M,
    pub regularization_strength: f64,
    pub regularization_target: f64,
    pub bounds: EosBounds,
    pub guess: InitialGuess,
    pub lm: LmConfig,
}

impl<M: PressureModel> EosFitter<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            regularization_strength: 0.0,
            regularization_target: 4.0,
            bounds: EosBounds::default(),
            guess: InitialGuess::default(),
            lm: LmConfig::default(),
        }
    }

    pub fn with_regularization(mut self, strength: f64) -> Self {
        self.regularization_strength = strength;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Rebind to another pressure function, keeping every setting.
    pub fn with_model<N: PressureModel>(self, model: N) -> EosFitter<N> {
        EosFitter {
            model,
            regularization_strength: self.regularization_strength,
            regularization_target: self.regularization_target,
            bounds: self.bounds,
            guess: self.guess,
            lm: self.lm,
        }
    }

    /// `V0` just above the largest observed volume (the uncompressed cell is
    /// larger than any compressed one), `B0` and `B0'` from the defaults.
    pub fn smart_initial_guess(&self, volumes: &[f64]) -> EosParameters {
        let v_max = volumes
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let v0 = if v_max.is_finite() {
            v_max * (1.0 + self.guess.volume_margin)
        } else {
            1.0
        };
        EosParameters::new(v0, self.guess.b0, self.guess.b0_prime)
    }

    /// `locks` plus B0' when the model form pins it.
    pub fn effective_locks(&self, locks: LockFlags) -> LockFlags {
        LockFlags {
            b0_prime: locks.b0_prime || self.model.fixed_b0_prime().is_some(),
            ..locks
        }
    }

    /// Refine the unlocked parameters starting from `initial`.
    ///
    /// Never fails loudly: bad input, model-domain errors and
    /// non-convergence come back as `success == false` with the starting
    /// parameters. Locked values are copied from `initial` bit for bit. A B0'
    /// pinned by the model form is locked at that value. With every parameter
    /// locked the result simply evaluates `initial`.
    pub fn fit(
        &self,
        volumes: &[f64],
        pressures: &[f64],
        initial: &EosParameters,
        locks: LockFlags,
    ) -> EosFitResult {
        let mut pinned = *initial;
        if let Some(bp) = self.model.fixed_b0_prime() {
            pinned.b0_prime = bp;
        }
        let initial = &pinned;
        let locks = self.effective_locks(locks);

        if let Err(err) = check_data(volumes, pressures) {
            return EosFitResult::failed(*initial, err.to_string());
        }
        if locks.all_locked() {
            return match evaluate(&self.model, initial, volumes, pressures) {
                Ok(eval) => EosFitResult {
                    success: true,
                    params: eval.params,
                    errors: ParameterErrors::default(),
                    rms: eval.metrics.rmse,
                    chi_squared: eval.metrics.chi_squared,
                    r_squared: eval.metrics.r_squared,
                    iterations: 0,
                    message: "all parameters locked; evaluated at the given values".to_string(),
                },
                Err(err) => EosFitResult::failed(*initial, err.to_string()),
            };
        }

        let start = initial.to_array();
        let free: Vec<usize> = locks
            .to_array()
            .iter()
            .enumerate()
            .filter_map(|(i, locked)| (!locked).then_some(i))
            .collect();
        let all_bounds = self.bounds.to_array();
        let bounds: Vec<Bound> = free.iter().map(|&i| all_bounds[i]).collect();
        let seed: Vec<f64> = free.iter().map(|&i| start[i]).collect();

        let assemble = |values: &[f64]| -> EosParameters {
            let mut full = start;
            for (&i, &v) in free.iter().zip(values) {
                full[i] = v;
            }
            EosParameters::from_array(full, initial.b0_double_prime)
        };
        let regularize = !locks.b0_prime && self.regularization_strength > 0.0;
        let weight = self.regularization_strength.max(0.0).sqrt();

        let objective = |values: &[f64]| -> Option<Vec<f64>> {
            let params = assemble(values);
            let mut r = residuals(&self.model, &params, volumes, pressures).ok()?;
            if regularize {
                r.push(weight * (params.b0_prime - self.regularization_target));
            }
            Some(r)
        };

        let outcome = minimize(objective, &seed, &bounds, &self.lm);
        debug!(
            model = self.model.name(),
            iterations = outcome.iterations,
            termination = ?outcome.termination,
            cost = outcome.cost,
            "EoS fit finished"
        );

        if outcome.termination == Termination::InvalidStart {
            return EosFitResult::failed(
                *initial,
                format!("{} cannot be evaluated at the starting parameters", self.model.name()),
            );
        }
        if !outcome.converged() {
            let mut failed = EosFitResult::failed(
                *initial,
                format!("no convergence after {} iterations", outcome.iterations),
            );
            failed.iterations = outcome.iterations;
            return failed;
        }

        let mut params = assemble(&outcome.params);
        let data_residuals = match residuals(&self.model, &params, volumes, pressures) {
            Ok(r) => r,
            Err(err) => return EosFitResult::failed(*initial, err.to_string()),
        };

        let mut errors = [0.0; 3];
        for (&i, e) in free.iter().zip(outcome.standard_errors()) {
            errors[i] = e;
        }
        let errors = ParameterErrors {
            v0: errors[0],
            b0: errors[1],
            b0_prime: errors[2],
        };
        let metrics = compute_metrics(&data_residuals, pressures, free.len(), errors);
        params.b0_double_prime = Some(
            params
                .b0_double_prime
                .unwrap_or_else(|| self.model.implied_b0_double_prime(&params)),
        );

        EosFitResult {
            success: true,
            params,
            errors,
            rms: metrics.rmse,
            chi_squared: metrics.chi_squared,
            r_squared: metrics.r_squared,
            iterations: outcome.iterations,
            message: format!("converged ({:?})", outcome.termination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eos::models::EosKind;

    fn synthetic() -> (Vec<f64>, Vec<f64>) {
        let truth = EosParameters::new(11.5, 130.0, 4.0);
        let volumes: Vec<f64> = (0..20).map(|i| 11.5 - 0.1 * i as f64).collect();
        let pressures = volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                EosKind::Bm3.pressure(v, &truth).unwrap() + 1e-4 * (3.1 * i as f64).sin()
            })
            .collect();
        (volumes, pressures)
    }

    fn within(actual: f64, expected: f64, rel: f64) -> bool {
        ((actual - expected) / expected).abs() < rel
    }

    #[test]
    fn recovers_birch_murnaghan_third_order() {
        let (v, p) = synthetic();
        let fitter = EosFitter::new(EosKind::Bm3);
        let seed = fitter.smart_initial_guess(&v);
        let result = fitter.fit(&v, &p, &seed, LockFlags::NONE);

        assert!(result.success, "{}", result.message);
        assert!(within(result.params.v0, 11.5, 0.01));
        assert!(within(result.params.b0, 130.0, 0.01));
        assert!(within(result.params.b0_prime, 4.0, 0.01));
        assert!(result.r_squared > 0.999);
        assert!(result.errors.b0 > 0.0);
    }

    #[test]
    fn locked_b0_prime_is_kept_exactly() {
        let (v, p) = synthetic();
        let fitter = EosFitter::new(EosKind::Bm3);
        let mut seed = fitter.smart_initial_guess(&v);
        seed.b0_prime = 4.5;
        let locks = LockFlags {
            b0_prime: true,
            ..LockFlags::NONE
        };
        let result = fitter.fit(&v, &p, &seed, locks);

        assert!(result.success, "{}", result.message);
        assert_eq!(result.params.b0_prime.to_bits(), 4.5f64.to_bits());
        assert_eq!(result.errors.b0_prime, 0.0);
        assert!(within(result.params.v0, 11.5, 0.01));
        assert!(within(result.params.b0, 130.0, 0.10));
    }

    #[test]
    fn locked_values_are_bit_exact_even_outside_bounds() {
        let (v, p) = synthetic();
        let fitter = EosFitter::new(EosKind::Bm3);
        // 0.1 + 0.2 is not representable as 0.3; the exact bits must survive.
        let odd = 11.0 + (0.1 + 0.2);
        let seed = EosParameters::new(odd, 130.0, 12.0);
        let locks = LockFlags {
            v0: true,
            b0: false,
            b0_prime: true,
        };
        let result = fitter.fit(&v, &p, &seed, locks);
        assert_eq!(result.params.v0.to_bits(), odd.to_bits());
        assert_eq!(result.params.b0_prime.to_bits(), 12.0f64.to_bits());
    }

    #[test]
    fn all_locked_evaluates_the_input() {
        let (v, p) = synthetic();
        let fitter = EosFitter::new(EosKind::Bm3);
        let seed = EosParameters::new(11.5, 130.0, 4.0);
        let locks = LockFlags {
            v0: true,
            b0: true,
            b0_prime: true,
        };
        let result = fitter.fit(&v, &p, &seed, locks);
        assert!(result.success);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.params.v0, 11.5);
        assert!(result.rms < 1e-3);
    }

    #[test]
    fn bad_input_fails_softly() {
        let fitter = EosFitter::new(EosKind::Bm3);
        let seed = EosParameters::new(11.5, 130.0, 4.0);

        let mismatched = fitter.fit(&[10.0, 11.0], &[1.0], &seed, LockFlags::NONE);
        assert!(!mismatched.success);
        assert_eq!(mismatched.params, seed);

        let empty = fitter.fit(&[], &[], &seed, LockFlags::NONE);
        assert!(!empty.success);
        assert!(empty.rms.is_infinite());
    }

    #[test]
    fn model_domain_error_at_start_fails_softly() {
        let fitter = EosFitter::new(EosKind::Bm3);
        let seed = EosParameters::new(11.5, 130.0, 4.0);
        let volumes = [-1.0, 10.0, 9.0, 8.0];
        let pressures = [0.0, 1.0, 2.0, 3.0];
        let result = fitter.fit(&volumes, &pressures, &seed, LockFlags::NONE);
        assert!(!result.success);
        assert!(result.message.contains("cannot be evaluated"));
    }

    #[test]
    fn regularization_pulls_b0_prime_toward_target() {
        let (v, p) = synthetic();
        let seed = EosParameters::new(11.7, 130.0, 4.0);
        let mut fitter = EosFitter::new(EosKind::Bm3);
        fitter.regularization_target = 6.0;

        let free = fitter.fit(&v, &p, &seed, LockFlags::NONE);
        let pulled = fitter
            .clone()
            .with_regularization(1e4)
            .fit(&v, &p, &seed, LockFlags::NONE);
        assert!(free.success && pulled.success);
        assert!(pulled.params.b0_prime > free.params.b0_prime + 0.1);
    }

    #[test]
    fn regularization_is_ignored_when_b0_prime_is_locked() {
        let (v, p) = synthetic();
        let seed = EosParameters::new(11.7, 125.0, 4.5);
        let locks = LockFlags {
            b0_prime: true,
            ..LockFlags::NONE
        };
        let plain = EosFitter::new(EosKind::Bm3);
        let mut pulled = EosFitter::new(EosKind::Bm3).with_regularization(1e4);
        pulled.regularization_target = 6.0;

        let a = plain.fit(&v, &p, &seed, locks);
        let b = pulled.fit(&v, &p, &seed, locks);
        assert!(a.success && b.success);
        assert_eq!(a.params.v0.to_bits(), b.params.v0.to_bits());
        assert_eq!(a.params.b0.to_bits(), b.params.b0.to_bits());
        assert_eq!(b.params.b0_prime, 4.5);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.rms, b.rms);
    }

    #[test]
    fn bm2_refines_two_parameters_with_real_errors() {
        let truth = EosParameters::new(11.5, 130.0, 4.0);
        let (v, p) = crate::data::synthetic::eos_dataset(
            &EosKind::Bm2,
            &truth,
            11.4,
            9.6,
            15,
            0.05,
            3,
        )
        .unwrap();
        let fitter = EosFitter::new(EosKind::Bm2);
        let seed = EosParameters::new(11.7, 110.0, 6.0);
        let result = fitter.fit(&v, &p, &seed, LockFlags::NONE);

        assert!(result.success, "{}", result.message);
        assert_eq!(result.params.b0_prime, 4.0);
        assert!(result.errors.v0 > 0.0);
        assert!(result.errors.b0 > 0.0);
        assert_eq!(result.errors.b0_prime, 0.0);
        assert!(within(result.params.v0, 11.5, 0.01));
        assert!(within(result.params.b0, 130.0, 0.05));

        let locks = fitter.effective_locks(LockFlags::NONE);
        assert!(locks.b0_prime && !locks.v0 && !locks.b0);
    }

    #[test]
    fn smart_guess_sits_above_the_largest_volume() {
        let fitter = EosFitter::new(EosKind::Vinet);
        let guess = fitter.smart_initial_guess(&[9.0, 10.0, 9.5]);
        assert!((guess.v0 - 10.2).abs() < 1e-12);
        assert_eq!(guess.b0, 130.0);
        assert_eq!(guess.b0_prime, 4.0);
    }
}
