//! Synthetic diffraction patterns and compression data.
//!
//! Used by the `demo` subcommand and by tests that need realistic inputs.
//! Generation is deterministic for a given seed.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{EosParameters, Trace};
use crate::eos::PressureModel;
use crate::error::{FitError, Result};
use crate::peaks::pseudo_voigt;

/// Background level at the low end of a generated pattern.
const BASELINE_OFFSET: f64 = 20.0;
/// Background rise per unit of `x`.
const BASELINE_SLOPE: f64 = 0.5;

/// One reflection of a synthetic pattern (pseudo-Voigt, peak-height
/// normalized).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticPeak {
    pub center: f64,
    pub height: f64,
    pub sigma: f64,
    pub gamma: f64,
    pub eta: f64,
}

impl SyntheticPeak {
    /// A pure Gaussian reflection.
    pub fn new(center: f64, height: f64, sigma: f64) -> Self {
        Self {
            center,
            height,
            sigma,
            gamma: sigma,
            eta: 0.0,
        }
    }

    pub fn with_lorentzian(mut self, gamma: f64, eta: f64) -> Self {
        self.gamma = gamma;
        self.eta = eta;
        self
    }

    fn eval(&self, x: f64) -> f64 {
        pseudo_voigt(x, self.height, self.center, self.sigma, self.gamma, self.eta)
    }
}

/// `n` evenly spaced samples on `[x_min, x_max]`: a linear background plus
/// `peaks`, with optional Gaussian noise of standard deviation `noise_sd`.
pub fn diffraction_pattern(
    x_min: f64,
    x_max: f64,
    n: usize,
    peaks: &[SyntheticPeak],
    noise_sd: f64,
    seed: u64,
) -> Result<Trace> {
    if n < 2 || !(x_max > x_min) {
        return Err(FitError::InvalidInput(format!(
            "cannot sample {n} points on [{x_min}, {x_max}]"
        )));
    }
    let mut noise = noise_source(noise_sd, seed)?;

    let step = (x_max - x_min) / (n - 1) as f64;
    let x: Vec<f64> = (0..n).map(|i| x_min + step * i as f64).collect();
    let y = x
        .iter()
        .map(|&xi| {
            let background = BASELINE_OFFSET + BASELINE_SLOPE * (xi - x_min);
            let signal: f64 = peaks.iter().map(|p| p.eval(xi)).sum();
            background + signal + noise()
        })
        .collect();
    Trace::new(x, y)
}

/// Compression data for `model` at `params`: `n` volumes from `v_max` down to
/// `v_min` and the matching pressures with optional Gaussian noise.
pub fn eos_dataset<M: PressureModel + ?Sized>(
    model: &M,
    params: &EosParameters,
    v_max: f64,
    v_min: f64,
    n: usize,
    noise_sd: f64,
    seed: u64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if n < 2 || !(v_max > v_min) || v_min <= 0.0 {
        return Err(FitError::InvalidInput(format!(
            "cannot sample {n} volumes between {v_max} and {v_min}"
        )));
    }
    let mut noise = noise_source(noise_sd, seed)?;

    let step = (v_max - v_min) / (n - 1) as f64;
    let volumes: Vec<f64> = (0..n).map(|i| v_max - step * i as f64).collect();
    let pressures = model
        .pressures(&volumes, params)?
        .into_iter()
        .map(|p| p + noise())
        .collect();
    Ok((volumes, pressures))
}

fn noise_source(noise_sd: f64, seed: u64) -> Result<impl FnMut() -> f64> {
    let normal = Normal::new(0.0, noise_sd)
        .map_err(|e| FitError::InvalidInput(format!("noise level {noise_sd}: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(move || {
        if noise_sd > 0.0 {
            normal.sample(&mut rng)
        } else {
            0.0
        }
    })
}
