//! Shared domain types.
//!
//! These types are plain data so they can be:
//!
//! - passed between the preprocessing, peak and EoS stages
//! - exported to CSV/JSON
//! - moved across worker threads by callers (everything is `Send + Sync`)

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// An ordered series of `(x, y)` samples with strictly increasing `x`.
///
/// Diffraction patterns use `x = 2θ` (or Q) and `y = intensity`; EoS data uses
/// `x = volume` and `y = pressure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Trace {
    /// Build a trace, validating shape, finiteness and ordering of `x`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(FitError::InvalidTrace(format!(
                "x and y lengths differ ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::InvalidTrace("non-finite sample".to_string()));
        }
        if let Some(i) = x.windows(2).position(|w| w[1] <= w[0]) {
            return Err(FitError::InvalidTrace(format!(
                "x is not strictly increasing at index {}",
                i + 1
            )));
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Same abscissa, new ordinate. Used by the preprocessing steps, which
    /// never move samples along `x`.
    pub(crate) fn with_y(&self, y: Vec<f64>) -> Self {
        debug_assert_eq!(y.len(), self.x.len());
        Self {
            x: self.x.clone(),
            y,
        }
    }

    /// Index of the sample nearest to `x0` (lowest index on ties).
    pub fn nearest_index(&self, x0: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &x) in self.x.iter().enumerate() {
            let d = (x - x0).abs();
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// `(min, max)` of `y`, or `None` for an empty trace.
    pub fn y_range(&self) -> Option<(f64, f64)> {
        let first = *self.y.first()?;
        Some(
            self.y
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

/// A background anchor point picked from a trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub x: f64,
    pub y: f64,
}

/// Smoothing applied to a working trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SmoothingMethod {
    None,
    Gaussian { sigma: f64 },
    SavitzkyGolay { window: usize, polyorder: usize },
}

/// Line shape used when fitting a peak.
///
/// The two shapes use different normalizations: the pseudo-Voigt amplitude
/// is the peak height, the Voigt amplitude is the integrated area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    PseudoVoigt,
    Voigt,
}

impl ProfileKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ProfileKind::PseudoVoigt => "pseudo-voigt",
            ProfileKind::Voigt => "voigt",
        }
    }
}

/// How an EoS data set is refined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EosMode {
    /// Refine the unlocked parameters from the starting values.
    #[default]
    Fit,
    /// Smart-guess fit, then the retry strategies, then the starting values.
    Auto,
    /// Run every retry strategy and keep the best.
    Strategies,
}

/// Successful fit of one peak candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakFitResult {
    pub profile: ProfileKind,
    /// Candidate position the fit window was centered on.
    pub candidate_x: f64,
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
    pub gamma: f64,
    /// Lorentzian fraction (0 = Gaussian, 1 = Lorentzian).
    pub eta: f64,
    pub fwhm: f64,
    /// RMS of the residuals inside the fit window.
    pub rms: f64,
}

/// Why a peak candidate produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    InsufficientWindow,
    NoConvergence,
    ModelMismatch,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureReason::InsufficientWindow => "insufficient samples in fit window",
            FailureReason::NoConvergence => "optimizer did not converge",
            FailureReason::ModelMismatch => "profile evaluated outside its domain",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    pub candidate_x: f64,
    pub reason: FailureReason,
}

/// Outcome of fitting a set of candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakBatch {
    pub results: Vec<PeakFitResult>,
    pub failures: Vec<FitFailure>,
}

/// Equation-of-state parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EosParameters {
    /// Reference (zero-pressure) volume.
    pub v0: f64,
    /// Bulk modulus at `v0`.
    pub b0: f64,
    /// Pressure derivative of the bulk modulus.
    pub b0_prime: f64,
    /// Second pressure derivative. `None` means "implied by the model".
    pub b0_double_prime: Option<f64>,
}

impl EosParameters {
    pub fn new(v0: f64, b0: f64, b0_prime: f64) -> Self {
        Self {
            v0,
            b0,
            b0_prime,
            b0_double_prime: None,
        }
    }

    pub(crate) fn to_array(self) -> [f64; 3] {
        [self.v0, self.b0, self.b0_prime]
    }

    pub(crate) fn from_array(values: [f64; 3], b0_double_prime: Option<f64>) -> Self {
        Self {
            v0: values[0],
            b0: values[1],
            b0_prime: values[2],
            b0_double_prime,
        }
    }
}

/// One flag per EoS parameter; `true` holds the parameter fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFlags {
    pub v0: bool,
    pub b0: bool,
    pub b0_prime: bool,
}

impl LockFlags {
    pub const NONE: LockFlags = LockFlags {
        v0: false,
        b0: false,
        b0_prime: false,
    };

    pub(crate) fn to_array(self) -> [bool; 3] {
        [self.v0, self.b0, self.b0_prime]
    }

    pub fn all_locked(self) -> bool {
        self.v0 && self.b0 && self.b0_prime
    }

    pub fn free_count(self) -> usize {
        self.to_array().iter().filter(|locked| !**locked).count()
    }
}

/// Standard error per EoS parameter (0 for locked or undetermined ones).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterErrors {
    pub v0: f64,
    pub b0: f64,
    pub b0_prime: f64,
}

/// Quality metrics of an EoS parameter set against data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub r_squared: f64,
    pub rmse: f64,
    pub chi_squared: f64,
    pub max_abs_residual: f64,
    pub errors: ParameterErrors,
}

/// Parameters plus the metrics computed for exactly those values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedParameters {
    pub params: EosParameters,
    pub metrics: FitMetrics,
}

/// Result of one constrained EoS fit.
///
/// `success == false` means "no usable result"; `params` then holds the
/// starting values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EosFitResult {
    pub success: bool,
    pub params: EosParameters,
    pub errors: ParameterErrors,
    pub rms: f64,
    pub chi_squared: f64,
    pub r_squared: f64,
    pub iterations: usize,
    pub message: String,
}

impl EosFitResult {
    pub(crate) fn failed(params: EosParameters, message: impl Into<String>) -> Self {
        Self {
            success: false,
            params,
            errors: ParameterErrors::default(),
            rms: f64::INFINITY,
            chi_squared: f64::INFINITY,
            r_squared: 0.0,
            iterations: 0,
            message: message.into(),
        }
    }

    pub fn evaluated(&self) -> EvaluatedParameters {
        EvaluatedParameters {
            params: self.params,
            metrics: FitMetrics {
                r_squared: self.r_squared,
                rmse: self.rms,
                chi_squared: self.chi_squared,
                max_abs_residual: f64::NAN,
                errors: self.errors,
            },
        }
    }
}
