//! Isothermal pressure–volume equations of state.
//!
//! Every family maps `(V; V0, B0, B0')` to a pressure in the units of `B0`.
//! B0'' is never refined: each family reports the value its truncation
//! implies, and only the fourth-order Birch–Murnaghan form consumes it.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::EosParameters;
use crate::error::{FitError, Result};

/// A pressure function over EoS parameters.
///
/// The fitter only sees this trait, so any closed form (or a lookup into an
/// external library) can be refined with the same machinery.
pub trait PressureModel: Send + Sync {
    fn name(&self) -> &str;

    /// Pressure at `volume`. Fails with [`FitError::ModelMismatch`] outside
    /// the model's domain (non-positive volumes, degenerate parameters).
    fn pressure(&self, volume: f64, params: &EosParameters) -> Result<f64>;

    /// B0'' implied by the model for the given parameters.
    fn implied_b0_double_prime(&self, params: &EosParameters) -> f64;

    /// B0' pinned by the functional form, if any. Such a B0' is never refined.
    fn fixed_b0_prime(&self) -> Option<f64> {
        None
    }

    fn pressures(&self, volumes: &[f64], params: &EosParameters) -> Result<Vec<f64>> {
        volumes.iter().map(|&v| self.pressure(v, params)).collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum EosKind {
    /// Birch–Murnaghan 2nd order (B0' fixed at 4 by the truncation).
    Bm2,
    /// Birch–Murnaghan 3rd order.
    #[default]
    Bm3,
    /// Birch–Murnaghan 4th order.
    Bm4,
    Murnaghan,
    Vinet,
    NaturalStrain,
}

impl EosKind {
    pub const ALL: [EosKind; 6] = [
        EosKind::Bm2,
        EosKind::Bm3,
        EosKind::Bm4,
        EosKind::Murnaghan,
        EosKind::Vinet,
        EosKind::NaturalStrain,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            EosKind::Bm2 => "Birch-Murnaghan 2nd",
            EosKind::Bm3 => "Birch-Murnaghan 3rd",
            EosKind::Bm4 => "Birch-Murnaghan 4th",
            EosKind::Murnaghan => "Murnaghan",
            EosKind::Vinet => "Vinet",
            EosKind::NaturalStrain => "Natural Strain",
        }
    }
}

impl std::fmt::Display for EosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl PressureModel for EosKind {
    fn name(&self) -> &str {
        self.display_name()
    }

    fn pressure(&self, volume: f64, params: &EosParameters) -> Result<f64> {
        let EosParameters {
            v0,
            b0,
            b0_prime: bp,
            ..
        } = *params;
        if !(volume.is_finite() && volume > 0.0) {
            return Err(FitError::ModelMismatch(format!(
                "{}: volume must be positive, got {volume}",
                self.name()
            )));
        }
        if !(v0.is_finite() && v0 > 0.0 && b0.is_finite() && bp.is_finite()) {
            return Err(FitError::ModelMismatch(format!(
                "{}: invalid parameters V0={v0}, B0={b0}, B0'={bp}",
                self.name()
            )));
        }

        let ratio = v0 / volume;
        let p = match self {
            EosKind::Bm2 => birch_murnaghan(ratio, b0, 4.0, 0.0),
            EosKind::Bm3 => birch_murnaghan(ratio, b0, bp, 0.0),
            EosKind::Bm4 => {
                let bpp = params
                    .b0_double_prime
                    .unwrap_or_else(|| self.implied_b0_double_prime(params));
                let c = 1.5 * (b0 * bpp + (bp - 4.0) * (bp - 3.0) + 35.0 / 9.0);
                birch_murnaghan(ratio, b0, bp, c)
            }
            EosKind::Murnaghan => {
                if bp == 0.0 {
                    return Err(FitError::ModelMismatch(
                        "Murnaghan: B0' must be non-zero".to_string(),
                    ));
                }
                b0 / bp * (ratio.powf(bp) - 1.0)
            }
            EosKind::Vinet => {
                let x = ratio.recip().cbrt();
                let eta = 1.5 * (bp - 1.0);
                3.0 * b0 * (1.0 - x) / (x * x) * (eta * (1.0 - x)).exp()
            }
            EosKind::NaturalStrain => {
                let f = ratio.ln() / 3.0;
                3.0 * b0 * ratio * f * (1.0 + 1.5 * (bp - 2.0) * f)
            }
        };

        if p.is_finite() {
            Ok(p)
        } else {
            Err(FitError::ModelMismatch(format!(
                "{}: non-finite pressure at V={volume}",
                self.name()
            )))
        }
    }

    fn fixed_b0_prime(&self) -> Option<f64> {
        matches!(self, EosKind::Bm2).then_some(4.0)
    }

    fn implied_b0_double_prime(&self, params: &EosParameters) -> f64 {
        let (b0, bp) = (params.b0, params.b0_prime);
        if b0 == 0.0 {
            return 0.0;
        }
        match self {
            EosKind::Bm2 => -35.0 / (9.0 * b0),
            EosKind::Bm3 | EosKind::Bm4 => -((3.0 - bp) * (4.0 - bp) + 35.0 / 9.0) / b0,
            EosKind::Murnaghan => 0.0,
            EosKind::Vinet => -((bp / 2.0).powi(2) + bp / 2.0 - 19.0 / 36.0) / b0,
            EosKind::NaturalStrain => {
                let d = bp - 2.0;
                -(1.0 + d + d * d) / b0
            }
        }
    }
}

/// Eulerian finite-strain expansion
/// `3·B0·f·(1+2f)^{5/2}·[1 + 1.5(B0'−4)f + c₂f²]`.
fn birch_murnaghan(ratio: f64, b0: f64, bp: f64, c2: f64) -> f64 {
    let f = 0.5 * (ratio.powf(2.0 / 3.0) - 1.0);
    3.0 * b0 * f * (1.0 + 2.0 * f).powf(2.5) * (1.0 + 1.5 * (bp - 4.0) * f + c2 * f * f)
}
