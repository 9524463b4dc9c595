//! Read/write EoS result JSON files.
//!
//! The JSON file is the portable record of one EoS fit:
//! - model and fitted parameters with their standard errors
//! - lock flags and fit quality
//! - a precomputed P(V) grid over the data range for quick plotting

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EosFitResult, EosParameters, LockFlags, ParameterErrors};
use crate::eos::{EosKind, PressureModel};
use crate::error::{FitError, Result};

const GRID_POINTS: usize = 101;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EosGrid {
    pub volume: Vec<f64>,
    pub pressure: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EosResultFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub model: EosKind,
    pub n_points: usize,
    pub success: bool,
    pub message: String,
    pub params: EosParameters,
    pub b0_double_prime: f64,
    pub errors: ParameterErrors,
    pub locks: LockFlags,
    /// Quality metrics; `None` when the fit left them undefined (JSON has no
    /// infinity or NaN).
    pub rms: Option<f64>,
    pub chi_squared: Option<f64>,
    pub r_squared: Option<f64>,
    /// Empty when the model cannot be evaluated over the data range.
    pub grid: EosGrid,
}

impl EosResultFile {
    pub fn new(model: EosKind, locks: LockFlags, result: &EosFitResult, volumes: &[f64]) -> Self {
        let params = result.params;
        Self {
            tool: "xrdfit".to_string(),
            generated_at: Utc::now(),
            model,
            n_points: volumes.len(),
            success: result.success,
            message: result.message.clone(),
            params,
            b0_double_prime: params
                .b0_double_prime
                .unwrap_or_else(|| model.implied_b0_double_prime(&params)),
            errors: result.errors,
            locks,
            rms: finite(result.rms),
            chi_squared: finite(result.chi_squared),
            r_squared: finite(result.r_squared),
            grid: build_grid(&model, &params, volumes),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

pub fn write_eos_json(path: &Path, file: &EosResultFile) -> Result<()> {
    let out = File::create(path).map_err(|source| FitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(out, file).map_err(|e| json_error(path, e))
}

pub fn read_eos_json(path: &Path) -> Result<EosResultFile> {
    let input = File::open(path).map_err(|source| FitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(input).map_err(|e| json_error(path, e))
}

fn json_error(path: &Path, err: serde_json::Error) -> FitError {
    FitError::Parse {
        path: path.to_path_buf(),
        line: err.line(),
        message: err.to_string(),
    }
}

fn build_grid(model: &dyn PressureModel, params: &EosParameters, volumes: &[f64]) -> EosGrid {
    let lo = volumes.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return EosGrid {
            volume: Vec::new(),
            pressure: Vec::new(),
        };
    }

    let volume: Vec<f64> = (0..GRID_POINTS)
        .map(|i| lo + (hi - lo) * i as f64 / (GRID_POINTS - 1) as f64)
        .collect();
    match model.pressures(&volume, params) {
        Ok(pressure) => EosGrid { volume, pressure },
        Err(_) => EosGrid {
            volume: Vec::new(),
            pressure: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> EosFitResult {
        EosFitResult {
            success: true,
            params: EosParameters::new(11.5, 130.0, 4.0),
            errors: ParameterErrors {
                v0: 0.001,
                b0: 0.5,
                b0_prime: 0.02,
            },
            rms: 0.01,
            chi_squared: 1e-3,
            r_squared: 0.9999,
            iterations: 7,
            message: "converged".to_string(),
        }
    }

    #[test]
    fn json_round_trip_keeps_the_fit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eos.json");
        let volumes = [11.4, 10.8, 10.2, 9.6];
        let file = EosResultFile::new(EosKind::Bm3, LockFlags::NONE, &result(), &volumes);
        write_eos_json(&path, &file).unwrap();

        let back = read_eos_json(&path).unwrap();
        assert_eq!(back.model, EosKind::Bm3);
        assert_eq!(back.params, file.params);
        assert_eq!(back.locks, file.locks);
        assert_eq!(back.generated_at, file.generated_at);
        assert_eq!(back.grid.volume.len(), GRID_POINTS);
        assert_eq!(back.grid.volume[0], 9.6);
        let implied = EosKind::Bm3.implied_b0_double_prime(&file.params);
        assert!((back.b0_double_prime - implied).abs() < 1e-12);
        assert_eq!(back.rms, Some(0.01));
    }

    #[test]
    fn failed_fit_round_trips_without_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.json");
        let failed = EosFitResult::failed(EosParameters::new(11.5, 130.0, 4.0), "no convergence");
        assert!(failed.rms.is_infinite());
        let file = EosResultFile::new(EosKind::Bm3, LockFlags::NONE, &failed, &[11.4, 10.2]);
        write_eos_json(&path, &file).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"rms\": null"));

        let back = read_eos_json(&path).unwrap();
        assert!(!back.success);
        assert_eq!(back.message, "no convergence");
        assert_eq!(back.rms, None);
        assert_eq!(back.params, file.params);
    }

    #[test]
    fn model_is_stored_in_kebab_case() {
        let volumes = [11.0, 10.0];
        let file = EosResultFile::new(EosKind::NaturalStrain, LockFlags::NONE, &result(), &volumes);
        let text = serde_json::to_string(&file).unwrap();
        assert!(text.contains("\"model\":\"natural-strain\""));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\n  \"tool\": 3,\n").unwrap();
        assert!(matches!(read_eos_json(&path), Err(FitError::Parse { .. })));
    }
}
