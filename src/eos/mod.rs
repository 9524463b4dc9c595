//! Equation-of-state fitting.
//!
//! This module defines:
//!
//! - the pressure families (`EosKind`) behind the `PressureModel` trait
//! - metrics for manually chosen parameters
//! - the constrained fitter (locks, bounds, B0' regularization)
//! - the multi-strategy retry controller

pub mod fitter;
pub mod models;
pub mod params;
pub mod strategies;

pub use fitter::{EosBounds, EosFitter, InitialGuess};
pub use models::{EosKind, PressureModel};
pub use params::{compute_metrics, evaluate};
pub use strategies::{best_fit, fit_with_multiple_strategies, StrategyAttempt, StrategyReport};
