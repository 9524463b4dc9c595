//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - the sampled `Trace` and background anchors
//! - peak fit outputs (`PeakFitResult`, `FitFailure`, `PeakBatch`)
//! - EoS parameters, lock flags and fit outputs

pub mod types;

pub use types::*;
