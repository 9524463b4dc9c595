//! Stateful workflows over one loaded data set.
//!
//! - `PeakSession`: smoothing, background, candidates and peak fits on a pattern
//! - `EosSession`: manual values, locks and automatic fits on P–V data

pub mod eos;
pub mod peak;

pub use eos::{AutoFit, EosSession, FitSource};
pub use peak::PeakSession;
