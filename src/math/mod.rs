//! Numerical building blocks: linear and nonlinear least squares, smoothing
//! splines and the Faddeeva function.

pub mod faddeeva;
pub mod lm;
pub mod ols;
pub mod spline;

pub use faddeeva::*;
pub use lm::*;
pub use ols::*;
pub use spline::*;
