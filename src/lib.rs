//! `xrd-fit` library crate.
//!
//! The binary (`xrdfit`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - front-ends (the CLI here, an interactive GUI elsewhere) share one engine
//!
//! Layout, leaves first: `math` (LM, spline, Faddeeva), `signal`
//! (smoothing, background), `peaks`, `eos`, then `session`, `report`, `io`
//! and the CLI in `app`/`cli`.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod eos;
pub mod error;
pub mod io;
pub mod math;
pub mod peaks;
pub mod report;
pub mod session;
pub mod signal;
