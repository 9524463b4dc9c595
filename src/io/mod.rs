//! Input/output helpers.
//!
//! - text/CSV ingest of traces and P–V data (`ingest`)
//! - peak and trace CSV exports (`export`)
//! - EoS result JSON read/write (`eos_file`)

pub mod eos_file;
pub mod export;
pub mod ingest;

pub use eos_file::*;
pub use export::*;
pub use ingest::*;
