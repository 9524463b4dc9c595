//! Signal preprocessing: smoothing and background removal.
//!
//! Every operation takes a trace and returns a new one; callers decide which
//! copy is the working copy.

pub mod background;
pub mod smooth;

pub use background::*;
pub use smooth::*;
