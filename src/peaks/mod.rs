//! Peak detection and profile fitting.

pub mod fitter;
pub mod locator;
pub mod profile;

pub use fitter::{fit_peak, fit_peaks, PeakFitOptions, MIN_WINDOW_SAMPLES};
pub use locator::{find_peaks, find_peaks_with, PeakSearch};
pub use profile::{pseudo_voigt, voigt};
