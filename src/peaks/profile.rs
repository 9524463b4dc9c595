//! Peak line shapes.
//!
//! The pseudo-Voigt is height-normalised: `amplitude` is the value at the
//! center. The Voigt is area-normalised: `amplitude` is the integrated area.

use std::f64::consts::{PI, SQRT_2};

use num_complex::Complex64;

use crate::math::faddeeva;

/// `2·sqrt(2·ln 2)`: Gaussian FWHM per unit sigma.
pub const GAUSSIAN_FWHM_FACTOR: f64 = 2.354_820_045_030_949;

/// Rounded Gaussian factor used by the pseudo-Voigt FWHM estimate.
pub const PSEUDO_VOIGT_GAUSSIAN_FACTOR: f64 = 2.355;

/// Height-normalised Gaussian shape, `1` at the center.
///
/// `sigma == 0` degenerates to a unit spike at the center.
pub fn gaussian_shape(dx: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return if dx == 0.0 { 1.0 } else { 0.0 };
    }
    (-dx * dx / (2.0 * sigma * sigma)).exp()
}

/// Height-normalised Lorentzian shape, `1` at the center.
pub fn lorentzian_shape(dx: f64, gamma: f64) -> f64 {
    if gamma == 0.0 {
        return if dx == 0.0 { 1.0 } else { 0.0 };
    }
    let g2 = gamma * gamma;
    g2 / (dx * dx + g2)
}

/// `A·[η·L(x; c, γ) + (1 − η)·G(x; c, σ)]`.
pub fn pseudo_voigt(x: f64, amplitude: f64, center: f64, sigma: f64, gamma: f64, eta: f64) -> f64 {
    let dx = x - center;
    amplitude * (eta * lorentzian_shape(dx, gamma) + (1.0 - eta) * gaussian_shape(dx, sigma))
}

/// FWHM estimate of the pseudo-Voigt mixture, `η·2γ + (1 − η)·2.355σ`.
pub fn pseudo_voigt_fwhm(sigma: f64, gamma: f64, eta: f64) -> f64 {
    eta * 2.0 * gamma + (1.0 - eta) * PSEUDO_VOIGT_GAUSSIAN_FACTOR * sigma
}

/// Area-normalised Voigt profile through the Faddeeva function.
///
/// `sigma == 0` reduces to a Lorentzian; both widths zero yields NaN.
pub fn voigt(x: f64, amplitude: f64, center: f64, sigma: f64, gamma: f64) -> f64 {
    let dx = x - center;
    if sigma == 0.0 {
        if gamma == 0.0 {
            return f64::NAN;
        }
        return amplitude * gamma / (PI * (dx * dx + gamma * gamma));
    }
    let z = Complex64::new(dx, gamma) / (sigma * SQRT_2);
    amplitude * faddeeva(z).re / (sigma * (2.0 * PI).sqrt())
}

/// Olivero–Longbothum FWHM of a Voigt profile.
pub fn voigt_fwhm(sigma: f64, gamma: f64) -> f64 {
    let fl = 2.0 * gamma;
    let fg = GAUSSIAN_FWHM_FACTOR * sigma;
    0.5346 * fl + (0.2166 * fl * fl + fg * fg).sqrt()
}

/// Lorentzian share of the combined widths, `fL / (fL + fG)`.
pub fn voigt_eta(sigma: f64, gamma: f64) -> f64 {
    let fl = 2.0 * gamma;
    let total = fl + GAUSSIAN_FWHM_FACTOR * sigma;
    if total > 0.0 && total.is_finite() {
        fl / total
    } else {
        0.0
    }
}

/// Peak height of a unit-area Voigt profile.
pub fn voigt_peak_height(sigma: f64, gamma: f64) -> f64 {
    voigt(0.0, 1.0, 0.0, sigma, gamma)
}
