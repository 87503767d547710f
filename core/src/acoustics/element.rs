//! Near-field pressure of one rectangular element.
//!
//! The lateral direction is handled in the far-field (sinc) approximation
//! and the elevational direction through the Fresnel integral across the
//! element length, with the quadratic phase curvature `beta = 1 / (2r)`.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::acoustics::array::ElementGeometry;
use crate::math::FresnelTable;
use crate::prelude::Vector3;

/// Distance floor below which `r` is clamped.
pub const MIN_DISTANCE: f64 = 2e-10;
/// Curvature below which the flat-wavefront form is used.
pub const FLAT_CURVATURE: f64 = 5e-8;
/// Sinc argument below which the limit value 1 is used.
pub const SINC_CUTOFF: f64 = 1e-8;

fn sinc(argument: f64) -> f64 {
    if argument.abs() < SINC_CUTOFF {
        1.0
    } else {
        argument.sin() / argument
    }
}

/// Complex field at `point` (buffer space, relative to the element center)
/// radiated by a single element for the complex wavenumber `wavenumber`.
pub fn single_element_field(
    fresnel: &FresnelTable,
    point: Vector3,
    element: ElementGeometry,
    wavenumber: Complex64,
) -> Complex64 {
    let r = point.norm().max(MIN_DISTANCE);
    let i_k = Complex64::i() * wavenumber;
    let k = wavenumber.re;

    // No elevational lens: curvature comes from the spherical spreading only.
    let beta = 1.0 / (2.0 * r);
    let y_over_two_r_beta = point.y / (2.0 * r * beta);
    let a = element.width;
    let b = element.length;

    let sinc_x = sinc((k * point.x * a) / (2.0 * PI * r));
    let sinc_y = sinc((k * point.y * b) / (2.0 * PI * r));
    let spherical = (i_k * r).exp();

    if beta.abs() < FLAT_CURVATURE {
        return spherical * (a * b / r) * sinc_x * sinc_y;
    }

    let factor = (2.0 * k * beta.abs() / PI).sqrt();
    let half_length = b / 2.0;
    let t2 = factor * (half_length - y_over_two_r_beta);
    let t1 = factor * (-half_length - y_over_two_r_beta);
    let edges = fresnel.fast_fresnel(t2) - fresnel.fast_fresnel(t1);
    let curvature = (-i_k * point.y * y_over_two_r_beta / (2.0 * r)).exp();

    if beta > 0.0 {
        let scale = (a / r) * (PI / (2.0 * k * beta)).sqrt() * sinc_x;
        spherical * scale * curvature * edges
    } else {
        // Negative curvature flips the quadratic phase: conjugate the edges.
        let scale = (a / r) * (-PI / (2.0 * k * beta)).sqrt() * sinc_x;
        spherical * scale * curvature * edges.conj()
    }
}
