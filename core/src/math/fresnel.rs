//! Tabulated complex Fresnel integral.
//!
//! `F(x) = C(x) + i S(x) = ∫₀ˣ exp(iπt²/2) dt`. The table is integrated once
//! for `0 <= x <= max_argument`, lookups interpolate linearly between grid
//! points, and arguments past the table use the large-argument expansion.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::prelude::{SimError, SimResult};

/// Build parameters for [`FresnelTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FresnelSettings {
    /// Largest tabulated argument; the asymptotic form takes over beyond it.
    pub max_argument: f64,
    /// Spacing of the tabulated grid.
    pub table_step: f64,
    /// Absolute error target of each grid interval's integration.
    pub tolerance: f64,
    /// Smallest subinterval the adaptive integrator may split into.
    pub min_step: f64,
}

impl Default for FresnelSettings {
    fn default() -> Self {
        Self {
            max_argument: 10.0,
            table_step: 1e-3,
            tolerance: 1e-12,
            min_step: 1e-9,
        }
    }
}

/// Immutable lookup table for the complex Fresnel integral.
#[derive(Debug, Clone)]
pub struct FresnelTable {
    step: f64,
    limit: f64,
    values: Vec<Complex64>,
}

const MAX_DEPTH: u32 = 40;

impl FresnelTable {
    /// Builds the table with [`FresnelSettings::default`].
    pub fn new() -> Self {
        Self::build(FresnelSettings::default())
    }

    pub fn with_settings(settings: FresnelSettings) -> SimResult<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(settings.max_argument)
            || !valid(settings.table_step)
            || !valid(settings.tolerance)
            || !valid(settings.min_step)
        {
            return Err(SimError::InvalidInput(format!(
                "fresnel settings must be positive and finite: {:?}",
                settings
            )));
        }
        if settings.table_step > settings.max_argument {
            return Err(SimError::InvalidInput(
                "fresnel table step exceeds its range".into(),
            ));
        }
        Ok(Self::build(settings))
    }

    fn build(settings: FresnelSettings) -> Self {
        let intervals = (settings.max_argument / settings.table_step - 1e-9).ceil() as usize;
        let step = settings.table_step;
        let mut values = Vec::with_capacity(intervals + 1);
        values.push(Complex64::new(0.0, 0.0));

        let mut running = Complex64::new(0.0, 0.0);
        for i in 0..intervals {
            let a = i as f64 * step;
            let b = a + step;
            running += integrate(a, b, settings.tolerance, settings.min_step);
            values.push(running);
        }

        Self {
            step,
            limit: intervals as f64 * step,
            values,
        }
    }

    /// Largest argument served from the table.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluates `C(x) + i S(x)`.
    pub fn fast_fresnel(&self, x: f64) -> Complex64 {
        if x < 0.0 {
            return -self.lookup(-x);
        }
        self.lookup(x)
    }

    fn lookup(&self, x: f64) -> Complex64 {
        if x == 0.0 {
            return Complex64::new(0.0, 0.0);
        }
        if x >= self.limit {
            return asymptotic(x);
        }

        let position = x / self.step;
        let index = (position.floor() as usize).min(self.values.len() - 2);
        let fraction = position - index as f64;
        let lower = self.values[index];
        let upper = self.values[index + 1];
        lower + (upper - lower) * fraction
    }
}

impl Default for FresnelTable {
    fn default() -> Self {
        Self::new()
    }
}

fn integrand(t: f64) -> Complex64 {
    Complex64::from_polar(1.0, PI * t * t / 2.0)
}

fn simpson(a: f64, b: f64, fa: Complex64, fm: Complex64, fb: Complex64) -> Complex64 {
    (fa + fm * 4.0 + fb) * ((b - a) / 6.0)
}

/// Adaptive Simpson quadrature of the Fresnel integrand over `[a, b]`.
pub(crate) fn integrate(a: f64, b: f64, tolerance: f64, min_step: f64) -> Complex64 {
    let fa = integrand(a);
    let fb = integrand(b);
    let m = 0.5 * (a + b);
    let fm = integrand(m);
    let whole = simpson(a, b, fa, fm, fb);
    refine(a, b, fa, fm, fb, whole, tolerance, min_step, MAX_DEPTH)
}

#[allow(clippy::too_many_arguments)]
fn refine(
    a: f64,
    b: f64,
    fa: Complex64,
    fm: Complex64,
    fb: Complex64,
    whole: Complex64,
    tolerance: f64,
    min_step: f64,
    depth: u32,
) -> Complex64 {
    let m = 0.5 * (a + b);
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = integrand(lm);
    let frm = integrand(rm);
    let left = simpson(a, m, fa, flm, fm);
    let right = simpson(m, b, fm, frm, fb);
    let delta = left + right - whole;

    // A floor on the subinterval width keeps the recursion from stalling.
    if depth == 0 || (b - a) <= min_step || delta.norm() <= 15.0 * tolerance {
        return left + right + delta / 15.0;
    }

    refine(a, m, fa, flm, fm, left, tolerance / 2.0, min_step, depth - 1)
        + refine(m, b, fm, frm, fb, right, tolerance / 2.0, min_step, depth - 1)
}

/// Large-argument expansion, two terms of each auxiliary series.
fn asymptotic(x: f64) -> Complex64 {
    let z = PI * x * x;
    let inv_z2 = 1.0 / (z * z);
    let f = (1.0 - 3.0 * inv_z2) / (PI * x);
    let g = (1.0 - 15.0 * inv_z2) / (PI * z * x);
    let (sin, cos) = (z / 2.0).sin_cos();

    Complex64::new(0.5 + f * sin - g * cos, 0.5 - f * cos - g * sin)
}
