use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

/// Helper that wraps the `rustfft` planner to turn one-sided spectra into
/// real time-domain lines.
pub struct FftHelper {
    fft: std::sync::Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    /// Plans an inverse transform for spectra of `bins` one-sided bins.
    pub fn new(bins: usize) -> Self {
        let size = 2 * bins.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_inverse(size);
        let scratch = vec![Complex64::zero(); size];
        Self { fft, scratch }
    }

    pub fn bins(&self) -> usize {
        self.scratch.len() / 2
    }

    /// Hermitian-extends `spectrum` (bin 0 = DC) to twice its length and
    /// returns the real part of the normalized inverse transform.
    pub fn inverse_real(&mut self, spectrum: &[Complex64]) -> Vec<f64> {
        let size = self.scratch.len();
        let bins = self.bins();
        self.scratch.fill(Complex64::zero());

        for (k, value) in spectrum.iter().take(bins).enumerate() {
            self.scratch[k] = *value;
            if k > 0 {
                self.scratch[size - k] = value.conj();
            }
        }

        self.fft.process(&mut self.scratch);
        let scale = 1.0 / size as f64;
        self.scratch.iter().map(|c| c.re * scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_helper_returns_twice_the_bins() {
        let mut helper = FftHelper::new(4);
        let output = helper.inverse_real(&[Complex64::zero(); 4]);
        assert_eq!(output.len(), 8);
        assert!(output.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn linear_phase_ramp_maps_to_delayed_impulse() {
        let bins = 16;
        let delay = 5usize;
        let size = 2 * bins;
        let spectrum: Vec<Complex64> = (0..bins)
            .map(|k| {
                let phase = 2.0 * std::f64::consts::PI * (k * delay) as f64 / size as f64;
                Complex64::from_polar(1.0, -phase)
            })
            .collect();

        let mut helper = FftHelper::new(bins);
        let line = helper.inverse_real(&spectrum);
        let peak = crate::math::StatsHelper::peak_index(&line);
        assert_eq!(peak, Some(delay));
    }
}
