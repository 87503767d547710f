use ndarray::{Array2, ArrayView1};
use num_complex::Complex64;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::math::{FftHelper, StatsHelper};
use crate::prelude::{SimError, SimResult};

const MAX_PREALLOCATED: usize = 1 << 16;

/// Frequency-domain RF data, one spectrum per beamline.
///
/// Persisted as `[f64 freq_step][i32 points][i32 beamlines]`, then all real
/// parts and then all imaginary parts, each beamline's bins contiguous.
/// Everything is little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct RfSpectra {
    freq_step: f64,
    bins: Array2<Complex64>,
}

impl RfSpectra {
    pub fn zeros(freq_step: f64, freq_point_count: usize, beamline_count: usize) -> Self {
        Self {
            freq_step,
            bins: Array2::zeros((beamline_count, freq_point_count)),
        }
    }

    pub fn freq_step(&self) -> f64 {
        self.freq_step
    }

    pub fn freq_point_count(&self) -> usize {
        self.bins.ncols()
    }

    pub fn beamline_count(&self) -> usize {
        self.bins.nrows()
    }

    /// Bins indexed `[beamline, frequency]`.
    pub fn bins(&self) -> &Array2<Complex64> {
        &self.bins
    }

    pub fn beamline(&self, beamline: usize) -> ArrayView1<'_, Complex64> {
        self.bins.row(beamline)
    }

    pub(crate) fn set_frequency(&mut self, index: usize, values: &[Complex64]) {
        for (beamline, value) in values.iter().enumerate() {
            self.bins[[beamline, index]] = *value;
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> SimResult<()> {
        let points = i32::try_from(self.freq_point_count())
            .map_err(|_| SimError::InvalidInput("too many frequency points".into()))?;
        let lines = i32::try_from(self.beamline_count())
            .map_err(|_| SimError::InvalidInput("too many beamlines".into()))?;

        writer.write_all(&self.freq_step.to_le_bytes())?;
        writer.write_all(&points.to_le_bytes())?;
        writer.write_all(&lines.to_le_bytes())?;
        for value in self.bins.iter() {
            writer.write_all(&value.re.to_le_bytes())?;
        }
        for value in self.bins.iter() {
            writer.write_all(&value.im.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> SimResult<Self> {
        let mut word = [0u8; 8];
        let mut half = [0u8; 4];

        reader.read_exact(&mut word)?;
        let freq_step = f64::from_le_bytes(word);
        reader.read_exact(&mut half)?;
        let points = i32::from_le_bytes(half);
        reader.read_exact(&mut half)?;
        let lines = i32::from_le_bytes(half);

        let (points, lines) = match (usize::try_from(points), usize::try_from(lines)) {
            (Ok(p), Ok(l)) => (p, l),
            _ => {
                return Err(SimError::InvalidInput(format!(
                    "negative spectrum shape {} x {}",
                    points, lines
                )))
            }
        };

        let count = points.checked_mul(lines).ok_or_else(|| {
            SimError::InvalidInput(format!("spectrum shape {} x {} overflows", points, lines))
        })?;
        // The header is untrusted; grow with the data actually read.
        let mut real = Vec::with_capacity(count.min(MAX_PREALLOCATED));
        for _ in 0..count {
            reader.read_exact(&mut word)?;
            real.push(f64::from_le_bytes(word));
        }

        let mut bins = Vec::with_capacity(real.len());
        for re in real {
            reader.read_exact(&mut word)?;
            bins.push(Complex64::new(re, f64::from_le_bytes(word)));
        }

        let bins = Array2::from_shape_vec((lines, points), bins)
            .map_err(|err| SimError::InvalidInput(err.to_string()))?;
        Ok(Self { freq_step, bins })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        Self::read_from(&mut reader)
    }

    /// Time-domain RF lines, `[beamline, sample]`, `2 * freq_point_count`
    /// samples each spanning `1 / freq_step` seconds.
    pub fn to_rf_lines(&self) -> Array2<f64> {
        let mut fft = FftHelper::new(self.freq_point_count());
        let mut lines = Array2::zeros((self.beamline_count(), fft.bins() * 2));

        for (beamline, mut line) in lines.rows_mut().into_iter().enumerate() {
            for (sample, value) in line.iter_mut().zip(self.rf_line(&mut fft, beamline)) {
                *sample = value;
            }
        }
        lines
    }

    /// Time of the strongest RF sample on each beamline, seconds.
    pub fn peak_echo_times(&self) -> Vec<Option<f64>> {
        if self.freq_step <= 0.0 {
            return vec![None; self.beamline_count()];
        }
        let mut fft = FftHelper::new(self.freq_point_count());
        let dt = 1.0 / (2.0 * fft.bins() as f64 * self.freq_step);
        (0..self.beamline_count())
            .map(|beamline| {
                let line = self.rf_line(&mut fft, beamline);
                StatsHelper::peak_index(&line).map(|index| index as f64 * dt)
            })
            .collect()
    }

    fn rf_line(&self, fft: &mut FftHelper, beamline: usize) -> Vec<f64> {
        // Fields carry exp(+ikr); conjugate so echoes land at positive time.
        let spectrum: Vec<Complex64> = self.beamline(beamline).iter().map(|c| c.conj()).collect();
        fft.inverse_real(&spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn spectra() -> RfSpectra {
        let mut spectra = RfSpectra::zeros(1e5, 4, 2);
        spectra.set_frequency(1, &[Complex64::new(1.0, -2.0), Complex64::new(3.0, 4.0)]);
        spectra.set_frequency(3, &[Complex64::new(-5.0, 0.5), Complex64::new(0.0, 7.0)]);
        spectra
    }

    #[test]
    fn binary_layout_is_header_then_real_then_imaginary() {
        let mut bytes = Vec::new();
        spectra().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 4 + 2 * 8 * 8);
        assert_eq!(f64::from_le_bytes(bytes[0..8].try_into().unwrap()), 1e5);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), 4);
        assert_eq!(i32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);

        let doubles: Vec<f64> = bytes[16..]
            .chunks(8)
            .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(&doubles[..8], &[0.0, 1.0, 0.0, -5.0, 0.0, 3.0, 0.0, 0.0]);
        assert_eq!(&doubles[8..], &[0.0, -2.0, 0.0, 0.5, 0.0, 4.0, 0.0, 7.0]);
    }

    #[test]
    fn saved_file_loads_back() {
        let original = spectra();
        let temp = NamedTempFile::new().unwrap();
        original.save(temp.path()).unwrap();
        assert_eq!(RfSpectra::load(temp.path()).unwrap(), original);
    }

    #[test]
    fn truncated_file_is_an_error() {
        let mut bytes = Vec::new();
        spectra().write_to(&mut bytes).unwrap();
        bytes.truncate(40);
        assert!(RfSpectra::read_from(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn oversized_header_is_an_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1e5f64.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(RfSpectra::read_from(&mut bytes.as_slice()).is_err());

        bytes.truncate(8);
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        assert!(RfSpectra::read_from(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn delayed_echo_peaks_at_its_delay() {
        let points = 32;
        let freq_step = 1e5;
        let delay = 2e-6;
        let mut spectra = RfSpectra::zeros(freq_step, points, 1);
        for index in 1..points {
            let k = 2.0 * std::f64::consts::PI * index as f64 * freq_step;
            spectra.set_frequency(index, &[Complex64::from_polar(1.0, k * delay)]);
        }

        let lines = spectra.to_rf_lines();
        assert_eq!(lines.dim(), (1, 64));
        let peaks = spectra.peak_echo_times();
        assert_eq!(peaks.len(), 1);
        let dt = 1.0 / (64.0 * freq_step);
        assert!((peaks[0].unwrap() - delay).abs() <= dt / 2.0);

        let line = lines.row(0).to_vec();
        assert_eq!(StatsHelper::peak_index(&line).map(|i| i as f64 * dt), peaks[0]);
    }
}
