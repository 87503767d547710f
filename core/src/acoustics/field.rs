//! Discretized pulse-echo field around the aperture.
//!
//! The buffer covers one beam width laterally, one element length
//! elevationally and the whole phantom depth axially. Only the non-positive
//! elevational half is stored, and each lateral row is computed for one half
//! and mirrored. Every call to [`FieldBuffer::calculate_buffer_field`]
//! overwrites the whole grid for a new frequency.

use log::{debug, warn};
use ndarray::Array3;
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::acoustics::array::{ArrayGeometry, FocusPhases};
use crate::acoustics::element::single_element_field;
use crate::math::FresnelTable;
use crate::phantom::{Phantom, Scatterer};
use crate::prelude::{ComplexSample, SimError, SimResult, Vector3};

/// Sub-element lateral samples computed per element pitch.
pub const DEFAULT_DENSE_FACTOR: usize = 2;

/// Construction parameters of a [`FieldBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSettings {
    /// Fixed transmit focal depth; `<= 0` disables transmit focusing.
    pub transmit_focus: f64,
    pub beam_width: f64,
    /// Requested grid step. The lateral step is always `pitch / dense_factor`.
    pub grid_step: Vector3,
    /// Sound speed assumed by the beamformer.
    pub assumed_sound_speed: f64,
    /// Water path between the aperture and the phantom surface.
    pub phantom_gap: f64,
    pub dense_factor: usize,
}

/// Shape of the sampled field, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldGrid {
    pub size: Vector3,
    pub step: Vector3,
    pub center: Vector3,
    pub x_len: usize,
    pub x_len_extra: usize,
    pub y_len: usize,
    pub z_len: usize,
    pub dense_factor: usize,
}

fn odd_sample_count(extent: f64, step: f64) -> usize {
    let count = (extent / step).floor() as usize + 1;
    if count % 2 == 0 {
        count + 1
    } else {
        count
    }
}

impl FieldGrid {
    pub fn new(
        settings: &BufferSettings,
        phantom_size: Vector3,
        array: &ArrayGeometry,
    ) -> SimResult<Self> {
        if settings.dense_factor == 0 {
            return Err(SimError::InvalidGeometry(
                "dense factor must be at least 1".into(),
            ));
        }

        let size = Vector3::new(
            settings.beam_width,
            array.element().length,
            phantom_size.z + 2.0 * settings.phantom_gap,
        );
        let center = Vector3::new(phantom_size.x / 2.0, phantom_size.y / 2.0, size.z / 2.0);
        let step = Vector3::new(
            array.pitch() / settings.dense_factor as f64,
            settings.grid_step.y,
            settings.grid_step.z,
        );

        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
            return Err(SimError::InvalidGeometry(format!(
                "field extent {:?} must be positive",
                size
            )));
        }
        if !(step.y > 0.0 && step.z > 0.0) || !(center.z > 0.0) {
            return Err(SimError::InvalidGeometry(format!(
                "grid step {:?} must be positive",
                settings.grid_step
            )));
        }
        if (settings.grid_step.x - step.x).abs() > f64::EPSILON * step.x.max(1.0) {
            warn!(
                "lateral grid step {:.3e} m replaced by pitch / dense factor = {:.3e} m",
                settings.grid_step.x, step.x
            );
        }

        let x_len = odd_sample_count(size.x, step.x);
        let y_len = odd_sample_count(size.y, step.y);
        let z_len = odd_sample_count(size.z, step.z);
        let x_len_extra = x_len + settings.dense_factor * (array.element_count() - 1);

        Ok(Self {
            size,
            step,
            center,
            x_len,
            x_len_extra,
            y_len,
            z_len,
            dense_factor: settings.dense_factor,
        })
    }

    fn x_half(&self) -> isize {
        (self.x_len as isize - 1) / 2
    }

    fn y_half(&self) -> isize {
        (self.y_len as isize - 1) / 2
    }

    fn z_half(&self) -> isize {
        (self.z_len as isize - 1) / 2
    }

    /// Storage coordinates for signed grid indices, `None` outside the grid.
    fn storage_index(&self, x: isize, y: isize, z: isize) -> Option<[usize; 3]> {
        let (xh, yh, zh) = (self.x_half(), self.y_half(), self.z_half());
        if x.unsigned_abs() > xh as usize || y > 0 || y < -yh || z.unsigned_abs() > zh as usize {
            return None;
        }
        Some([(x + xh) as usize, (y + yh) as usize, (z + zh) as usize])
    }
}

/// Pulse-echo field sampled on a [`FieldGrid`] for one frequency at a time.
pub struct FieldBuffer<'a> {
    grid: FieldGrid,
    transmit_focus: f64,
    assumed_sound_speed: f64,
    phantom_gap: f64,
    wavenumber: Complex64,
    phantom: &'a dyn Phantom,
    array: &'a ArrayGeometry,
    fresnel: &'a FresnelTable,
    transmit_phases: FocusPhases,
    receive_phases: FocusPhases,
    row_transmit: Vec<ComplexSample>,
    row_receive: Vec<ComplexSample>,
    field: Array3<ComplexSample>,
}

impl<'a> FieldBuffer<'a> {
    pub fn new(
        settings: BufferSettings,
        phantom: &'a dyn Phantom,
        array: &'a ArrayGeometry,
        fresnel: &'a FresnelTable,
    ) -> SimResult<Self> {
        let grid = FieldGrid::new(&settings, phantom.size(), array)?;
        debug!(
            "field buffer {}x{}x{} (lateral extra {}), step {:?}",
            grid.x_len, grid.y_len, grid.z_len, grid.x_len_extra, grid.step
        );

        let zero = Complex64::new(0.0, 0.0);
        Ok(Self {
            grid,
            transmit_focus: settings.transmit_focus,
            assumed_sound_speed: settings.assumed_sound_speed,
            phantom_gap: settings.phantom_gap,
            wavenumber: zero,
            phantom,
            array,
            fresnel,
            transmit_phases: array.focus_phases(),
            receive_phases: array.focus_phases(),
            row_transmit: vec![zero; grid.x_len_extra],
            row_receive: vec![zero; grid.x_len_extra],
            field: Array3::from_elem((grid.x_len, (grid.y_len + 1) / 2, grid.z_len), zero),
        })
    }

    pub fn grid(&self) -> &FieldGrid {
        &self.grid
    }

    pub fn center(&self) -> Vector3 {
        self.grid.center
    }

    pub fn wavenumber(&self) -> Complex64 {
        self.wavenumber
    }

    /// Field of one element at `point` for the current wavenumber.
    pub fn single_element_field(&self, point: Vector3) -> ComplexSample {
        single_element_field(self.fresnel, point, self.array.element(), self.wavenumber)
    }

    /// Recomputes every stored sample for `frequency` (Hz).
    pub fn calculate_buffer_field(&mut self, frequency: f64) -> SimResult<()> {
        let sound_speed = self.phantom.sound_speed();
        self.wavenumber = Complex64::new(
            2.0 * PI * frequency / sound_speed,
            self.phantom.attenuation(frequency),
        );
        if self.wavenumber.re == 0.0 || !self.wavenumber.re.is_finite() {
            return Err(SimError::InvalidInput(format!(
                "wavenumber {} at {} Hz is unusable",
                self.wavenumber, frequency
            )));
        }

        let grid = self.grid;
        let element_count = self.array.element_count();
        let extra_half = (grid.x_len_extra as isize - 1) / 2;
        let speed_ratio = self.assumed_sound_speed / sound_speed;

        self.array
            .set_transmit_focus(&mut self.transmit_phases, self.transmit_focus, frequency);

        for z_index in -grid.z_half()..=grid.z_half() {
            let z = z_index as f64 * grid.step.z + grid.center.z;
            self.array
                .set_receive_focus(&mut self.receive_phases, z * speed_ratio, frequency);

            for y_index in -grid.y_half()..=0 {
                let y = y_index as f64 * grid.step.y;

                for x_index in -extra_half..=0 {
                    let point = Vector3::new(x_index as f64 * grid.step.x, y, z);
                    let slot = (x_index + extra_half) as usize;
                    // Transmit and receive apertures share the element shape.
                    let field = self.single_element_field(point);
                    self.row_transmit[slot] = field;
                    self.row_receive[slot] = field;
                }

                let len = grid.x_len_extra;
                for slot in (len + 1) / 2..len {
                    self.row_transmit[slot] = self.row_transmit[len - 1 - slot];
                    self.row_receive[slot] = self.row_receive[len - 1 - slot];
                }

                let tx = self.transmit_phases.as_slice();
                let rx = self.receive_phases.as_slice();
                let y_slot = (y_index + grid.y_half()) as usize;
                let z_slot = (z_index + grid.z_half()) as usize;

                for i in 0..(grid.x_len + 1) / 2 {
                    let mut transmit = Complex64::new(0.0, 0.0);
                    let mut receive = Complex64::new(0.0, 0.0);
                    for j in 0..element_count {
                        let sample = i + j * grid.dense_factor;
                        transmit += self.row_transmit[sample] * tx[j];
                        receive += self.row_receive[sample] * rx[j];
                    }

                    let value = transmit * receive;
                    self.field[[grid.x_len - 1 - i, y_slot, z_slot]] = value;
                    self.field[[i, y_slot, z_slot]] = value;
                }
            }
        }

        Ok(())
    }

    /// Stored sample at signed grid indices, without the axial phase correction.
    pub fn raw_sample(
        &self,
        x_index: isize,
        y_index: isize,
        z_index: isize,
    ) -> Option<ComplexSample> {
        let y_index = -(y_index.checked_abs()?);
        self.grid
            .storage_index(x_index, y_index, z_index)
            .map(|index| self.field[index])
    }

    /// Nearest-neighbour field at `location` (buffer space).
    ///
    /// The amplitude comes from the closest grid sample; the axial phase is
    /// corrected exactly for the offset between `location.z` and that sample.
    /// Locations outside the grid return `None`.
    pub fn buffer_field(&self, location: Vector3) -> Option<ComplexSample> {
        let grid = &self.grid;
        let x_index = (location.x / grid.step.x + 0.5).floor();
        let y_index = (location.y / grid.step.y + 0.5).floor();
        let z_index = ((location.z - grid.center.z) / grid.step.z + 0.5).floor();
        let within = |index: f64, half: isize| index.abs() <= half as f64;
        if !(within(x_index, grid.x_half())
            && within(y_index, grid.y_half())
            && within(z_index, grid.z_half()))
        {
            return None;
        }

        let z_index = z_index as isize;
        let sample = self.raw_sample(x_index as isize, y_index as isize, z_index)?;
        let z_quantized = grid.center.z + z_index as f64 * grid.step.z;
        let residual = 2.0 * (location.z - z_quantized);
        let correction = (Complex64::i() * self.wavenumber * residual).exp();
        Some(sample * correction)
    }

    /// Maps a phantom-space scatterer into buffer space for `beamline`.
    pub fn phantom_to_buffer(&self, scatterer: &Scatterer, beamline: usize) -> Vector3 {
        let left_end = beamline as f64 * self.array.pitch();
        Vector3::new(
            -self.grid.size.x / 2.0 + (scatterer.x - left_end),
            scatterer.y - self.grid.center.y,
            scatterer.z + self.phantom_gap,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::array::ElementGeometry;
    use crate::phantom::{BackscatterPoint, ScattererPhantom};

    fn phantom() -> ScattererPhantom {
        ScattererPhantom::new(
            Vector3::new(4e-3, 2e-3, 3e-3),
            1500.0,
            [0.0, 5.0, 0.0],
            vec![BackscatterPoint {
                frequency_mhz: 1.0,
                value: 1.0,
            }],
            Vec::new(),
        )
        .unwrap()
    }

    fn array() -> ArrayGeometry {
        let element = ElementGeometry {
            width: 0.18e-3,
            length: 1e-3,
        };
        ArrayGeometry::new(element, 0.2e-3, 8, 1500.0).unwrap()
    }

    fn settings() -> BufferSettings {
        BufferSettings {
            transmit_focus: 2e-3,
            beam_width: 1e-3,
            grid_step: Vector3::new(0.1e-3, 0.25e-3, 0.25e-3),
            assumed_sound_speed: 1500.0,
            phantom_gap: 1e-3,
            dense_factor: DEFAULT_DENSE_FACTOR,
        }
    }

    #[test]
    fn sample_counts_are_odd() {
        let phantom = phantom();
        let array = array();
        for &(width, step) in &[(1e-3, 0.25e-3), (1.1e-3, 0.2e-3), (2e-3, 0.3e-3)] {
            let mut s = settings();
            s.beam_width = width;
            s.grid_step = Vector3::new(step, step, step);
            let grid = FieldGrid::new(&s, phantom.size(), &array).unwrap();
            assert_eq!(grid.x_len % 2, 1);
            assert_eq!(grid.y_len % 2, 1);
            assert_eq!(grid.z_len % 2, 1);
            assert_eq!(grid.x_len_extra, grid.x_len + 2 * 7);
        }
    }

    #[test]
    fn grid_geometry_follows_phantom_and_array() {
        let phantom = phantom();
        let array = array();
        let grid = FieldGrid::new(&settings(), phantom.size(), &array).unwrap();
        assert!((grid.size.z - 5e-3).abs() < 1e-15);
        assert_eq!(grid.size.y, 1e-3);
        assert_eq!(grid.center.x, 2e-3);
        assert_eq!(grid.center.y, 1e-3);
        assert_eq!(grid.step.x, 0.1e-3);
        assert_eq!(grid.y_len, 5);
        assert_eq!(grid.z_len, 21);
    }

    #[test]
    fn zero_dense_factor_is_rejected() {
        let phantom = phantom();
        let array = array();
        let mut s = settings();
        s.dense_factor = 0;
        assert!(FieldGrid::new(&s, phantom.size(), &array).is_err());
    }

    #[test]
    fn buffer_is_laterally_mirrored() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let mut buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        buffer.calculate_buffer_field(2e6).unwrap();

        let grid = *buffer.grid();
        let (xh, yh, zh) = (grid.x_half(), grid.y_half(), grid.z_half());
        for z in -zh..=zh {
            for y in -yh..=0 {
                for x in 1..=xh {
                    assert_eq!(buffer.raw_sample(x, y, z), buffer.raw_sample(-x, y, z));
                }
            }
        }
        assert!(buffer.raw_sample(0, 0, 0).unwrap().norm() > 0.0);
        assert_eq!(buffer.raw_sample(0, 1, 3), buffer.raw_sample(0, -1, 3));
        assert!(buffer.raw_sample(xh + 1, 0, 0).is_none());
    }

    #[test]
    fn lookup_applies_exact_axial_phase() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let mut buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        buffer.calculate_buffer_field(3e6).unwrap();

        let center = buffer.center();
        let on_grid = buffer.buffer_field(Vector3::new(0.0, 0.0, center.z)).unwrap();
        assert_eq!(Some(on_grid), buffer.raw_sample(0, 0, 0));

        let offset = 0.05e-3;
        let shifted = buffer
            .buffer_field(Vector3::new(0.0, 0.0, center.z + offset))
            .unwrap();
        let k = buffer.wavenumber();
        let expected = on_grid * (Complex64::i() * k * (2.0 * offset)).exp();
        assert!((shifted - expected).norm() <= 1e-9 * on_grid.norm());

        assert!(buffer.buffer_field(Vector3::new(1.0, 0.0, center.z)).is_none());
        assert!(buffer.buffer_field(Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn extreme_locations_fall_outside_the_grid() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let mut buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        buffer.calculate_buffer_field(2e6).unwrap();

        let z = buffer.center().z;
        for location in [
            Vector3::new(-1e300, 0.0, z),
            Vector3::new(0.0, 1e300, z),
            Vector3::new(0.0, 0.0, -1e300),
            Vector3::new(f64::NAN, 0.0, z),
            Vector3::new(0.0, f64::NEG_INFINITY, z),
        ] {
            assert!(buffer.buffer_field(location).is_none(), "{:?}", location);
        }
        assert!(buffer.raw_sample(isize::MIN, 0, 0).is_none());
        assert!(buffer.raw_sample(0, isize::MIN, 0).is_none());
        assert!(buffer.raw_sample(0, 0, isize::MIN).is_none());
    }

    #[test]
    fn elevation_lookup_reflects_positive_half() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let mut buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        buffer.calculate_buffer_field(1.5e6).unwrap();

        let z = buffer.center().z;
        let above = buffer.buffer_field(Vector3::new(0.2e-3, 0.25e-3, z)).unwrap();
        let below = buffer.buffer_field(Vector3::new(0.2e-3, -0.25e-3, z)).unwrap();
        assert_eq!(above, below);
    }

    #[test]
    fn wavenumber_carries_attenuation() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let mut buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        buffer.calculate_buffer_field(2e6).unwrap();
        let k = buffer.wavenumber();
        assert!((k.re - 2.0 * PI * 2e6 / 1500.0).abs() < 1e-9);
        assert!((k.im - 10.0).abs() < 1e-12);
    }

    #[test]
    fn scatterer_mapping_matches_beamline_offset() {
        let phantom = phantom();
        let array = array();
        let fresnel = FresnelTable::new();
        let buffer = FieldBuffer::new(settings(), &phantom, &array, &fresnel).unwrap();
        let mapped = buffer.phantom_to_buffer(&Scatterer::new(1.3e-3, 0.4e-3, 2e-3), 3);
        assert!((mapped.x - (-0.5e-3 + 1.3e-3 - 3.0 * 0.2e-3)).abs() < 1e-15);
        assert!((mapped.y - (0.4e-3 - 1e-3)).abs() < 1e-15);
        assert!((mapped.z - 3e-3).abs() < 1e-15);
    }
}
