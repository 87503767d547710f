//! Frequency sweep that turns a phantom into per-beamline RF spectra.
//!
//! For every frequency bin the field buffer is recomputed, every scatterer
//! selected for a beamline samples it, and the weighted sum times `i·f`
//! becomes that beamline's bin. The DC bin is left at zero.

use num_complex::Complex64;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::acoustics::{ArrayGeometry, BufferSettings, FieldBuffer, FieldGrid};
use crate::math::FresnelTable;
use crate::phantom::Phantom;
use crate::prelude::{SimError, SimResult};
use crate::processing::spectra::RfSpectra;
use crate::telemetry::{LogManager, MetricsRecorder, SweepMetrics};

/// Everything the sweep needs besides the phantom, the array and the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisSettings {
    pub buffer: BufferSettings,
    pub beamline_count: usize,
    pub beam_spacing: f64,
    /// Highest simulated frequency, Hz; also the sampling rate of the RF line.
    pub max_frequency: f64,
    /// Threads sharing the sweep; each owns its own field buffer.
    pub workers: usize,
}

/// Frequency sampling derived from the image depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPlan {
    pub freq_step: f64,
    pub freq_point_count: usize,
}

impl SweepPlan {
    /// `df · dt = 1 / N`: the echo window `2 depth / c` sets the frequency step.
    pub fn new(image_depth: f64, sound_speed: f64, max_frequency: f64) -> SimResult<Self> {
        let travel_time = 2.0 * image_depth / sound_speed;
        let points = (travel_time * max_frequency).floor();
        if !points.is_finite() || points < 1.0 {
            return Err(SimError::InvalidInput(format!(
                "no frequency points for depth {} m, speed {} m/s, max frequency {} Hz",
                image_depth, sound_speed, max_frequency
            )));
        }

        Ok(Self {
            freq_step: max_frequency / points,
            freq_point_count: points as usize,
        })
    }

    pub fn frequency(&self, index: usize) -> f64 {
        index as f64 * self.freq_step
    }
}

type FrequencyColumn = (usize, Vec<Complex64>);

pub struct RfSynthesizer {
    settings: SynthesisSettings,
    abort: Arc<AtomicBool>,
    metrics: MetricsRecorder,
}

impl RfSynthesizer {
    pub fn new(settings: SynthesisSettings) -> Self {
        Self {
            settings,
            abort: Arc::new(AtomicBool::new(false)),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Shares an externally owned abort flag, checked between frequencies.
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn metrics(&self) -> SweepMetrics {
        self.metrics.snapshot()
    }

    pub fn plan(&self, phantom: &dyn Phantom, array: &ArrayGeometry) -> SimResult<SweepPlan> {
        let grid = FieldGrid::new(&self.settings.buffer, phantom.size(), array)?;
        SweepPlan::new(
            grid.size.z,
            array.assumed_sound_speed(),
            self.settings.max_frequency,
        )
    }

    /// Sorts the phantom and runs the whole sweep.
    ///
    /// Counters and the elapsed-time clock restart with every call. Nothing
    /// is returned unless every frequency completed.
    pub fn run(
        &self,
        phantom: &mut dyn Phantom,
        array: &ArrayGeometry,
        fresnel: &FresnelTable,
    ) -> SimResult<RfSpectra> {
        phantom.sort_scatterers();
        let phantom: &dyn Phantom = phantom;
        self.metrics.reset();
        let logger = LogManager::new();

        let plan = self.plan(phantom, array)?;
        let count = plan.freq_point_count;
        let total = count.saturating_sub(1);
        let workers = self.settings.workers.clamp(1, total.max(1));
        logger.record(&format!(
            "sweeping {} frequencies of {:.1} Hz over {} beamlines on {} worker(s)",
            total, plan.freq_step, self.settings.beamline_count, workers
        ));

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|err| {
                SimError::InvalidInput(format!("cannot start {} workers: {}", workers, err))
            })?;

        // Each rayon job owns its field buffer; the shared inputs are read-only.
        let columns: Vec<FrequencyColumn> = pool.install(|| {
            (1..count)
                .into_par_iter()
                .map_init(
                    || FieldBuffer::new(self.settings.buffer, phantom, array, fresnel),
                    |buffer, index| {
                        let buffer = buffer
                            .as_mut()
                            .map_err(|err| SimError::InvalidGeometry(err.to_string()))?;
                        self.sweep_frequency(buffer, phantom, plan, index, &logger)
                    },
                )
                .collect::<SimResult<Vec<_>>>()
        })?;

        let mut spectra = RfSpectra::zeros(plan.freq_step, count, self.settings.beamline_count);
        for (index, column) in columns {
            spectra.set_frequency(index, &column);
        }

        let metrics = self.metrics.snapshot();
        logger.record(&format!(
            "sweep done: {} frequencies, {} scatterer samples, {} outside the field buffer",
            metrics.frequencies, metrics.scatterers_sampled, metrics.outside_buffer
        ));
        Ok(spectra)
    }

    fn sweep_frequency(
        &self,
        buffer: &mut FieldBuffer<'_>,
        phantom: &dyn Phantom,
        plan: SweepPlan,
        index: usize,
        logger: &LogManager,
    ) -> SimResult<FrequencyColumn> {
        let total = plan.freq_point_count.saturating_sub(1);
        if self.abort.load(Ordering::Relaxed) {
            return Err(SimError::Aborted {
                completed: self.metrics.snapshot().frequencies,
                total,
            });
        }

        let frequency = plan.frequency(index);
        let (column, sampled, outside) =
            self.synthesize_frequency(buffer, phantom, frequency, logger)?;
        let completed = self.metrics.record_frequency(sampled, outside);
        logger.frequency_completed(completed, total, frequency);
        Ok((index, column))
    }

    fn synthesize_frequency(
        &self,
        buffer: &mut FieldBuffer<'_>,
        phantom: &dyn Phantom,
        frequency: f64,
        logger: &LogManager,
    ) -> SimResult<(Vec<Complex64>, usize, usize)> {
        let coefficient = phantom.backscatter_coefficient(frequency / 1e6);
        logger.backscatter(frequency, coefficient);
        let weight = coefficient.sqrt();

        buffer.calculate_buffer_field(frequency)?;

        let settings = &self.settings;
        let transduction = Complex64::new(0.0, frequency);
        let mut column = Vec::with_capacity(settings.beamline_count);
        let (mut sampled, mut outside) = (0usize, 0usize);

        for beamline in 0..settings.beamline_count {
            let left_end = beamline as f64 * settings.beam_spacing;
            let right_end = left_end + settings.buffer.beam_width;

            let mut bin = Complex64::new(0.0, 0.0);
            for scatterer in phantom.scatterers_between(left_end, right_end)? {
                let location = buffer.phantom_to_buffer(scatterer, beamline);
                match buffer.buffer_field(location) {
                    Some(field) => {
                        bin += field * weight;
                        sampled += 1;
                    }
                    None => outside += 1,
                }
            }
            column.push(bin * transduction);
        }

        Ok((column, sampled, outside))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::{ElementGeometry, DEFAULT_DENSE_FACTOR};
    use crate::phantom::{BackscatterPoint, Scatterer, ScattererPhantom};
    use crate::prelude::Vector3;
    use std::f64::consts::PI;

    const SPEED: f64 = 1500.0;
    const GAP: f64 = 1e-3;

    fn phantom(scatterers: Vec<Scatterer>) -> ScattererPhantom {
        ScattererPhantom::new(
            Vector3::new(4e-3, 2e-3, 5.5e-3),
            SPEED,
            [0.0; 3],
            vec![BackscatterPoint {
                frequency_mhz: 0.0,
                value: 4.0,
            }],
            scatterers,
        )
        .unwrap()
    }

    fn array() -> ArrayGeometry {
        let element = ElementGeometry {
            width: 0.18e-3,
            length: 1e-3,
        };
        ArrayGeometry::new(element, 0.2e-3, 8, SPEED).unwrap()
    }

    fn settings(beamline_count: usize, workers: usize) -> SynthesisSettings {
        SynthesisSettings {
            buffer: BufferSettings {
                transmit_focus: -1.0,
                beam_width: 4e-3,
                grid_step: Vector3::new(0.1e-3, 0.25e-3, 0.25e-3),
                assumed_sound_speed: SPEED,
                phantom_gap: GAP,
                dense_factor: DEFAULT_DENSE_FACTOR,
            },
            beamline_count,
            beam_spacing: 0.2e-3,
            max_frequency: 8.5e5,
            workers,
        }
    }

    fn wrap(angle: f64) -> f64 {
        (angle + PI).rem_euclid(2.0 * PI) - PI
    }

    #[test]
    fn sweep_plan_follows_round_trip_time() {
        // 2 * 7.5 mm / 1500 m/s = 10 us
        let plan = SweepPlan::new(7.5e-3, SPEED, 8.5e5).unwrap();
        assert_eq!(plan.freq_point_count, 8);
        assert_eq!(plan.freq_step, 8.5e5 / 8.0);
        assert_eq!(plan.frequency(3), 3.0 * 8.5e5 / 8.0);
        assert!(SweepPlan::new(7.5e-3, SPEED, 1e4).is_err());
    }

    #[test]
    fn single_scatterer_produces_round_trip_phase_ramp() {
        // Buffer depth 2.75 mm + 1 mm gap sits on the buffer center sample.
        let depth = 2.75e-3;
        let mut phantom = phantom(vec![Scatterer::new(2e-3, 1e-3, depth)]);
        let array = array();
        let fresnel = FresnelTable::new();
        let synthesizer = RfSynthesizer::new(settings(1, 1));
        let spectra = synthesizer.run(&mut phantom, &array, &fresnel).unwrap();

        assert_eq!(spectra.freq_point_count(), 8);
        assert_eq!(spectra.beamline_count(), 1);
        assert_eq!(spectra.freq_step(), 8.5e5 / 8.0);

        let line = spectra.beamline(0);
        assert_eq!(line[0], Complex64::new(0.0, 0.0));

        let round_trip = 2.0 * (depth + GAP);
        let residuals: Vec<f64> = (1..8)
            .map(|index| {
                let bin = line[index];
                assert!(bin.norm() > 0.0, "bin {} is empty", index);
                let k = 2.0 * PI * index as f64 * spectra.freq_step() / SPEED;
                wrap(bin.arg() - k * round_trip - PI / 2.0)
            })
            .collect();
        for pair in residuals.windows(2) {
            assert!(wrap(pair[1] - pair[0]).abs() < 0.5, "{:?}", residuals);
        }

        let metrics = synthesizer.metrics();
        assert_eq!(metrics.frequencies, 7);
        assert_eq!(metrics.scatterers_sampled, 7);
        assert_eq!(metrics.outside_buffer, 0);
    }

    #[test]
    fn output_is_identical_across_runs_and_worker_counts() {
        let scatterers = vec![
            Scatterer::new(1.5e-3, 0.8e-3, 0.4e-3),
            Scatterer::new(2.2e-3, 1.3e-3, 1.9e-3),
            Scatterer::new(2.9e-3, 1.0e-3, 3.3e-3),
            Scatterer::new(0.7e-3, 0.6e-3, 2.6e-3),
        ];
        let array = array();
        let fresnel = FresnelTable::new();

        let mut outputs = Vec::new();
        for &workers in &[1usize, 1, 3] {
            let mut phantom = phantom(scatterers.clone());
            let spectra = RfSynthesizer::new(settings(3, workers))
                .run(&mut phantom, &array, &fresnel)
                .unwrap();
            let mut bytes = Vec::new();
            spectra.write_to(&mut bytes).unwrap();
            outputs.push(bytes);
        }

        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[test]
    fn scatterers_outside_the_buffer_are_skipped() {
        // Selected by depth but laterally far beyond the beam.
        let mut phantom = phantom(vec![Scatterer::new(3.9e-3, 1e-3, 0.5e-3)]);
        let array = array();
        let fresnel = FresnelTable::new();
        let mut narrow = settings(1, 1);
        narrow.buffer.beam_width = 1e-3;
        let synthesizer = RfSynthesizer::new(narrow);
        let spectra = synthesizer.run(&mut phantom, &array, &fresnel).unwrap();

        assert!(spectra.bins().iter().all(|c| *c == Complex64::new(0.0, 0.0)));
        assert_eq!(synthesizer.metrics().outside_buffer, synthesizer.metrics().frequencies);
    }

    #[test]
    fn repeated_runs_restart_the_counters() {
        let mut phantom = phantom(vec![Scatterer::new(2e-3, 1e-3, 2.75e-3)]);
        let array = array();
        let fresnel = FresnelTable::new();
        let synthesizer = RfSynthesizer::new(settings(1, 2));

        let first = synthesizer.run(&mut phantom, &array, &fresnel).unwrap();
        let after_first = synthesizer.metrics();
        let second = synthesizer.run(&mut phantom, &array, &fresnel).unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first.frequencies, 7);
        assert_eq!(synthesizer.metrics(), after_first);
    }

    #[test]
    fn abort_flag_stops_the_sweep() {
        let mut phantom = phantom(vec![Scatterer::new(2e-3, 1e-3, 1e-3)]);
        let array = array();
        let fresnel = FresnelTable::new();
        let abort = Arc::new(AtomicBool::new(true));
        let synthesizer = RfSynthesizer::new(settings(1, 2)).with_abort(abort.clone());

        match synthesizer.run(&mut phantom, &array, &fresnel) {
            Err(SimError::Aborted { completed, total }) => {
                assert_eq!(completed, 0);
                assert_eq!(total, 7);
            }
            other => panic!("expected abort, got {:?}", other.map(|s| s.freq_point_count())),
        }
        assert!(synthesizer.abort_handle().load(Ordering::Relaxed));
    }
}
