use crate::workflow::config::SimulationConfig;
use anyhow::{ensure, Context};
use echocore::math::FresnelTable;
use echocore::phantom::{Phantom, ScattererPhantom};
use echocore::processing::{RfSpectra, RfSynthesizer};
use echocore::telemetry::SweepMetrics;
use log::info;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Debug)]
pub struct WorkflowResult {
    pub spectra: RfSpectra,
    pub metrics: SweepMetrics,
    /// Strongest echo per beamline, seconds after transmit.
    pub echo_times: Vec<Option<f64>>,
}

#[derive(Clone)]
pub struct Runner {
    config: SimulationConfig,
    abort: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the sweep at the next frequency boundary.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Loads the configured phantom, sweeps it and writes the RF file.
    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        self.config.validate()?;
        ensure_output_dir(&self.config.rf_output_file)?;
        let mut phantom = ScattererPhantom::load(&self.config.phantom_file).with_context(|| {
            format!("loading phantom {}", self.config.phantom_file.display())
        })?;
        let result = self.simulate(&mut phantom)?;
        result
            .spectra
            .save(&self.config.rf_output_file)
            .with_context(|| {
                format!("writing rf data {}", self.config.rf_output_file.display())
            })?;
        info!(
            "wrote {} x {} spectra to {}",
            result.spectra.beamline_count(),
            result.spectra.freq_point_count(),
            self.config.rf_output_file.display()
        );
        Ok(result)
    }

    /// Runs the sweep against an already loaded phantom; writes nothing.
    pub fn simulate(&self, phantom: &mut dyn Phantom) -> anyhow::Result<WorkflowResult> {
        let array = self.config.build_array()?;
        let fresnel = FresnelTable::new();
        let synthesizer = RfSynthesizer::new(self.config.to_synthesis_settings())
            .with_abort(self.abort.clone());

        let spectra = synthesizer
            .run(phantom, &array, &fresnel)
            .context("synthesizing rf spectra")?;
        let echo_times = spectra.peak_echo_times();

        Ok(WorkflowResult {
            metrics: synthesizer.metrics(),
            spectra,
            echo_times,
        })
    }
}

fn ensure_output_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure!(
            parent.is_dir(),
            "output directory {} does not exist",
            parent.display()
        );
    }
    Ok(())
}
