use anyhow::{bail, ensure, Context};
use echocore::acoustics::{
    ArrayGeometry, BufferSettings, ElementGeometry, DEFAULT_DENSE_FACTOR, FULL_APERTURE,
};
use echocore::processing::SynthesisSettings;
use echocore::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reads the order-sensitive `label: value[, value...]` text format.
///
/// Labels are free text; only the colon position matters. Each field takes
/// its tokens from the rest of the line after the next colon.
pub struct FieldScanner<'a> {
    rest: &'a str,
}

impl<'a> FieldScanner<'a> {
    pub fn new(contents: &'a str) -> Self {
        Self { rest: contents }
    }

    fn tokens(&mut self, field: &str, count: usize) -> anyhow::Result<Vec<&'a str>> {
        let colon = self
            .rest
            .find(':')
            .with_context(|| format!("missing `:` before field `{}`", field))?;
        let after = &self.rest[colon + 1..];
        let line_end = after.find('\n').unwrap_or(after.len());
        self.rest = &after[line_end..];

        let tokens: Vec<&str> = after[..line_end]
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .collect();
        if tokens.len() < count {
            bail!(
                "field `{}` expects {} value(s), found {}",
                field,
                count,
                tokens.len()
            );
        }
        Ok(tokens[..count].to_vec())
    }

    pub fn numbers<T>(&mut self, field: &str, count: usize) -> anyhow::Result<Vec<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.tokens(field, count)?
            .into_iter()
            .map(|token| {
                token
                    .parse::<T>()
                    .with_context(|| format!("field `{}`: bad value `{}`", field, token))
            })
            .collect()
    }

    pub fn number<T>(&mut self, field: &str) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let mut values = self.numbers(field, 1)?;
        values.pop().with_context(|| format!("field `{}` is empty", field))
    }

    pub fn text(&mut self, field: &str) -> anyhow::Result<String> {
        Ok(self.tokens(field, 1)?[0].to_string())
    }
}

pub fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn full_aperture() -> f64 {
    FULL_APERTURE
}

fn default_dense_factor() -> usize {
    DEFAULT_DENSE_FACTOR
}

fn default_workers() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub element: ElementGeometry,
    pub element_pitch: f64,
    pub element_count: usize,
    pub transmit_focus: f64,
    pub beam_width: f64,
    pub grid_step: Vector3,
    pub beamline_count: usize,
    pub beam_spacing: f64,
    pub max_frequency: f64,
    pub phantom_file: PathBuf,
    pub rf_output_file: PathBuf,
    pub machine_sound_speed: f64,
    pub phantom_gap: f64,
    #[serde(default = "full_aperture")]
    pub transmit_f_number: f64,
    #[serde(default = "full_aperture")]
    pub receive_f_number: f64,
    #[serde(default = "default_dense_factor")]
    pub dense_factor: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading simulation config {}", path_ref.display()))?;
        let config = if is_yaml(path_ref) {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing simulation config {}", path_ref.display()))?
        } else {
            Self::parse_legacy(&contents)
                .with_context(|| format!("parsing simulation config {}", path_ref.display()))?
        };
        Ok(config)
    }

    /// Parses the colon-delimited format, one field per line in fixed order.
    pub fn parse_legacy(contents: &str) -> anyhow::Result<Self> {
        let mut scanner = FieldScanner::new(contents);
        let element = scanner.numbers::<f64>("element width, length", 2)?;
        let pitch_count = scanner.tokens("element pitch, count", 2)?;
        let element_pitch: f64 = pitch_count[0]
            .parse()
            .with_context(|| format!("bad element pitch `{}`", pitch_count[0]))?;
        let element_count: usize = pitch_count[1]
            .parse()
            .with_context(|| format!("bad element count `{}`", pitch_count[1]))?;
        let transmit_focus = scanner.number("transmit focus")?;
        let beam_width = scanner.number("beam width")?;
        let step = scanner.numbers::<f64>("grid step x, y, z", 3)?;
        let beamline_count = scanner.number("beamline count")?;
        let beam_spacing = scanner.number("beam spacing")?;
        let max_frequency = scanner.number("max frequency")?;
        let phantom_file = PathBuf::from(scanner.text("phantom file")?);
        let rf_output_file = PathBuf::from(scanner.text("rf output file")?);
        let machine_sound_speed = scanner.number("machine sound speed")?;
        let phantom_gap = scanner.number("phantom gap")?;

        Ok(Self {
            element: ElementGeometry {
                width: element[0],
                length: element[1],
            },
            element_pitch,
            element_count,
            transmit_focus,
            beam_width,
            grid_step: Vector3::new(step[0], step[1], step[2]),
            beamline_count,
            beam_spacing,
            max_frequency,
            phantom_file,
            rf_output_file,
            machine_sound_speed,
            phantom_gap,
            transmit_f_number: FULL_APERTURE,
            receive_f_number: FULL_APERTURE,
            dense_factor: DEFAULT_DENSE_FACTOR,
            workers: default_workers(),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.beamline_count > 0, "beamline count must be positive");
        ensure!(
            self.beam_spacing > 0.0 && self.beam_width > 0.0,
            "beam spacing {} and beam width {} must be positive",
            self.beam_spacing,
            self.beam_width
        );
        ensure!(
            self.max_frequency > 0.0,
            "max frequency {} must be positive",
            self.max_frequency
        );
        ensure!(
            self.phantom_gap >= 0.0,
            "phantom gap {} must not be negative",
            self.phantom_gap
        );
        ensure!(self.workers > 0, "worker count must be positive");
        Ok(())
    }

    pub fn build_array(&self) -> anyhow::Result<ArrayGeometry> {
        let mut array = ArrayGeometry::new(
            self.element,
            self.element_pitch,
            self.element_count,
            self.machine_sound_speed,
        )
        .context("building transducer array")?;
        array.set_transmit_f_number(self.transmit_f_number);
        array.set_receive_f_number(self.receive_f_number);
        Ok(array)
    }

    pub fn to_synthesis_settings(&self) -> SynthesisSettings {
        SynthesisSettings {
            buffer: BufferSettings {
                transmit_focus: self.transmit_focus,
                beam_width: self.beam_width,
                grid_step: self.grid_step,
                assumed_sound_speed: self.machine_sound_speed,
                phantom_gap: self.phantom_gap,
                dense_factor: self.dense_factor,
            },
            beamline_count: self.beamline_count,
            beam_spacing: self.beam_spacing,
            max_frequency: self.max_frequency,
            workers: self.workers,
        }
    }
}
