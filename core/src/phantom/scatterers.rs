use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::phantom::medium::{Phantom, Scatterer};
use crate::prelude::{SimError, SimResult, Vector3};

/// One sample of the tabulated backscatter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackscatterPoint {
    pub frequency_mhz: f64,
    pub value: f64,
}

/// Phantom held in memory and persisted as JSON.
///
/// Attenuation follows `a0 + a1 f + a2 f²` with `f` in MHz; the backscatter
/// coefficient is interpolated linearly and held constant past both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScattererPhantom {
    size: Vector3,
    sound_speed: f64,
    attenuation: [f64; 3],
    backscatter: Vec<BackscatterPoint>,
    scatterers: Vec<Scatterer>,
    #[serde(skip)]
    sorted: bool,
}

impl ScattererPhantom {
    pub fn new(
        size: Vector3,
        sound_speed: f64,
        attenuation: [f64; 3],
        backscatter: Vec<BackscatterPoint>,
        scatterers: Vec<Scatterer>,
    ) -> SimResult<Self> {
        let mut phantom = Self {
            size,
            sound_speed,
            attenuation,
            backscatter,
            scatterers,
            sorted: false,
        };
        phantom.validate()?;
        Ok(phantom)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut phantom: ScattererPhantom = serde_json::from_reader(reader)?;
        phantom.validate()?;
        info!(
            "loaded phantom {} with {} scatterers",
            path.display(),
            phantom.scatterers.len()
        );
        Ok(phantom)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn scatterers(&self) -> &[Scatterer] {
        &self.scatterers
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    fn validate(&mut self) -> SimResult<()> {
        let Vector3 { x, y, z } = self.size;
        if !(x > 0.0 && y > 0.0 && z > 0.0) {
            return Err(SimError::Phantom(format!(
                "phantom size {:?} must be positive",
                self.size
            )));
        }
        if !(self.sound_speed > 0.0) {
            return Err(SimError::Phantom(format!(
                "sound speed {} must be positive",
                self.sound_speed
            )));
        }
        if self.backscatter.is_empty() {
            return Err(SimError::Phantom("backscatter table is empty".into()));
        }
        if let Some(point) = self
            .backscatter
            .iter()
            .find(|p| !(p.value >= 0.0) || !p.frequency_mhz.is_finite())
        {
            return Err(SimError::Phantom(format!(
                "invalid backscatter sample {:?}",
                point
            )));
        }
        let inside = |value: f64, extent: f64| (0.0..=extent).contains(&value);
        if let Some(scatterer) = self
            .scatterers
            .iter()
            .find(|s| !(inside(s.x, x) && inside(s.y, y) && inside(s.z, z)))
        {
            return Err(SimError::Phantom(format!(
                "scatterer {:?} lies outside the phantom {:?}",
                scatterer, self.size
            )));
        }
        self.backscatter
            .sort_by(|a, b| a.frequency_mhz.total_cmp(&b.frequency_mhz));
        self.sorted = false;
        Ok(())
    }
}

impl Phantom for ScattererPhantom {
    fn size(&self) -> Vector3 {
        self.size
    }

    fn sound_speed(&self) -> f64 {
        self.sound_speed
    }

    fn attenuation(&self, frequency_hz: f64) -> f64 {
        let f = frequency_hz / 1e6;
        let [a0, a1, a2] = self.attenuation;
        a0 + a1 * f + a2 * f * f
    }

    fn backscatter_coefficient(&self, frequency_mhz: f64) -> f64 {
        let table = &self.backscatter;
        let upper = table.partition_point(|p| p.frequency_mhz < frequency_mhz);
        if upper == 0 {
            return table[0].value;
        }
        if upper == table.len() {
            return table[table.len() - 1].value;
        }

        let (lo, hi) = (table[upper - 1], table[upper]);
        let span = hi.frequency_mhz - lo.frequency_mhz;
        if span <= 0.0 {
            return hi.value;
        }
        let t = (frequency_mhz - lo.frequency_mhz) / span;
        lo.value + (hi.value - lo.value) * t
    }

    fn sort_scatterers(&mut self) {
        self.scatterers.sort_by(|a, b| a.z.total_cmp(&b.z));
        self.sorted = true;
    }

    fn scatterers_between(&self, z_start: f64, z_end: f64) -> SimResult<&[Scatterer]> {
        if !self.sorted {
            return Err(SimError::Phantom(
                "scatterers queried before sorting".into(),
            ));
        }
        let first = self.scatterers.partition_point(|s| s.z < z_start);
        let last = self.scatterers.partition_point(|s| s.z < z_end).max(first);
        Ok(&self.scatterers[first..last])
    }
}
