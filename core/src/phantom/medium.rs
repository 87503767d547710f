use serde::{Deserialize, Serialize};

use crate::prelude::{SimResult, Vector3};

/// Point scatterer position in phantom space, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scatterer {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Scatterer {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Scattering medium consumed by the field buffer and the synthesis loop.
pub trait Phantom: Send + Sync {
    /// Extent of the phantom along x, y and z.
    fn size(&self) -> Vector3;

    /// Reference sound speed of the medium, m/s.
    fn sound_speed(&self) -> f64;

    /// Amplitude attenuation at `frequency_hz`, Np/m.
    fn attenuation(&self, frequency_hz: f64) -> f64;

    /// Backscatter coefficient at `frequency_mhz`.
    fn backscatter_coefficient(&self, frequency_mhz: f64) -> f64;

    /// Orders scatterers by axial coordinate. Must run once before any range query.
    fn sort_scatterers(&mut self);

    /// Scatterers whose axial coordinate lies in `[z_start, z_end)`.
    fn scatterers_between(&self, z_start: f64, z_end: f64) -> SimResult<&[Scatterer]>;
}
