use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Complex pressure amplitude and phase at one wavenumber.
pub type ComplexSample = Complex64;

/// Cartesian position in meters.
///
/// Phantom space has its origin at the phantom corner. Buffer space has its
/// origin at the aperture center with x lateral, y elevational and z axial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Common error type for the simulation core.
#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("phantom error: {0}")]
    Phantom(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sweep aborted after {completed} of {total} frequencies")]
    Aborted { completed: usize, total: usize },
}

pub type SimResult<T> = Result<T, SimError>;
