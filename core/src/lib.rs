//! Pressure-field and RF-synthesis core for the pulse-echo ultrasound simulator.
//!
//! A linear array's pulse-echo field is tabulated per frequency on a
//! symmetric grid and sampled at every scatterer of a phantom to build the
//! frequency-domain RF spectrum of each beamline.

pub mod acoustics;
pub mod math;
pub mod phantom;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{SimError, SimResult, Vector3};
