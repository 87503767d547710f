pub mod medium;
pub mod scatterers;

pub use medium::{Phantom, Scatterer};
pub use scatterers::{BackscatterPoint, ScattererPhantom};
