pub mod spectra;
pub mod synthesis;

pub use spectra::RfSpectra;
pub use synthesis::{RfSynthesizer, SweepPlan, SynthesisSettings};
