pub mod fft;
pub mod fresnel;
pub mod stats;

pub use fft::FftHelper;
pub use fresnel::{FresnelSettings, FresnelTable};
pub use stats::StatsHelper;
