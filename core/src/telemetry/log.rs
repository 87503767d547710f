use log::{debug, info};
use std::time::Instant;

/// Progress reporting for the frequency sweep.
pub struct LogManager {
    started: Instant,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn record(&self, message: &str) {
        info!("{}", message);
    }

    pub fn backscatter(&self, frequency: f64, coefficient: f64) {
        debug!(
            "backscatter coefficient at {:.4} MHz is {:.6e}",
            frequency / 1e6,
            coefficient
        );
    }

    pub fn frequency_completed(&self, completed: usize, total: usize, frequency: f64) {
        info!(
            "{}/{} completed: {:.4} MHz, {} sec used",
            completed,
            total,
            frequency / 1e6,
            self.started.elapsed().as_secs()
        );
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
