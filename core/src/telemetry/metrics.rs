use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<SweepMetrics>,
}

/// Counters gathered over one frequency sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepMetrics {
    pub frequencies: usize,
    pub scatterers_sampled: usize,
    pub outside_buffer: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SweepMetrics::default()),
        }
    }

    /// Records one finished frequency and returns how many have finished.
    pub fn record_frequency(&self, sampled: usize, outside: usize) -> usize {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frequencies += 1;
            metrics.scatterers_sampled += sampled;
            metrics.outside_buffer += outside;
            metrics.frequencies
        } else {
            0
        }
    }

    pub fn reset(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics = SweepMetrics::default();
        }
    }

    pub fn snapshot(&self) -> SweepMetrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            SweepMetrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
