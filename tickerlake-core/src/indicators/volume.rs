//! Trailing volume average and volume ratio.
//!
//! The average at bar `i` covers the `period` bars *before* `i`, so the
//! ratio compares today's volume against a baseline that excludes it.

use super::{rolling_mean, Indicator};
use crate::domain::AggregateBar;

#[derive(Debug, Clone)]
pub struct VolumeAverage {
    period: usize,
    name: String,
}

impl VolumeAverage {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume average period must be >= 1");
        Self {
            period,
            name: format!("volume_avg_{period}"),
        }
    }
}

impl Indicator for VolumeAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[AggregateBar]) -> Vec<Option<f64>> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        let inclusive = rolling_mean(&volumes, self.period);

        // Shift by one so bar i sees the window ending at i-1.
        std::iter::once(None)
            .chain(inclusive)
            .take(bars.len())
            .collect()
    }
}

/// Current volume over the trailing average; `None` when the average is
/// missing or zero.
pub fn volume_ratio(volume: u64, average: Option<f64>) -> Option<f64> {
    match average {
        Some(avg) if avg > 0.0 => Some(volume as f64 / avg),
        _ => None,
    }
}
