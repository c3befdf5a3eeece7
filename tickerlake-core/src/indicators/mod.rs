//! Indicator engine.
//!
//! Every indicator maps an ordered series of one ticker+timeframe's
//! aggregate bars to one `Option<f64>` per bar. `None` marks a trailing
//! window that is not yet full. Values at index `i` read only bars `0..=i`.
//!
//! ATR is the simple trailing mean of true range (not Wilder smoothing);
//! the formula is fixed so that every recompute agrees with the last.

pub mod atr;
pub mod sma;
pub mod suite;
pub mod volume;

pub use atr::{true_range, Atr};
pub use sma::Sma;
pub use suite::{has_incomplete_history, IndicatorSettings, IndicatorSuite, DEFAULT_HVC_VOLUME_RATIO};
pub use volume::{volume_ratio, VolumeAverage};

use crate::domain::AggregateBar;

/// A single-series indicator over aggregate bars.
pub trait Indicator: Send + Sync {
    /// Column name, e.g. `sma_20`.
    fn name(&self) -> &str;

    /// Number of bars before the first defined value.
    fn lookback(&self) -> usize;

    /// One value per bar; `None` until the window is full.
    fn compute(&self, bars: &[AggregateBar]) -> Vec<Option<f64>>;
}

/// Trailing mean over `period` values, `None` for the first `period - 1`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = Some(sum / period as f64);

    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = Some(sum / period as f64);
    }

    result
}

/// Create synthetic daily bars from close prices for testing.
///
/// open = prev close (or close for the first bar), high/low = max/min of
/// open and close ±1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<AggregateBar> {
    let volumes = vec![1000; closes.len()];
    make_bars_with_volume(closes, &volumes)
}

#[cfg(test)]
pub fn make_bars_with_volume(closes: &[f64], volumes: &[u64]) -> Vec<AggregateBar> {
    use crate::domain::Timeframe;
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let date = base_date + chrono::Duration::days(i as i64);
            AggregateBar {
                ticker: "TEST".to_string(),
                timeframe: Timeframe::Daily,
                period_start: date,
                period_end: date,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume,
                transactions: volume / 100,
                bar_count: 1,
            }
        })
        .collect()
}

/// Assert two values agree within a relative tolerance.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    let tolerance = epsilon * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, tolerance={tolerance}",
        (actual - expected).abs()
    );
}

/// Default relative tolerance for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_basic() {
        let result = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(result[0], None);
        assert_approx(result[1].unwrap(), 1.5, DEFAULT_EPSILON);
        assert_approx(result[2].unwrap(), 2.5, DEFAULT_EPSILON);
        assert_approx(result[3].unwrap(), 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_short_input_is_all_missing() {
        assert!(rolling_mean(&[1.0, 2.0], 3).iter().all(Option::is_none));
        assert!(rolling_mean(&[], 3).is_empty());
    }

    #[test]
    fn rolling_mean_zero_period_is_all_missing() {
        assert!(rolling_mean(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }
}
