//! The fixed indicator set persisted for every Silver timeframe.

use super::{volume_ratio, Atr, Indicator, Sma, VolumeAverage};
use crate::domain::{AggregateBar, IndicatorRow};
use serde::{Deserialize, Serialize};

/// Volume ratio at or above which a bar is flagged as a high-volume close.
pub const DEFAULT_HVC_VOLUME_RATIO: f64 = 3.0;

/// Tunables for the indicator suite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub hvc_volume_ratio_threshold: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            hvc_volume_ratio_threshold: DEFAULT_HVC_VOLUME_RATIO,
        }
    }
}

/// SMA-20/50/200, ATR-14, 20-bar volume average, volume ratio and HVC flag.
#[derive(Debug, Clone)]
pub struct IndicatorSuite {
    sma_20: Sma,
    sma_50: Sma,
    sma_200: Sma,
    atr_14: Atr,
    volume_avg_20: VolumeAverage,
    settings: IndicatorSettings,
}

impl Default for IndicatorSuite {
    fn default() -> Self {
        Self::new(IndicatorSettings::default())
    }
}

impl IndicatorSuite {
    pub fn new(settings: IndicatorSettings) -> Self {
        Self {
            sma_20: Sma::new(20),
            sma_50: Sma::new(50),
            sma_200: Sma::new(200),
            atr_14: Atr::new(14),
            volume_avg_20: VolumeAverage::new(20),
            settings,
        }
    }

    pub fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    /// The single-series indicators, in column order.
    pub fn indicators(&self) -> [&dyn Indicator; 5] {
        [
            &self.sma_20,
            &self.sma_50,
            &self.sma_200,
            &self.atr_14,
            &self.volume_avg_20,
        ]
    }

    /// Longest lookback of the set; bars before this index always have gaps.
    pub fn max_lookback(&self) -> usize {
        self.indicators()
            .iter()
            .map(|i| i.lookback())
            .max()
            .unwrap_or(0)
    }

    /// Compute rows for one ticker+timeframe over its full history.
    ///
    /// Bars are ordered by period start before computing, so the caller's
    /// order does not matter. One row per bar.
    pub fn compute(&self, bars: &[AggregateBar]) -> Vec<IndicatorRow> {
        let mut ordered = bars.to_vec();
        ordered.sort_by_key(|b| b.period_start);

        let sma_20 = self.sma_20.compute(&ordered);
        let sma_50 = self.sma_50.compute(&ordered);
        let sma_200 = self.sma_200.compute(&ordered);
        let atr_14 = self.atr_14.compute(&ordered);
        let volume_avg_20 = self.volume_avg_20.compute(&ordered);

        ordered
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let ratio = volume_ratio(bar.volume, volume_avg_20[i]);
                IndicatorRow {
                    ticker: bar.ticker.clone(),
                    date: bar.date(),
                    timeframe: bar.timeframe,
                    sma_20: sma_20[i],
                    sma_50: sma_50[i],
                    sma_200: sma_200[i],
                    atr_14: atr_14[i],
                    volume_avg_20: volume_avg_20[i],
                    volume_ratio: ratio,
                    is_hvc: ratio.is_some_and(|r| r >= self.settings.hvc_volume_ratio_threshold),
                }
            })
            .collect()
    }

    /// Convenience: compute and keep only rows dated after `after`.
    pub fn compute_tail(
        &self,
        bars: &[AggregateBar],
        after: chrono::NaiveDate,
    ) -> Vec<IndicatorRow> {
        self.compute(bars)
            .into_iter()
            .filter(|row| row.date > after)
            .collect()
    }
}

/// True when the latest row of a series still has an undefined indicator.
pub fn has_incomplete_history(rows: &[IndicatorRow]) -> bool {
    rows.last().is_some_and(|r| !r.is_complete())
}
