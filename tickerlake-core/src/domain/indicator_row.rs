//! Indicator rows persisted next to each aggregate table.

use super::timeframe::Timeframe;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Indicator values for one bar of one ticker+timeframe.
///
/// `None` means the trailing window was not full at this bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub timeframe: Timeframe,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub atr_14: Option<f64>,
    pub volume_avg_20: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub is_hvc: bool,
}

impl IndicatorRow {
    /// Names of the indicators that are still undefined at this bar.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("sma_20", self.sma_20),
            ("sma_50", self.sma_50),
            ("sma_200", self.sma_200),
            ("atr_14", self.atr_14),
            ("volume_avg_20", self.volume_avg_20),
            ("volume_ratio", self.volume_ratio),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// True when every trailing window is full.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}
