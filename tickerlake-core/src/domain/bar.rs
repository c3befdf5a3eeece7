//! Bars at each stage of the Silver pipeline.
//!
//! - `RawBar`: one trading day as ingested into Bronze. Never mutated.
//! - `AdjustedBar`: a `RawBar` rescaled by every later split.
//! - `AggregateBar`: an OHLCV bucket for a timeframe (daily buckets hold one bar).

use super::timeframe::Timeframe;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw daily OHLCV for one ticker, identified by (ticker, date).
///
/// Volume is signed so that a negative print from upstream can be detected
/// and excluded instead of wrapping. `transactions` (trade count) defaults to
/// zero for sources that do not report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(default)]
    pub transactions: u64,
}

impl RawBar {
    /// Returns true if any price field is NaN or infinite.
    pub fn has_non_finite_price(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }
}

/// A raw bar after split adjustment.
///
/// `factor` is the cumulative product of every split executed after `date`;
/// prices were divided by it, volume and transactions multiplied by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub transactions: u64,
    pub factor: f64,
}

impl AdjustedBar {
    /// Daily aggregate carrying exactly this bar.
    pub fn to_daily(&self) -> AggregateBar {
        AggregateBar {
            ticker: self.ticker.clone(),
            timeframe: Timeframe::Daily,
            period_start: self.date,
            period_end: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            transactions: self.transactions,
            bar_count: 1,
        }
    }
}

/// OHLCV bucket for one ticker over one calendar period.
///
/// `period_start`/`period_end` are the calendar bounds of the bucket
/// (Monday..Sunday, first..last day of month, or the single day), not the
/// first and last trading days inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBar {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub transactions: u64,
    pub bar_count: u32,
}

impl AggregateBar {
    /// Representative date of the bucket (its calendar start).
    pub fn date(&self) -> NaiveDate {
        self.period_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawBar {
        RawBar {
            ticker: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
            transactions: 420,
        }
    }

    #[test]
    fn finite_prices_pass() {
        assert!(!sample_raw().has_non_finite_price());
    }

    #[test]
    fn nan_price_is_detected() {
        let mut bar = sample_raw();
        bar.low = f64::NAN;
        assert!(bar.has_non_finite_price());
    }

    #[test]
    fn infinite_price_is_detected() {
        let mut bar = sample_raw();
        bar.high = f64::INFINITY;
        assert!(bar.has_non_finite_price());
    }

    #[test]
    fn adjusted_bar_becomes_single_day_aggregate() {
        let adjusted = AdjustedBar {
            ticker: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 50.0,
            high: 52.5,
            low: 49.0,
            close: 51.5,
            volume: 100_000,
            transactions: 840,
            factor: 2.0,
        };
        let daily = adjusted.to_daily();
        assert_eq!(daily.timeframe, Timeframe::Daily);
        assert_eq!(daily.period_start, adjusted.date);
        assert_eq!(daily.period_end, adjusted.date);
        assert_eq!(daily.date(), adjusted.date);
        assert_eq!(daily.bar_count, 1);
        assert_eq!(daily.volume, 100_000);
        assert_eq!(daily.transactions, 840);
    }

    #[test]
    fn transactions_default_to_zero_when_absent() {
        let json = r#"{"ticker":"SPY","date":"2024-01-02","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":5}"#;
        let bar: RawBar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.transactions, 0);
    }

    #[test]
    fn serde_roundtrip() {
        let bar = sample_raw();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: RawBar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
