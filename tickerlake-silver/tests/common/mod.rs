#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tickerlake_core::data::{
    CheckpointStore, MemoryLake, RawBarStore, SilverStore, SplitRegistry, StoreError, WriteMode,
};
use tickerlake_core::domain::{AggregateBar, IndicatorRow, RawBar, SplitEvent, Timeframe};
use tickerlake_silver::{PipelineConfig, RunReport, SilverPipeline};

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// `n` weekdays starting at `start` (inclusive when it is a weekday).
pub fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut date = start;
    while days.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(date);
        }
        date += Duration::days(1);
    }
    days
}

/// Deterministic, valid OHLCV history for one ticker.
pub fn synthetic_bars(ticker: &str, seed: usize, days: &[NaiveDate]) -> Vec<RawBar> {
    days.iter()
        .enumerate()
        .map(|(i, &date)| {
            let k = i + seed * 7;
            let close = 50.0 + seed as f64 * 10.0 + (k % 17) as f64 * 0.75 + (i / 20) as f64;
            RawBar {
                ticker: ticker.to_string(),
                date,
                open: close - 0.25,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000 + ((k * 37) % 500) as i64,
                transactions: 20 + ((k * 13) % 40) as u64,
            }
        })
        .collect()
}

pub fn universe(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("T{i:02}")).collect()
}

pub fn seed_lake(lake: &MemoryLake, tickers: &[String], days: &[NaiveDate]) {
    for (seed, ticker) in tickers.iter().enumerate() {
        lake.insert_raw_bars(synthetic_bars(ticker, seed, days));
    }
}

pub fn run(lake: &MemoryLake, config: PipelineConfig) -> RunReport {
    SilverPipeline::from_lake(lake, config).unwrap().run().unwrap()
}

pub fn run_default(lake: &MemoryLake) -> RunReport {
    run(lake, PipelineConfig::default())
}

/// Every Silver table of a lake.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub aggregates: BTreeMap<Timeframe, Vec<AggregateBar>>,
    pub indicators: BTreeMap<Timeframe, Vec<IndicatorRow>>,
}

pub fn snapshot(lake: &MemoryLake) -> Snapshot {
    Snapshot {
        aggregates: Timeframe::ALL.iter().map(|&tf| (tf, lake.aggregates(tf))).collect(),
        indicators: Timeframe::ALL.iter().map(|&tf| (tf, lake.indicators(tf))).collect(),
    }
}

/// Memory lake whose Silver writes can be made to fail for one ticker.
#[derive(Default)]
pub struct FailingLake {
    pub inner: MemoryLake,
    failing: Option<String>,
    table_suffix: Option<&'static str>,
    armed: AtomicBool,
}

impl FailingLake {
    pub fn failing_on(ticker: &str) -> Self {
        Self {
            inner: MemoryLake::new(),
            failing: Some(ticker.to_string()),
            table_suffix: None,
            armed: AtomicBool::new(false),
        }
    }

    /// Restrict failures to the indicator tables.
    pub fn indicators_only(mut self) -> Self {
        self.table_suffix = Some("_indicators");
        self
    }

    pub fn arm(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }

    fn check<'a>(&self, table: &str, mut tickers: impl Iterator<Item = &'a str>) -> Result<(), StoreError> {
        let Some(bad) = self.failing.as_deref() else {
            return Ok(());
        };
        if self.table_suffix.is_some_and(|suffix| !table.ends_with(suffix)) {
            return Ok(());
        }
        if self.armed.load(Ordering::SeqCst) && tickers.any(|t| t == bad) {
            return Err(StoreError::WriteFailed {
                table: table.to_string(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl RawBarStore for FailingLake {
    fn list_tickers(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_tickers()
    }

    fn read_raw_bars(&self, tickers: &[String], since: Option<NaiveDate>) -> Result<Vec<RawBar>, StoreError> {
        self.inner.read_raw_bars(tickers, since)
    }

    fn get_max_known_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.get_max_known_date()
    }
}

impl SplitRegistry for FailingLake {
    fn read_splits(&self, tickers: &[String]) -> Result<Vec<SplitEvent>, StoreError> {
        self.inner.read_splits(tickers)
    }
}

impl SilverStore for FailingLake {
    fn write_aggregates(&self, timeframe: Timeframe, bars: &[AggregateBar], mode: WriteMode) -> Result<(), StoreError> {
        self.check(&timeframe.aggregates_table(), bars.iter().map(|b| b.ticker.as_str()))?;
        self.inner.write_aggregates(timeframe, bars, mode)
    }

    fn write_indicators(&self, timeframe: Timeframe, rows: &[IndicatorRow], mode: WriteMode) -> Result<(), StoreError> {
        self.check(&timeframe.indicators_table(), rows.iter().map(|r| r.ticker.as_str()))?;
        self.inner.write_indicators(timeframe, rows, mode)
    }

    fn read_aggregates(&self, timeframe: Timeframe, tickers: &[String]) -> Result<Vec<AggregateBar>, StoreError> {
        self.inner.read_aggregates(timeframe, tickers)
    }

    fn read_indicators(&self, timeframe: Timeframe, tickers: &[String]) -> Result<Vec<IndicatorRow>, StoreError> {
        self.inner.read_indicators(timeframe, tickers)
    }
}

impl CheckpointStore for FailingLake {
    fn get_checkpoint(&self, table: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.get_checkpoint(table)
    }

    fn set_checkpoint(&self, table: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.inner.set_checkpoint(table, date)
    }

    fn get_split_digests(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        self.inner.get_split_digests()
    }

    fn set_split_digests(&self, digests: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.inner.set_split_digests(digests)
    }
}
