//! Storage collaborator traits and structured error types.
//!
//! The orchestrator only talks to these traits, so Parquet, a database or
//! the in-memory lake used in tests can sit behind them interchangeably.
//! Every method takes `&self`; implementations handle their own interior
//! mutability.

use crate::domain::{AggregateBar, IndicatorRow, RawBar, SplitEvent, Timeframe};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// How a Silver write treats rows already stored.
///
/// Rows are keyed by (ticker, date). Both modes are idempotent, so a batch
/// can be replayed in full after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace every stored row of each ticker present in the write.
    Overwrite,
    /// Insert rows, replacing any stored row with the same (ticker, date).
    Append,
}

/// Structured error types for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unreachable: {0}")]
    Unreachable(String),

    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt data in {table}: {message}")]
    Corrupt { table: String, message: String },

    #[error("write rejected for {table}: {message}")]
    WriteFailed { table: String, message: String },
}

/// Bronze daily aggregates. Append-only from the Silver layer's view.
pub trait RawBarStore: Send + Sync {
    /// Every ticker with at least one raw bar, sorted.
    fn list_tickers(&self) -> Result<Vec<String>, StoreError>;

    /// Raw bars for `tickers`, restricted to dates strictly after `since`.
    fn read_raw_bars(
        &self,
        tickers: &[String],
        since: Option<NaiveDate>,
    ) -> Result<Vec<RawBar>, StoreError>;

    /// Latest date present for any ticker, `None` when empty.
    fn get_max_known_date(&self) -> Result<Option<NaiveDate>, StoreError>;
}

/// Corporate split events.
pub trait SplitRegistry: Send + Sync {
    fn read_splits(&self, tickers: &[String]) -> Result<Vec<SplitEvent>, StoreError>;
}

/// Silver aggregate and indicator tables, one pair per timeframe.
pub trait SilverStore: Send + Sync {
    fn write_aggregates(
        &self,
        timeframe: Timeframe,
        bars: &[AggregateBar],
        mode: WriteMode,
    ) -> Result<(), StoreError>;

    fn write_indicators(
        &self,
        timeframe: Timeframe,
        rows: &[IndicatorRow],
        mode: WriteMode,
    ) -> Result<(), StoreError>;

    /// Stored aggregates for `tickers`, sorted by (ticker, date).
    fn read_aggregates(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<AggregateBar>, StoreError>;

    /// Stored indicator rows for `tickers`, sorted by (ticker, date).
    fn read_indicators(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<IndicatorRow>, StoreError>;
}

/// Key-value store for processing checkpoints and split digests.
pub trait CheckpointStore: Send + Sync {
    fn get_checkpoint(&self, table: &str) -> Result<Option<NaiveDate>, StoreError>;

    fn set_checkpoint(&self, table: &str, date: NaiveDate) -> Result<(), StoreError>;

    /// Split digest per ticker as of the last committed run.
    ///
    /// `None` means digests were never written, which is not the same as an
    /// empty map: the latter says no ticker's history is known to match.
    fn get_split_digests(&self) -> Result<Option<BTreeMap<String, String>>, StoreError>;

    fn set_split_digests(&self, digests: &BTreeMap<String, String>) -> Result<(), StoreError>;
}

/// Merge `incoming` rows into `existing` under `mode`, keyed by (ticker, date).
///
/// Shared by store implementations so both agree on write semantics.
pub fn merge_rows<T, K>(existing: Vec<T>, incoming: &[T], mode: WriteMode, key: K) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> (String, NaiveDate),
{
    let mut merged: BTreeMap<(String, NaiveDate), T> = BTreeMap::new();

    let replaced: std::collections::HashSet<String> = match mode {
        WriteMode::Overwrite => incoming.iter().map(|r| key(r).0).collect(),
        WriteMode::Append => Default::default(),
    };

    for row in existing {
        let k = key(&row);
        if !replaced.contains(&k.0) {
            merged.insert(k, row);
        }
    }
    for row in incoming {
        merged.insert(key(row), row.clone());
    }

    merged.into_values().collect()
}
