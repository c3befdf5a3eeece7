//! In-memory lake implementing every storage trait.
//!
//! Used by the orchestrator's tests and handy for embedding the pipeline
//! where persistence is handled elsewhere.

use super::store::{
    merge_rows, CheckpointStore, RawBarStore, SilverStore, SplitRegistry, StoreError, WriteMode,
};
use crate::domain::{AggregateBar, IndicatorRow, RawBar, SplitEvent, Timeframe};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone)]
struct LakeState {
    raw: BTreeMap<String, Vec<RawBar>>,
    splits: Vec<SplitEvent>,
    aggregates: BTreeMap<Timeframe, Vec<AggregateBar>>,
    indicators: BTreeMap<Timeframe, Vec<IndicatorRow>>,
    checkpoints: BTreeMap<String, NaiveDate>,
    split_digests: Option<BTreeMap<String, String>>,
}

/// Bronze, Silver and checkpoint state behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryLake {
    state: Mutex<LakeState>,
}

impl MemoryLake {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw bars to Bronze. Duplicates are kept, as upstream may send them.
    pub fn insert_raw_bars(&self, bars: impl IntoIterator<Item = RawBar>) {
        let mut state = self.state();
        for bar in bars {
            state.raw.entry(bar.ticker.clone()).or_default().push(bar);
        }
    }

    pub fn add_split(&self, split: SplitEvent) {
        self.state().splits.push(split);
    }

    /// Forget the digest state, as in a lake written before digests existed.
    pub fn clear_split_digests(&self) {
        self.state().split_digests = None;
    }

    /// Replace the whole split registry.
    pub fn set_splits(&self, splits: Vec<SplitEvent>) {
        self.state().splits = splits;
    }

    /// Every stored aggregate of a timeframe, sorted by (ticker, date).
    pub fn aggregates(&self, timeframe: Timeframe) -> Vec<AggregateBar> {
        self.state()
            .aggregates
            .get(&timeframe)
            .cloned()
            .unwrap_or_default()
    }

    /// Every stored indicator row of a timeframe, sorted by (ticker, date).
    pub fn indicators(&self, timeframe: Timeframe) -> Vec<IndicatorRow> {
        self.state()
            .indicators
            .get(&timeframe)
            .cloned()
            .unwrap_or_default()
    }

    pub fn checkpoints(&self) -> BTreeMap<String, NaiveDate> {
        self.state().checkpoints.clone()
    }
}

fn wanted(tickers: &[String]) -> HashSet<&str> {
    tickers.iter().map(String::as_str).collect()
}

impl RawBarStore for MemoryLake {
    fn list_tickers(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state()
            .raw
            .iter()
            .filter(|(_, bars)| !bars.is_empty())
            .map(|(t, _)| t.clone())
            .collect())
    }

    fn read_raw_bars(
        &self,
        tickers: &[String],
        since: Option<NaiveDate>,
    ) -> Result<Vec<RawBar>, StoreError> {
        let state = self.state();
        let mut out: Vec<RawBar> = wanted(tickers)
            .into_iter()
            .filter_map(|t| state.raw.get(t))
            .flatten()
            .filter(|b| since.map_or(true, |s| b.date > s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));
        Ok(out)
    }

    fn get_max_known_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.state().raw.values().flatten().map(|b| b.date).max())
    }
}

impl SplitRegistry for MemoryLake {
    fn read_splits(&self, tickers: &[String]) -> Result<Vec<SplitEvent>, StoreError> {
        let wanted = wanted(tickers);
        Ok(self
            .state()
            .splits
            .iter()
            .filter(|s| wanted.contains(s.ticker.as_str()))
            .cloned()
            .collect())
    }
}

impl SilverStore for MemoryLake {
    fn write_aggregates(
        &self,
        timeframe: Timeframe,
        bars: &[AggregateBar],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let existing = state.aggregates.remove(&timeframe).unwrap_or_default();
        let merged = merge_rows(existing, bars, mode, |b| (b.ticker.clone(), b.period_start));
        state.aggregates.insert(timeframe, merged);
        Ok(())
    }

    fn write_indicators(
        &self,
        timeframe: Timeframe,
        rows: &[IndicatorRow],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let existing = state.indicators.remove(&timeframe).unwrap_or_default();
        let merged = merge_rows(existing, rows, mode, |r| (r.ticker.clone(), r.date));
        state.indicators.insert(timeframe, merged);
        Ok(())
    }

    fn read_aggregates(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<AggregateBar>, StoreError> {
        let wanted = wanted(tickers);
        Ok(self
            .aggregates(timeframe)
            .into_iter()
            .filter(|b| wanted.contains(b.ticker.as_str()))
            .collect())
    }

    fn read_indicators(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<IndicatorRow>, StoreError> {
        let wanted = wanted(tickers);
        Ok(self
            .indicators(timeframe)
            .into_iter()
            .filter(|r| wanted.contains(r.ticker.as_str()))
            .collect())
    }
}

impl CheckpointStore for MemoryLake {
    fn get_checkpoint(&self, table: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.state().checkpoints.get(table).copied())
    }

    fn set_checkpoint(&self, table: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.state().checkpoints.insert(table.to_string(), date);
        Ok(())
    }

    fn get_split_digests(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        Ok(self.state().split_digests.clone())
    }

    fn set_split_digests(&self, digests: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.state().split_digests = Some(digests.clone());
        Ok(())
    }
}
