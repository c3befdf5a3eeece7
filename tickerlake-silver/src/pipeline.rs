//! Silver pipeline: raw Bronze bars in, adjusted aggregates and indicators out.
//!
//! One run walks the state machine in `state.rs`. Split detection decides a
//! route per ticker, phase 1 aggregates in batches, phase 2 computes
//! indicators in batches, and the checkpoint is committed last. A batch
//! failure never advances the checkpoint, so rerunning after a crash simply
//! redoes the uncommitted work.

use crate::batch::batches;
use crate::config::{ConfigError, PipelineConfig};
use crate::plan::{plan_run, DetectionInput, RewriteReason, Route, RunMode, RunPlan};
use crate::report::{BatchFailure, RunReport, SkipReason};
use crate::state::{BatchPhase, RunState, RunStateMachine, TransitionError};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;
use tickerlake_core::aggregate::{aggregate, daily_bars};
use tickerlake_core::data::store::merge_rows;
use tickerlake_core::data::{
    screen_bars, CheckpointStore, DataQualityIssue, RawBarStore, SilverStore, SplitRegistry,
    StoreError, WriteMode,
};
use tickerlake_core::domain::{AggregateBar, IndicatorRow, RawBar, SplitEvent, Timeframe};
use tickerlake_core::fingerprint::split_digests;
use tickerlake_core::indicators::{has_incomplete_history, IndicatorSuite};
use tickerlake_core::splits::adjust_bars;

/// Errors that abort a run before it can produce a report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read raw bars: {0}")]
    RawStore(#[source] StoreError),

    #[error("failed to read split registry: {0}")]
    SplitRegistry(#[source] StoreError),

    #[error("failed to read checkpoint store: {0}")]
    Checkpoint(#[source] StoreError),

    #[error("failed to commit checkpoint: {0}")]
    Commit(#[source] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Orchestrates one Silver run over the four storage collaborators.
pub struct SilverPipeline<'a> {
    raw: &'a dyn RawBarStore,
    splits: &'a dyn SplitRegistry,
    silver: &'a dyn SilverStore,
    checkpoints: &'a dyn CheckpointStore,
    config: PipelineConfig,
    suite: IndicatorSuite,
    force_full: bool,
}

/// Phase 1 output for one batch, applied to the report only on success.
#[derive(Debug, Default)]
struct AggregationBatch {
    full_daily: Vec<AggregateBar>,
    appended_daily: Vec<AggregateBar>,
    weekly: Vec<AggregateBar>,
    monthly: Vec<AggregateBar>,
    full: Vec<String>,
    incremental: Vec<String>,
    unchanged: Vec<String>,
    skipped: Vec<(String, SkipReason)>,
    issues: Vec<DataQualityIssue>,
    max_date: Option<NaiveDate>,
}

impl AggregationBatch {
    /// Record a processed ticker's daily rows and rebuild its rollups.
    fn push(&mut self, history: &[AggregateBar], written: Vec<AggregateBar>, full: bool) {
        let Some(first) = history.first() else {
            return;
        };
        let ticker = first.ticker.clone();

        let last = written.iter().map(AggregateBar::date).max();
        self.max_date = self.max_date.max(last);

        self.weekly.extend(aggregate(history, Timeframe::Weekly));
        self.monthly.extend(aggregate(history, Timeframe::Monthly));
        if full {
            self.full_daily.extend(written);
            self.full.push(ticker);
        } else {
            self.appended_daily.extend(written);
            self.incremental.push(ticker);
        }
    }
}

fn group_by_ticker<T>(rows: Vec<T>, ticker: impl Fn(&T) -> &str) -> BTreeMap<String, Vec<T>> {
    let mut grouped: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for row in rows {
        grouped.entry(ticker(&row).to_string()).or_default().push(row);
    }
    grouped
}

fn daily_key(bar: &AggregateBar) -> (String, NaiveDate) {
    (bar.ticker.clone(), bar.period_start)
}

/// Screen and split-adjust one ticker's raw bars into daily aggregates.
fn adjust_daily(
    ticker: &str,
    raw: Vec<RawBar>,
    splits: &[SplitEvent],
    issues: &mut Vec<DataQualityIssue>,
) -> Result<Vec<AggregateBar>, SkipReason> {
    let screened = screen_bars(raw);
    issues.extend(screened.issues);
    if screened.bars.is_empty() {
        return Err(SkipReason::NoValidBars);
    }
    let adjusted = adjust_bars(ticker, &screened.bars, splits).map_err(|e| {
        SkipReason::InvalidSplit {
            message: e.to_string(),
        }
    })?;
    Ok(daily_bars(&adjusted))
}

impl<'a> SilverPipeline<'a> {
    pub fn new(
        raw: &'a dyn RawBarStore,
        splits: &'a dyn SplitRegistry,
        silver: &'a dyn SilverStore,
        checkpoints: &'a dyn CheckpointStore,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let suite = IndicatorSuite::new(config.indicators);
        Ok(Self {
            raw,
            splits,
            silver,
            checkpoints,
            config,
            suite,
            force_full: false,
        })
    }

    /// Use one value for all four collaborators.
    pub fn from_lake<L>(lake: &'a L, config: PipelineConfig) -> Result<Self, PipelineError>
    where
        L: RawBarStore + SplitRegistry + SilverStore + CheckpointStore,
    {
        Self::new(lake, lake, lake, lake, config)
    }

    /// Rewrite every ticker from raw history regardless of digests.
    pub fn force_full_rewrite(mut self, force: bool) -> Self {
        self.force_full = force;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Per-ticker and per-batch failures end up in the report; only systemic
    /// failures return `Err`.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let mut sm = RunStateMachine::new();
        sm.advance(RunState::DetectSplits)?;

        let available = self.raw.list_tickers().map_err(PipelineError::RawStore)?;
        let tickers = self.config.universe.select(&available);
        let checkpoint = self
            .checkpoints
            .get_checkpoint(&Timeframe::Daily.aggregates_table())
            .map_err(PipelineError::Checkpoint)?;
        let known_digests = self
            .checkpoints
            .get_split_digests()
            .map_err(PipelineError::Checkpoint)?;
        let splits = self
            .splits
            .read_splits(&tickers)
            .map_err(PipelineError::SplitRegistry)?;
        let current_digests = split_digests(&tickers, &splits);
        let raw_max_date = self.raw.get_max_known_date().map_err(PipelineError::RawStore)?;

        let mut plan = plan_run(&DetectionInput {
            tickers: &tickers,
            checkpoint,
            known_digests: known_digests.as_ref(),
            current_digests: &current_digests,
            splits: &splits,
            granularity: self.config.rewrite_granularity,
            force_full: self.force_full,
        });

        tracing::info!(
            tickers = tickers.len(),
            full_rewrite = plan.full_rewrite_count(),
            mode = %plan.mode,
            checkpoint = ?checkpoint,
            raw_max_date = ?raw_max_date,
            "starting silver run"
        );

        let mut report = RunReport::new(plan.mode, checkpoint);
        report.raw_max_date = raw_max_date;
        sm.advance(match plan.mode {
            RunMode::FullRewrite => RunState::FullRewrite,
            RunMode::IncrementalAppend => RunState::IncrementalAppend,
        })?;

        let splits_by_ticker = group_by_ticker(splits, |s| s.ticker.as_str());
        let written_max = self.aggregation_phase(&mut sm, &tickers, &mut plan, &splits_by_ticker, &mut report)?;

        let processed: Vec<String> = tickers
            .iter()
            .filter(|t| report.full_rewrite.contains_key(*t) || report.incremental.contains(*t))
            .cloned()
            .collect();
        self.indicator_phase(&mut sm, &processed, &plan, &mut report)?;

        sm.advance(RunState::FinalizeAggregates)?;
        let new_checkpoint = checkpoint.max(written_max);
        report.new_checkpoint = new_checkpoint;

        if report.batch_failures.is_empty() {
            sm.advance(RunState::CommitCheckpoint)?;
            self.commit(&tickers, known_digests.as_ref(), &current_digests, new_checkpoint, &report)?;
            report.committed = true;
        } else {
            tracing::warn!(
                failures = report.batch_failures.len(),
                "batch failures, checkpoint not advanced"
            );
            report.new_checkpoint = checkpoint;
            report.pending_rewrite = self.invalidate_full_rewrites(&plan, known_digests.as_ref())?;
        }

        sm.advance(RunState::Idle)?;
        report.states = sm.history().to_vec();
        report.finished_at = Some(chrono::Local::now().naive_local());
        tracing::info!(outcome = %report.outcome(), processed = report.processed_count(), "silver run finished");
        Ok(report)
    }

    /// Phase 1. Returns the latest daily date written.
    fn aggregation_phase(
        &self,
        sm: &mut RunStateMachine,
        tickers: &[String],
        plan: &mut RunPlan,
        splits: &BTreeMap<String, Vec<SplitEvent>>,
        report: &mut RunReport,
    ) -> Result<Option<NaiveDate>, PipelineError> {
        let mut written_max = None;

        for batch in batches(tickers, self.config.batch.aggregation_batch_size) {
            sm.advance(RunState::BatchProcess {
                phase: BatchPhase::Aggregation,
                batch: batch.index,
                of: batch.of,
            })?;
            tracing::info!(tickers = batch.tickers.len(), "aggregation batch {}/{}", batch.index, batch.of);

            match self.aggregation_batch(batch.tickers, plan, splits) {
                Ok(out) => {
                    written_max = written_max.max(out.max_date);
                    for ticker in out.full {
                        if let Some(Route::Full(reason)) = plan.route(&ticker) {
                            report.full_rewrite.insert(ticker, reason);
                        }
                    }
                    report.incremental.extend(out.incremental);
                    report.unchanged.extend(out.unchanged);
                    for (ticker, reason) in out.skipped {
                        report.skip(ticker, reason);
                    }
                    report.data_quality.extend(out.issues);
                }
                Err(e) => self.fail_batch(report, BatchPhase::Aggregation, batch.index, batch.of, batch.tickers, &e),
            }
        }

        Ok(written_max)
    }

    fn aggregation_batch(
        &self,
        tickers: &[String],
        plan: &mut RunPlan,
        splits: &BTreeMap<String, Vec<SplitEvent>>,
    ) -> Result<AggregationBatch, StoreError> {
        let mut out = AggregationBatch::default();
        let (mut full, incremental): (Vec<String>, Vec<String>) =
            tickers.iter().cloned().partition(|t| plan.is_full(t));
        let splits_for = |ticker: &str| splits.get(ticker).map(Vec::as_slice).unwrap_or(&[]);

        if let Some(checkpoint) = plan.checkpoint.filter(|_| !incremental.is_empty()) {
            let mut new_raw =
                group_by_ticker(self.raw.read_raw_bars(&incremental, Some(checkpoint))?, |b| b.ticker.as_str());
            let mut existing = group_by_ticker(
                self.silver.read_aggregates(Timeframe::Daily, &incremental)?,
                |b| b.ticker.as_str(),
            );

            for ticker in &incremental {
                let Some(raw) = new_raw.remove(ticker) else {
                    tracing::debug!(%ticker, "no new bars");
                    out.unchanged.push(ticker.clone());
                    continue;
                };
                let Some(history) = existing.remove(ticker) else {
                    tracing::info!(%ticker, "no silver history, rewriting from raw");
                    plan.escalate(ticker, RewriteReason::MissingHistory);
                    full.push(ticker.clone());
                    continue;
                };

                match adjust_daily(ticker, raw, splits_for(ticker), &mut out.issues) {
                    Ok(new_daily) => {
                        let merged = merge_rows(history, &new_daily, WriteMode::Append, daily_key);
                        out.push(&merged, new_daily, false);
                    }
                    // Stored history is still valid; only the new bars were bad.
                    Err(SkipReason::NoValidBars) => out.unchanged.push(ticker.clone()),
                    Err(reason) => out.skipped.push((ticker.clone(), reason)),
                }
            }
        }

        if !full.is_empty() {
            let mut raw = group_by_ticker(self.raw.read_raw_bars(&full, None)?, |b| b.ticker.as_str());
            for ticker in &full {
                let bars = raw.remove(ticker).unwrap_or_default();
                match adjust_daily(ticker, bars, splits_for(ticker), &mut out.issues) {
                    Ok(daily) => out.push(&daily, daily.clone(), true),
                    Err(reason) => out.skipped.push((ticker.clone(), reason)),
                }
            }
        }

        self.write_aggregates(Timeframe::Daily, &out.full_daily, WriteMode::Overwrite)?;
        self.write_aggregates(Timeframe::Daily, &out.appended_daily, WriteMode::Append)?;
        self.write_aggregates(Timeframe::Weekly, &out.weekly, WriteMode::Overwrite)?;
        self.write_aggregates(Timeframe::Monthly, &out.monthly, WriteMode::Overwrite)?;

        Ok(out)
    }

    /// Phase 2, over the tickers phase 1 processed.
    fn indicator_phase(
        &self,
        sm: &mut RunStateMachine,
        tickers: &[String],
        plan: &RunPlan,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        for batch in batches(tickers, self.config.batch.indicator_batch_size) {
            sm.advance(RunState::BatchProcess {
                phase: BatchPhase::Indicators,
                batch: batch.index,
                of: batch.of,
            })?;
            tracing::info!(tickers = batch.tickers.len(), "indicator batch {}/{}", batch.index, batch.of);

            match self.indicator_batch(batch.tickers, plan) {
                Ok(incomplete) => {
                    for (timeframe, count) in incomplete {
                        *report.incomplete_history.entry(timeframe).or_default() += count;
                    }
                }
                Err(e) => self.fail_batch(report, BatchPhase::Indicators, batch.index, batch.of, batch.tickers, &e),
            }
        }
        Ok(())
    }

    /// Returns, per timeframe, how many tickers end on an incomplete row.
    fn indicator_batch(
        &self,
        tickers: &[String],
        plan: &RunPlan,
    ) -> Result<BTreeMap<Timeframe, usize>, StoreError> {
        let mut incomplete = BTreeMap::new();

        for timeframe in Timeframe::ALL {
            let bars = group_by_ticker(self.silver.read_aggregates(timeframe, tickers)?, |b| {
                b.ticker.as_str()
            });

            let mut overwrite: Vec<IndicatorRow> = Vec::new();
            let mut append: Vec<IndicatorRow> = Vec::new();
            for (ticker, series) in &bars {
                let rows = self.suite.compute(series);
                if has_incomplete_history(&rows) {
                    tracing::debug!(%ticker, %timeframe, "incomplete indicator history");
                    *incomplete.entry(timeframe).or_default() += 1;
                }

                match plan.checkpoint {
                    Some(cp) if timeframe == Timeframe::Daily && !plan.is_full(ticker) => {
                        append.extend(rows.into_iter().filter(|r| r.date > cp));
                    }
                    _ => overwrite.extend(rows),
                }
            }

            if !overwrite.is_empty() {
                self.silver.write_indicators(timeframe, &overwrite, WriteMode::Overwrite)?;
            }
            if !append.is_empty() {
                self.silver.write_indicators(timeframe, &append, WriteMode::Append)?;
            }
        }

        Ok(incomplete)
    }

    fn write_aggregates(
        &self,
        timeframe: Timeframe,
        bars: &[AggregateBar],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        if bars.is_empty() {
            return Ok(());
        }
        self.silver.write_aggregates(timeframe, bars, mode)
    }

    fn fail_batch(
        &self,
        report: &mut RunReport,
        phase: BatchPhase,
        batch: usize,
        of: usize,
        tickers: &[String],
        error: &StoreError,
    ) {
        tracing::error!(%phase, batch, of, %error, "batch failed");
        report.batch_failures.push(BatchFailure {
            phase,
            batch,
            of,
            tickers: tickers.len(),
            error: error.to_string(),
        });

        for ticker in tickers {
            report.full_rewrite.remove(ticker);
            report.incremental.retain(|t| t != ticker);
            report.unchanged.retain(|t| t != ticker);
            report.skip(
                ticker.clone(),
                SkipReason::Persistence {
                    phase,
                    message: error.to_string(),
                },
            );
        }
    }

    /// Forget the digests of every ticker an uncommitted run routed to a full rewrite.
    ///
    /// Their Silver rows may be half rewritten, and reasons such as
    /// `MissingHistory` or `Forced` do not recur by themselves. A ticker
    /// without a digest is new to the next run, which rewrites it again.
    fn invalidate_full_rewrites(
        &self,
        plan: &RunPlan,
        known: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>, PipelineError> {
        if plan.checkpoint.is_none() {
            return Ok(Vec::new());
        }
        let pending: Vec<String> = plan
            .routes
            .iter()
            .filter(|(_, route)| matches!(route, Route::Full(_)))
            .map(|(ticker, _)| ticker.clone())
            .collect();
        if pending.is_empty() {
            return Ok(pending);
        }

        let mut digests = known.cloned().unwrap_or_default();
        for ticker in &pending {
            digests.remove(ticker);
        }
        if known == Some(&digests) {
            return Ok(pending);
        }
        self.checkpoints
            .set_split_digests(&digests)
            .map_err(PipelineError::Commit)?;
        tracing::warn!(tickers = pending.len(), "full rewrites left pending for the next run");
        Ok(pending)
    }

    /// Digests first, checkpoints last.
    fn commit(
        &self,
        tickers: &[String],
        known: Option<&BTreeMap<String, String>>,
        current: &BTreeMap<String, String>,
        checkpoint: Option<NaiveDate>,
        report: &RunReport,
    ) -> Result<(), PipelineError> {
        let mut digests = known.cloned().unwrap_or_default();
        for ticker in tickers {
            if report.is_skipped(ticker) {
                digests.remove(ticker);
            } else if let Some(digest) = current.get(ticker) {
                digests.insert(ticker.clone(), digest.clone());
            }
        }
        self.checkpoints
            .set_split_digests(&digests)
            .map_err(PipelineError::Commit)?;

        let Some(date) = checkpoint else {
            return Ok(());
        };
        for timeframe in Timeframe::ALL {
            for table in [timeframe.aggregates_table(), timeframe.indicators_table()] {
                self.checkpoints
                    .set_checkpoint(&table, date)
                    .map_err(PipelineError::Commit)?;
            }
        }
        tracing::info!(checkpoint = %date, digests = digests.len(), "checkpoint committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickerlake_core::data::MemoryLake;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn raw(ticker: &str, date: NaiveDate, close: f64, volume: i64) -> RawBar {
        RawBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            transactions: 0,
        }
    }

    #[test]
    fn first_run_is_full_rewrite_and_commits() {
        let lake = MemoryLake::new();
        lake.insert_raw_bars([raw("AAPL", d(1, 2), 100.0, 1000), raw("AAPL", d(1, 3), 101.0, 1000)]);

        let report = SilverPipeline::from_lake(&lake, PipelineConfig::default())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.mode, RunMode::FullRewrite);
        assert!(report.committed);
        assert_eq!(report.full_rewrite.get("AAPL"), Some(&RewriteReason::FirstRun));
        assert_eq!(report.new_checkpoint, Some(d(1, 3)));
        assert_eq!(lake.checkpoints().len(), 6);
        assert_eq!(report.states.first(), Some(&RunState::Idle));
        assert_eq!(report.states.last(), Some(&RunState::Idle));
    }

    #[test]
    fn ticker_with_only_bad_bars_is_skipped() {
        let lake = MemoryLake::new();
        lake.insert_raw_bars([raw("GOOD", d(1, 2), 10.0, 100), raw("BAD", d(1, 2), -5.0, 100)]);

        let report = SilverPipeline::from_lake(&lake, PipelineConfig::default())
            .unwrap()
            .run()
            .unwrap();

        assert!(report.is_skipped("BAD"));
        assert!(report.full_rewrite.contains_key("GOOD"));
        assert_eq!(report.data_quality.len(), 1);
        assert_eq!(report.outcome(), crate::report::RunOutcome::PartialSuccess);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let lake = MemoryLake::new();
        let config = PipelineConfig::default().with_batch_sizes(Some(0), None);
        let err = SilverPipeline::from_lake(&lake, config).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn empty_lake_commits_nothing() {
        let lake = MemoryLake::new();
        let report = SilverPipeline::from_lake(&lake, PipelineConfig::default())
            .unwrap()
            .run()
            .unwrap();
        assert!(report.committed);
        assert_eq!(report.new_checkpoint, None);
        assert!(lake.checkpoints().is_empty());
    }

    #[test]
    fn group_by_ticker_preserves_row_order() {
        let rows = vec![raw("B", d(1, 2), 1.0, 1), raw("A", d(1, 3), 1.0, 1), raw("B", d(1, 1), 1.0, 1)];
        let grouped = group_by_ticker(rows, |r| r.ticker.as_str());
        assert_eq!(grouped.keys().cloned().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(grouped["B"][0].date, d(1, 2));
    }
}
