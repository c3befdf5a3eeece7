//! Run report: what was processed, what was skipped and why.
//!
//! A run that skipped tickers or could not commit must never look like a
//! clean run, so `outcome()` distinguishes the three cases and `Display`
//! leads with it.

use crate::plan::{RewriteReason, RunMode};
use crate::state::{BatchPhase, RunState};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tickerlake_core::data::DataQualityIssue;
use tickerlake_core::domain::Timeframe;

/// Why a ticker produced no output this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A split in the registry is malformed.
    InvalidSplit { message: String },
    /// Every raw bar failed data-quality screening.
    NoValidBars,
    /// The ticker's batch could not be read or written.
    Persistence { phase: BatchPhase, message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidSplit { message } => write!(f, "invalid split: {message}"),
            SkipReason::NoValidBars => f.write_str("no valid bars"),
            SkipReason::Persistence { phase, message } => {
                write!(f, "persistence failure during {phase}: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub phase: BatchPhase,
    pub batch: usize,
    pub of: usize,
    pub tickers: usize,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Committed; every ticker processed cleanly.
    Success,
    /// Committed, but some tickers or bars were left out.
    PartialSuccess,
    /// Nothing was committed; the next run resumes from the old checkpoint.
    NotCommitted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => f.write_str("SUCCESS"),
            RunOutcome::PartialSuccess => f.write_str("PARTIAL SUCCESS"),
            RunOutcome::NotCommitted => f.write_str("NOT COMMITTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub mode: RunMode,
    pub states: Vec<RunState>,
    pub previous_checkpoint: Option<NaiveDate>,
    pub new_checkpoint: Option<NaiveDate>,
    pub raw_max_date: Option<NaiveDate>,
    pub committed: bool,
    /// Tickers rewritten from raw history, with the reason.
    pub full_rewrite: BTreeMap<String, RewriteReason>,
    /// Tickers that appended new bars.
    pub incremental: Vec<String>,
    /// Incremental tickers with no new raw bars.
    pub unchanged: Vec<String>,
    pub skipped: Vec<SkippedTicker>,
    pub data_quality: Vec<DataQualityIssue>,
    pub batch_failures: Vec<BatchFailure>,
    /// Tickers whose latest row still lacks an indicator, per timeframe.
    pub incomplete_history: BTreeMap<Timeframe, usize>,
    /// Full rewrites an uncommitted run left half done; the next run redoes them.
    #[serde(default)]
    pub pending_rewrite: Vec<String>,
}

impl RunReport {
    pub fn new(mode: RunMode, previous_checkpoint: Option<NaiveDate>) -> Self {
        Self {
            started_at: chrono::Local::now().naive_local(),
            finished_at: None,
            mode,
            states: Vec::new(),
            previous_checkpoint,
            new_checkpoint: previous_checkpoint,
            raw_max_date: None,
            committed: false,
            full_rewrite: BTreeMap::new(),
            incremental: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
            data_quality: Vec::new(),
            batch_failures: Vec::new(),
            incomplete_history: BTreeMap::new(),
            pending_rewrite: Vec::new(),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.full_rewrite.len() + self.incremental.len()
    }

    pub fn skip(&mut self, ticker: impl Into<String>, reason: SkipReason) {
        let ticker = ticker.into();
        tracing::warn!(%ticker, %reason, "skipping ticker");
        self.skipped.push(SkippedTicker { ticker, reason });
    }

    pub fn is_skipped(&self, ticker: &str) -> bool {
        self.skipped.iter().any(|s| s.ticker == ticker)
    }

    pub fn outcome(&self) -> RunOutcome {
        if !self.committed {
            RunOutcome::NotCommitted
        } else if !self.skipped.is_empty() || !self.data_quality.is_empty() {
            RunOutcome::PartialSuccess
        } else {
            RunOutcome::Success
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "none".to_string(), |d| d.to_string())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Silver run {} ({})", self.outcome(), self.mode)?;
        writeln!(
            f,
            "  processed: {} (full rewrite: {}, incremental: {}), unchanged: {}",
            self.processed_count(),
            self.full_rewrite.len(),
            self.incremental.len(),
            self.unchanged.len()
        )?;

        writeln!(f, "  skipped: {}", self.skipped.len())?;
        for s in &self.skipped {
            writeln!(f, "    - {}: {}", s.ticker, s.reason)?;
        }

        writeln!(f, "  data-quality exclusions: {}", self.data_quality.len())?;
        for failure in &self.batch_failures {
            writeln!(
                f,
                "  batch failure: {} {}/{} ({} tickers): {}",
                failure.phase, failure.batch, failure.of, failure.tickers, failure.error
            )?;
        }

        if !self.incomplete_history.is_empty() {
            let parts: Vec<String> = self
                .incomplete_history
                .iter()
                .map(|(tf, n)| format!("{tf}={n}"))
                .collect();
            writeln!(f, "  incomplete history: {}", parts.join(" "))?;
        }

        if !self.pending_rewrite.is_empty() {
            writeln!(f, "  pending full rewrite: {}", self.pending_rewrite.join(", "))?;
        }

        write!(
            f,
            "  checkpoint: {} -> {} ({})",
            fmt_date(self.previous_checkpoint),
            fmt_date(self.new_checkpoint),
            if self.committed { "committed" } else { "not committed" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn uncommitted_run_is_never_success() {
        let report = RunReport::new(RunMode::IncrementalAppend, Some(d(1)));
        assert_eq!(report.outcome(), RunOutcome::NotCommitted);
    }

    #[test]
    fn skips_make_partial_success() {
        let mut report = RunReport::new(RunMode::FullRewrite, None);
        report.committed = true;
        assert_eq!(report.outcome(), RunOutcome::Success);

        report.skip("BAD", SkipReason::NoValidBars);
        assert_eq!(report.outcome(), RunOutcome::PartialSuccess);
        assert!(report.is_skipped("BAD"));
    }

    #[test]
    fn summary_lists_skips_and_checkpoint() {
        let mut report = RunReport::new(RunMode::IncrementalAppend, Some(d(1)));
        report.incremental.push("AAPL".into());
        report.skip(
            "XYZ",
            SkipReason::InvalidSplit {
                message: "ratio 0".into(),
            },
        );
        report.new_checkpoint = Some(d(2));
        report.committed = true;
        report.incomplete_history.insert(Timeframe::Monthly, 3);

        let text = report.to_string();
        assert!(text.starts_with("Silver run PARTIAL SUCCESS (incremental append)"));
        assert!(text.contains("XYZ: invalid split: ratio 0"));
        assert!(text.contains("monthly=3"));
        assert!(text.contains("2024-05-01 -> 2024-05-02 (committed)"));
    }

    #[test]
    fn json_export_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = RunReport::new(RunMode::FullRewrite, None);
        report.full_rewrite.insert("AAPL".into(), RewriteReason::FirstRun);
        report.incomplete_history.insert(Timeframe::Daily, 1);
        report.skip(
            "MSFT",
            SkipReason::Persistence {
                phase: BatchPhase::Indicators,
                message: "disk full".into(),
            },
        );
        report.write_json(&path).unwrap();

        let loaded: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.full_rewrite, report.full_rewrite);
        assert_eq!(loaded.skipped, report.skipped);
        assert_eq!(loaded.incomplete_history, report.incomplete_history);
    }
}
