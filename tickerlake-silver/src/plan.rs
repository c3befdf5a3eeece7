//! Split detection: deciding which tickers need a full rewrite.
//!
//! `plan_run` is a pure function of the stored checkpoint, the stored and
//! current split digests and the configured granularity, so every routing
//! decision can be tested without touching storage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tickerlake_core::domain::SplitEvent;

/// How far a detected split change spreads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteGranularity {
    /// Only the affected tickers are rewritten.
    #[default]
    Ticker,
    /// Any affected ticker rewrites the whole universe.
    Run,
}

/// Why a ticker is fully rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteReason {
    /// No checkpoint exists yet.
    FirstRun,
    /// Requested by the caller.
    Forced,
    /// Not part of the last committed run (or skipped in it).
    NewTicker,
    /// The ticker's split set differs from the last committed run.
    SplitsChanged,
    /// Digests were never stored; a split executes after the checkpoint.
    SplitAfterCheckpoint,
    /// Another ticker needed a rewrite and granularity is `run`.
    RunGranularity,
    /// Silver holds no history for a ticker that should have it.
    MissingHistory,
}

impl fmt::Display for RewriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RewriteReason::FirstRun => "first run",
            RewriteReason::Forced => "forced",
            RewriteReason::NewTicker => "new ticker",
            RewriteReason::SplitsChanged => "splits changed",
            RewriteReason::SplitAfterCheckpoint => "split after checkpoint",
            RewriteReason::RunGranularity => "run-level rewrite",
            RewriteReason::MissingHistory => "missing silver history",
        };
        f.write_str(s)
    }
}

/// Run-level processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every ticker is rewritten from raw history.
    FullRewrite,
    /// Tickers append new bars; individual tickers may still be rewritten.
    IncrementalAppend,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::FullRewrite => f.write_str("full rewrite"),
            RunMode::IncrementalAppend => f.write_str("incremental append"),
        }
    }
}

/// Per-ticker route through the batch phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", content = "reason", rename_all = "snake_case")]
pub enum Route {
    Full(RewriteReason),
    Incremental,
}

/// Everything split detection looks at.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub tickers: &'a [String],
    pub checkpoint: Option<NaiveDate>,
    /// `None` when no run ever stored digests.
    pub known_digests: Option<&'a BTreeMap<String, String>>,
    pub current_digests: &'a BTreeMap<String, String>,
    pub splits: &'a [SplitEvent],
    pub granularity: RewriteGranularity,
    pub force_full: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub mode: RunMode,
    pub checkpoint: Option<NaiveDate>,
    pub routes: BTreeMap<String, Route>,
}

impl RunPlan {
    pub fn route(&self, ticker: &str) -> Option<Route> {
        self.routes.get(ticker).copied()
    }

    pub fn is_full(&self, ticker: &str) -> bool {
        matches!(self.route(ticker), Some(Route::Full(_)))
    }

    /// All tickers, sorted.
    pub fn tickers(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn full_rewrite_count(&self) -> usize {
        self.routes
            .values()
            .filter(|r| matches!(r, Route::Full(_)))
            .count()
    }

    /// Reroute one ticker to a full rewrite.
    pub fn escalate(&mut self, ticker: &str, reason: RewriteReason) {
        if let Some(route) = self.routes.get_mut(ticker) {
            *route = Route::Full(reason);
        }
    }
}

fn ticker_reason(input: &DetectionInput<'_>, ticker: &str, checkpoint: NaiveDate) -> Option<RewriteReason> {
    let Some(known_digests) = input.known_digests else {
        let late_split = input
            .splits
            .iter()
            .any(|s| s.ticker == ticker && s.execution_date > checkpoint);
        return late_split.then_some(RewriteReason::SplitAfterCheckpoint);
    };

    match known_digests.get(ticker) {
        None => Some(RewriteReason::NewTicker),
        Some(known) if input.current_digests.get(ticker) != Some(known) => {
            Some(RewriteReason::SplitsChanged)
        }
        Some(_) => None,
    }
}

/// Route every ticker to a full rewrite or an incremental append.
pub fn plan_run(input: &DetectionInput<'_>) -> RunPlan {
    let mut routes: BTreeMap<String, Route> = BTreeMap::new();

    for ticker in input.tickers {
        let reason = match input.checkpoint {
            None => Some(RewriteReason::FirstRun),
            Some(_) if input.force_full => Some(RewriteReason::Forced),
            Some(cp) => ticker_reason(input, ticker, cp),
        };
        let route = reason.map_or(Route::Incremental, Route::Full);
        routes.insert(ticker.clone(), route);
    }

    let any_full = routes.values().any(|r| matches!(r, Route::Full(_)));
    if any_full && input.granularity == RewriteGranularity::Run {
        for route in routes.values_mut() {
            if *route == Route::Incremental {
                *route = Route::Full(RewriteReason::RunGranularity);
            }
        }
    }

    let all_full = routes.values().all(|r| matches!(r, Route::Full(_)));
    let mode = if all_full && !routes.is_empty() {
        RunMode::FullRewrite
    } else {
        RunMode::IncrementalAppend
    };

    RunPlan {
        mode,
        checkpoint: input.checkpoint,
        routes,
    }
}
