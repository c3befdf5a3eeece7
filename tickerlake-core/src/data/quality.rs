//! Data-quality screening of raw bars.
//!
//! Bars with impossible values are excluded from the run and reported.
//! Nothing is repaired: a bad print stays out until Bronze is fixed.

use crate::domain::RawBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Which rule a bar violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRule {
    NonFinitePrice,
    NonPositivePrice,
    NegativeVolume,
    HighBelowLow,
    OpenOutsideRange,
    CloseOutsideRange,
    DuplicateDate,
}

impl fmt::Display for QualityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityRule::NonFinitePrice => "non-finite price",
            QualityRule::NonPositivePrice => "non-positive price",
            QualityRule::NegativeVolume => "negative volume",
            QualityRule::HighBelowLow => "high below low",
            QualityRule::OpenOutsideRange => "open outside high/low range",
            QualityRule::CloseOutsideRange => "close outside high/low range",
            QualityRule::DuplicateDate => "duplicate date",
        };
        f.write_str(s)
    }
}

/// One excluded bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("data quality: {ticker} {date}: {rule}")]
pub struct DataQualityIssue {
    pub ticker: String,
    pub date: NaiveDate,
    pub rule: QualityRule,
}

/// Bars that passed screening plus the issues for those that did not.
#[derive(Debug, Clone, Default)]
pub struct Screened {
    pub bars: Vec<RawBar>,
    pub issues: Vec<DataQualityIssue>,
}

/// First rule a single bar violates, if any.
pub fn check_bar(bar: &RawBar) -> Option<QualityRule> {
    if bar.has_non_finite_price() {
        return Some(QualityRule::NonFinitePrice);
    }
    if bar.open <= 0.0 || bar.high <= 0.0 || bar.low <= 0.0 || bar.close <= 0.0 {
        return Some(QualityRule::NonPositivePrice);
    }
    if bar.volume < 0 {
        return Some(QualityRule::NegativeVolume);
    }
    if bar.high < bar.low {
        return Some(QualityRule::HighBelowLow);
    }
    if bar.open < bar.low || bar.open > bar.high {
        return Some(QualityRule::OpenOutsideRange);
    }
    if bar.close < bar.low || bar.close > bar.high {
        return Some(QualityRule::CloseOutsideRange);
    }
    None
}

/// Sort by (ticker, date), drop bad bars, and keep the first valid bar per key.
///
/// Sorting is stable, so "first" means first in the order supplied. A bad bar
/// never claims its date, so a valid duplicate behind it still gets through.
pub fn screen_bars(mut bars: Vec<RawBar>) -> Screened {
    bars.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

    let mut seen: HashSet<(String, NaiveDate)> = HashSet::with_capacity(bars.len());
    let mut out = Screened::default();

    for bar in bars {
        let rule = check_bar(&bar).or_else(|| {
            (!seen.insert((bar.ticker.clone(), bar.date))).then_some(QualityRule::DuplicateDate)
        });

        match rule {
            None => out.bars.push(bar),
            Some(rule) => {
                tracing::warn!(ticker = %bar.ticker, date = %bar.date, %rule, "excluding bar");
                out.issues.push(DataQualityIssue {
                    ticker: bar.ticker,
                    date: bar.date,
                    rule,
                });
            }
        }
    }

    out
}
