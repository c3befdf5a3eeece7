//! Split adjustment engine.
//!
//! Each bar accumulates the product of the factors of every split whose
//! execution date is strictly after the bar's date. Prices are divided by
//! that product and volume multiplied by it. The engine always works from
//! `RawBar`s, so running it again with the same splits never double-adjusts.

use crate::domain::{AdjustedBar, RawBar, SplitError, SplitEvent};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Validate `ticker`'s splits and fold them into one factor per execution date.
///
/// Splits for other tickers are ignored. Exact duplicates collapse; two
/// different factors on the same date are a configuration error. Factors of
/// exactly 1 are dropped.
pub fn split_factors(
    ticker: &str,
    splits: &[SplitEvent],
) -> Result<BTreeMap<NaiveDate, f64>, SplitError> {
    let mut factors: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for split in splits.iter().filter(|s| s.ticker == ticker) {
        let factor = split.factor()?;

        if let Some(&existing) = factors.get(&split.execution_date) {
            if existing != factor {
                return Err(SplitError::Conflicting {
                    ticker: ticker.to_string(),
                    execution_date: split.execution_date,
                    first: existing,
                    second: factor,
                });
            }
            continue;
        }
        factors.insert(split.execution_date, factor);
    }

    factors.retain(|date, factor| {
        if *factor == 1.0 {
            tracing::debug!(ticker, %date, "ignoring 1-for-1 split");
            false
        } else {
            true
        }
    });

    Ok(factors)
}

/// Cumulative adjustment for a bar dated `date`.
fn cumulative_factor(factors: &BTreeMap<NaiveDate, f64>, date: NaiveDate) -> f64 {
    factors
        .range((Bound::Excluded(date), Bound::Unbounded))
        .map(|(_, f)| *f)
        .product()
}

/// Apply `ticker`'s splits to its raw bars.
///
/// `bars` must all belong to `ticker`. Output is sorted by date. Adjusted
/// volume and transaction counts are rounded to the nearest whole unit.
pub fn adjust_bars(
    ticker: &str,
    bars: &[RawBar],
    splits: &[SplitEvent],
) -> Result<Vec<AdjustedBar>, SplitError> {
    let factors = split_factors(ticker, splits)?;

    let mut adjusted: Vec<AdjustedBar> = bars
        .iter()
        .map(|bar| {
            let factor = cumulative_factor(&factors, bar.date);
            AdjustedBar {
                ticker: bar.ticker.clone(),
                date: bar.date,
                open: bar.open / factor,
                high: bar.high / factor,
                low: bar.low / factor,
                close: bar.close / factor,
                volume: (bar.volume as f64 * factor).round().max(0.0) as u64,
                transactions: (bar.transactions as f64 * factor).round() as u64,
                factor,
            }
        })
        .collect();

    adjusted.sort_by_key(|b| b.date);
    Ok(adjusted)
}
