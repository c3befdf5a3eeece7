//! Aggregation engine: daily bars rolled up into calendar buckets.
//!
//! Open is the first bar's open, close the last bar's close, high/low the
//! bucket extrema, volume and transactions the bucket sums. The in-progress bucket is
//! emitted with whatever bars exist, so callers must rebuild it from the
//! full daily set whenever new bars arrive.

use crate::domain::{AdjustedBar, AggregateBar, Timeframe};

/// One daily aggregate per adjusted bar, sorted by date.
pub fn daily_bars(adjusted: &[AdjustedBar]) -> Vec<AggregateBar> {
    let mut daily: Vec<AggregateBar> = adjusted.iter().map(AdjustedBar::to_daily).collect();
    daily.sort_by_key(|b| b.period_start);
    daily
}

/// Roll one ticker's daily bars up to `timeframe`.
///
/// Input order does not matter; bars are sorted by date first.
pub fn aggregate(daily: &[AggregateBar], timeframe: Timeframe) -> Vec<AggregateBar> {
    let mut sorted: Vec<&AggregateBar> = daily.iter().collect();
    sorted.sort_by_key(|b| b.period_start);

    let mut out: Vec<AggregateBar> = Vec::new();
    for bar in sorted {
        let start = timeframe.period_start(bar.period_start);

        match out.last_mut() {
            Some(bucket) if bucket.period_start == start => {
                bucket.high = bucket.high.max(bar.high);
                bucket.low = bucket.low.min(bar.low);
                bucket.close = bar.close;
                bucket.volume = bucket.volume.saturating_add(bar.volume);
                bucket.transactions = bucket.transactions.saturating_add(bar.transactions);
                bucket.bar_count += bar.bar_count;
            }
            _ => out.push(AggregateBar {
                ticker: bar.ticker.clone(),
                timeframe,
                period_start: start,
                period_end: timeframe.period_end(bar.period_start),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                transactions: bar.transactions,
                bar_count: bar.bar_count,
            }),
        }
    }

    out
}
