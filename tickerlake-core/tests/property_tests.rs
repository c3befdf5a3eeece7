//! Property tests for the Silver engines.
//!
//! 1. Split adjustment is deterministic and independent of input order
//! 2. A 1-for-1 split changes nothing
//! 3. Aggregation is independent of input order and conserves volume
//! 4. SMA values never depend on later bars

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use tickerlake_core::aggregate::{aggregate, daily_bars};
use tickerlake_core::domain::{AggregateBar, RawBar, SplitEvent, Timeframe};
use tickerlake_core::indicators::{Indicator, Sma};
use tickerlake_core::splits::adjust_bars;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap()
}

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0), 1..150)
}

fn arb_ratio() -> impl Strategy<Value = (f64, f64)> {
    prop_oneof![Just((1.0, 2.0)), Just((1.0, 4.0)), Just((1.0, 10.0)), Just((3.0, 2.0)), Just((10.0, 1.0))]
}

fn arb_splits() -> impl Strategy<Value = Vec<SplitEvent>> {
    prop::collection::btree_map(0i64..200, arb_ratio(), 0..4).prop_map(|m| {
        m.into_iter()
            .map(|(offset, (from, to))| SplitEvent::new("PROP", base_date() + Duration::days(offset), from, to))
            .collect()
    })
}

fn raw_bars(closes: &[f64]) -> Vec<RawBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| RawBar {
            ticker: "PROP".into(),
            date: base_date() + Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000 + (i as i64 * 17) % 900,
            transactions: 40 + (i as u64 * 7) % 60,
        })
        .collect()
}

fn daily(closes: &[f64]) -> Vec<AggregateBar> {
    let adjusted = adjust_bars("PROP", &raw_bars(closes), &[]).unwrap();
    daily_bars(&adjusted)
}

// ── 1-2. Split adjustment ───────────────────────────────────────────

proptest! {
    /// Input order of bars and splits does not change the adjusted series.
    #[test]
    fn adjustment_is_order_independent(closes in arb_closes(), splits in arb_splits()) {
        let bars = raw_bars(&closes);
        let forward = adjust_bars("PROP", &bars, &splits).unwrap();

        let mut reversed_bars = bars.clone();
        reversed_bars.reverse();
        let mut reversed_splits = splits.clone();
        reversed_splits.reverse();
        let backward = adjust_bars("PROP", &reversed_bars, &reversed_splits).unwrap();

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(adjust_bars("PROP", &bars, &splits).unwrap(), forward);
    }

    /// Dollar volume survives adjustment up to share rounding.
    #[test]
    fn adjustment_preserves_dollar_volume(closes in arb_closes(), splits in arb_splits()) {
        let bars = raw_bars(&closes);
        let adjusted = adjust_bars("PROP", &bars, &splits).unwrap();

        for (raw, adj) in bars.iter().zip(&adjusted) {
            prop_assert_eq!(raw.date, adj.date);
            let before = raw.close * raw.volume as f64;
            let after = adj.close * adj.volume as f64;
            // Rounding volume moves dollar volume by at most half an adjusted share
            prop_assert!((before - after).abs() <= adj.close * 0.5 + 1e-6 * before);
        }
    }

    /// A split whose ratio is exactly one is ignored.
    #[test]
    fn one_for_one_split_is_noop(closes in arb_closes(), offset in 0i64..200) {
        let bars = raw_bars(&closes);
        let noop = vec![SplitEvent::new("PROP", base_date() + Duration::days(offset), 5.0, 5.0)];
        prop_assert_eq!(
            adjust_bars("PROP", &bars, &noop).unwrap(),
            adjust_bars("PROP", &bars, &[]).unwrap()
        );
    }
}

// ── 3. Aggregation ───────────────────────────────────────────────────

proptest! {
    /// Shuffled daily input yields the same buckets.
    #[test]
    fn aggregation_is_order_independent(closes in arb_closes(), rotate in 0usize..150) {
        let bars = daily(&closes);
        let mut shuffled = bars.clone();
        shuffled.rotate_left(rotate % bars.len());
        shuffled.reverse();

        for timeframe in [Timeframe::Weekly, Timeframe::Monthly] {
            prop_assert_eq!(aggregate(&shuffled, timeframe), aggregate(&bars, timeframe));
        }
    }

    /// Buckets conserve volume and bar count and bound every member bar.
    #[test]
    fn aggregation_conserves_totals(closes in arb_closes()) {
        let bars = daily(&closes);
        let total_volume: u64 = bars.iter().map(|b| b.volume).sum();

        for timeframe in [Timeframe::Weekly, Timeframe::Monthly] {
            let buckets = aggregate(&bars, timeframe);
            prop_assert_eq!(buckets.iter().map(|b| b.volume).sum::<u64>(), total_volume);
            prop_assert_eq!(buckets.iter().map(|b| b.bar_count as usize).sum::<usize>(), bars.len());

            for bar in &bars {
                let bucket = buckets
                    .iter()
                    .find(|b| b.period_start <= bar.period_start && bar.period_start <= b.period_end)
                    .unwrap();
                prop_assert!(bucket.high >= bar.high);
                prop_assert!(bucket.low <= bar.low);
            }
        }
    }
}

// ── 4. SMA no-lookahead ──────────────────────────────────────────────

proptest! {
    /// Appending bars never changes earlier SMA values.
    #[test]
    fn sma_prefix_is_stable(closes in arb_closes(), cut in 0usize..150, period in 1usize..40) {
        let bars = daily(&closes);
        let cut = cut % bars.len() + 1;
        let sma = Sma::new(period);

        let full = sma.compute(&bars);
        let prefix = sma.compute(&bars[..cut]);
        prop_assert_eq!(&full[..cut], prefix.as_slice());
    }
}
