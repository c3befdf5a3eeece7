//! Split-set fingerprinting.
//!
//! The orchestrator stores one digest per ticker after every committed run.
//! A changed digest means the registry gained, lost or edited a split for
//! that ticker, so its stored history is stale.

use crate::domain::SplitEvent;
use std::collections::BTreeMap;

/// Canonical blake3 digest of one ticker's split set.
///
/// Insensitive to input order and exact duplicates. A ticker with no splits
/// still gets a digest (of the empty set).
pub fn split_digest(splits: &[SplitEvent]) -> String {
    let mut canonical: Vec<(String, u64, u64)> = splits
        .iter()
        .map(|s| {
            (
                s.execution_date.format("%Y-%m-%d").to_string(),
                s.split_from.to_bits(),
                s.split_to.to_bits(),
            )
        })
        .collect();
    canonical.sort();
    canonical.dedup();

    let mut hasher = blake3::Hasher::new();
    for (date, from, to) in &canonical {
        hasher.update(date.as_bytes());
        hasher.update(&from.to_le_bytes());
        hasher.update(&to.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Digest every ticker in `tickers`, grouping `splits` by ticker.
pub fn split_digests(tickers: &[String], splits: &[SplitEvent]) -> BTreeMap<String, String> {
    let mut grouped: BTreeMap<&str, Vec<SplitEvent>> = BTreeMap::new();
    for split in splits {
        grouped.entry(split.ticker.as_str()).or_default().push(split.clone());
    }

    tickers
        .iter()
        .map(|t| {
            let set = grouped.get(t.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            (t.clone(), split_digest(set))
        })
        .collect()
}
