//! Fixed-size ticker batches.

/// One batch: 1-based index, total batch count, and its tickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    pub index: usize,
    pub of: usize,
    pub tickers: &'a [String],
}

/// Split `tickers` into consecutive batches of at most `size`.
///
/// A `size` of zero is treated as one; configuration validation rejects it
/// before a run starts.
pub fn batches(tickers: &[String], size: usize) -> impl Iterator<Item = Batch<'_>> {
    let size = size.max(1);
    let of = tickers.len().div_ceil(size);
    tickers
        .chunks(size)
        .enumerate()
        .map(move |(i, chunk)| Batch {
            index: i + 1,
            of,
            tickers: chunk,
        })
}
