//! Parquet lake with Hive-style partitioning.
//!
//! Layout under `root`:
//! - `bronze/stocks/ticker={T}/{year}.parquet` raw daily bars, plus `meta.json`
//! - `bronze/splits.parquet` the split registry
//! - `silver/{table}/ticker={T}/data.parquet` one file per ticker per table
//! - `checkpoints.json`
//!
//! Every Parquet write goes to `.tmp` and is renamed into place, so a crash
//! never leaves a half-written partition behind.

use super::checkpoint::JsonCheckpointStore;
use super::store::{
    merge_rows, CheckpointStore, RawBarStore, SilverStore, SplitRegistry, StoreError, WriteMode,
};
use crate::domain::{AggregateBar, IndicatorRow, RawBar, SplitEvent, Timeframe};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata sidecar for one ticker's Bronze partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BronzeMeta {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub updated_at: NaiveDateTime,
}

pub struct ParquetLake {
    root: PathBuf,
    checkpoints: JsonCheckpointStore,
}

impl ParquetLake {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let checkpoints = JsonCheckpointStore::new(root.join("checkpoints.json"));
        Self { root, checkpoints }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bronze_dir(&self) -> PathBuf {
        self.root.join("bronze").join("stocks")
    }

    fn ticker_dir(&self, ticker: &str) -> PathBuf {
        self.bronze_dir().join(format!("ticker={ticker}"))
    }

    fn year_path(&self, ticker: &str, year: i32) -> PathBuf {
        self.ticker_dir(ticker).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, ticker: &str) -> PathBuf {
        self.ticker_dir(ticker).join("meta.json")
    }

    fn splits_path(&self) -> PathBuf {
        self.root.join("bronze").join("splits.parquet")
    }

    fn silver_path(&self, table: &str, ticker: &str) -> PathBuf {
        self.root
            .join("silver")
            .join(table)
            .join(format!("ticker={ticker}"))
            .join("data.parquet")
    }

    fn ensure_root(&self) -> Result<(), StoreError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unreachable(format!(
                "lake root {} does not exist",
                self.root.display()
            )))
        }
    }

    // ── Bronze ───────────────────────────────────────────────────────

    /// Merge `bars` into Bronze, grouping by ticker and year.
    ///
    /// A bar replaces any stored bar with the same (ticker, date); untouched
    /// years are left alone.
    pub fn write_raw_bars(&self, bars: &[RawBar]) -> Result<(), StoreError> {
        let mut by_partition: BTreeMap<(&str, i32), Vec<RawBar>> = BTreeMap::new();
        for bar in bars {
            by_partition
                .entry((bar.ticker.as_str(), bar.date.year()))
                .or_default()
                .push(bar.clone());
        }

        let mut touched: Vec<&str> = Vec::new();
        for ((ticker, year), incoming) in &by_partition {
            let path = self.year_path(ticker, *year);
            let existing = if path.exists() {
                read_raw_file(&path, ticker)?
            } else {
                Vec::new()
            };
            let merged = merge_rows(existing, incoming, WriteMode::Append, |b| {
                (b.ticker.clone(), b.date)
            });
            write_atomic(&mut raw_to_dataframe(&merged)?, &path)?;
            if touched.last() != Some(ticker) {
                touched.push(*ticker);
            }
        }

        for ticker in touched {
            self.refresh_meta(ticker)?;
        }
        Ok(())
    }

    fn refresh_meta(&self, ticker: &str) -> Result<(), StoreError> {
        let bars = self.load_ticker(ticker, None)?;
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Ok(());
        };

        let payload = serde_json::to_vec(&bars)
            .map_err(|e| StoreError::Serialization(format!("hash serialization: {e}")))?;
        let meta = BronzeMeta {
            ticker: ticker.to_string(),
            start_date: first.date,
            end_date: last.date,
            bar_count: bars.len(),
            data_hash: blake3::hash(&payload).to_hex().to_string(),
            updated_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Serialization(format!("meta serialization: {e}")))?;
        let path = self.meta_path(ticker);
        fs::write(&path, json).map_err(io_err(&path))
    }

    /// Sidecar metadata for a ticker, if present and readable.
    pub fn get_meta(&self, ticker: &str) -> Option<BronzeMeta> {
        let content = fs::read_to_string(self.meta_path(ticker)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Bars for one ticker, sorted by date, skipping year files that end
    /// before `since`.
    fn load_ticker(&self, ticker: &str, since: Option<NaiveDate>) -> Result<Vec<RawBar>, StoreError> {
        let dir = self.ticker_dir(ticker);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut bars = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let year: Option<i32> = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok());
            if let (Some(year), Some(since)) = (year, since) {
                if year < since.year() {
                    continue;
                }
            }
            bars.extend(
                read_raw_file(&path, ticker)?
                    .into_iter()
                    .filter(|b| since.map_or(true, |s| b.date > s)),
            );
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    /// Replace the split registry.
    pub fn write_splits(&self, splits: &[SplitEvent]) -> Result<(), StoreError> {
        let days: Vec<i32> = splits.iter().map(|s| to_days(s.execution_date)).collect();
        let mut df = DataFrame::new(vec![
            Column::new(
                "ticker".into(),
                splits.iter().map(|s| s.ticker.clone()).collect::<Vec<String>>(),
            ),
            date_column("execution_date", days)?,
            Column::new(
                "split_from".into(),
                splits.iter().map(|s| s.split_from).collect::<Vec<f64>>(),
            ),
            Column::new(
                "split_to".into(),
                splits.iter().map(|s| s.split_to).collect::<Vec<f64>>(),
            ),
        ])
        .map_err(parquet_err("splits dataframe"))?;
        write_atomic(&mut df, &self.splits_path())
    }

    // ── Silver helpers ───────────────────────────────────────────────

    fn write_silver<T: Clone>(
        &self,
        table: &str,
        rows: &[T],
        mode: WriteMode,
        key: impl Fn(&T) -> (String, NaiveDate) + Copy,
        read: impl Fn(&Path, &str) -> Result<Vec<T>, StoreError>,
        to_df: impl Fn(&[T]) -> Result<DataFrame, StoreError>,
    ) -> Result<(), StoreError> {
        let mut by_ticker: BTreeMap<String, Vec<T>> = BTreeMap::new();
        for row in rows {
            by_ticker.entry(key(row).0).or_default().push(row.clone());
        }

        for (ticker, incoming) in by_ticker {
            let path = self.silver_path(table, &ticker);
            let existing = match mode {
                WriteMode::Append if path.exists() => read(&path, &ticker)?,
                _ => Vec::new(),
            };
            let merged = merge_rows(existing, &incoming, mode, key);
            write_atomic(&mut to_df(&merged)?, &path).map_err(|e| StoreError::WriteFailed {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn read_silver<T>(
        &self,
        table: &str,
        tickers: &[String],
        read: impl Fn(&Path, &str) -> Result<Vec<T>, StoreError>,
    ) -> Result<Vec<T>, StoreError> {
        let mut sorted: Vec<&String> = tickers.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut out = Vec::new();
        for ticker in sorted {
            let path = self.silver_path(table, ticker);
            if path.exists() {
                out.extend(read(&path, ticker)?);
            }
        }
        Ok(out)
    }
}

impl RawBarStore for ParquetLake {
    fn list_tickers(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_root()?;
        let dir = self.bronze_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut tickers = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(ticker) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("ticker="))
            {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    fn read_raw_bars(
        &self,
        tickers: &[String],
        since: Option<NaiveDate>,
    ) -> Result<Vec<RawBar>, StoreError> {
        self.ensure_root()?;
        let mut sorted: Vec<&String> = tickers.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut out = Vec::new();
        for ticker in sorted {
            out.extend(self.load_ticker(ticker, since)?);
        }
        Ok(out)
    }

    fn get_max_known_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let mut max = None;
        for ticker in self.list_tickers()? {
            let end = match self.get_meta(&ticker) {
                Some(meta) => Some(meta.end_date),
                None => self.load_ticker(&ticker, None)?.last().map(|b| b.date),
            };
            max = max.max(end);
        }
        Ok(max)
    }
}

impl SplitRegistry for ParquetLake {
    fn read_splits(&self, tickers: &[String]) -> Result<Vec<SplitEvent>, StoreError> {
        self.ensure_root()?;
        let path = self.splits_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let df = read_parquet(&path)?;
        let names = read_strings(&df, "ticker")?;
        let dates = read_dates(&df, "execution_date")?;
        let from = required(read_f64(&df, "split_from")?, "split_from")?;
        let to = required(read_f64(&df, "split_to")?, "split_to")?;

        let wanted: std::collections::HashSet<&str> = tickers.iter().map(String::as_str).collect();
        Ok(names
            .into_iter()
            .zip(dates)
            .zip(from.into_iter().zip(to))
            .filter(|((ticker, _), _)| wanted.contains(ticker.as_str()))
            .map(|((ticker, execution_date), (split_from, split_to))| SplitEvent {
                ticker,
                execution_date,
                split_from,
                split_to,
            })
            .collect())
    }
}

impl SilverStore for ParquetLake {
    fn write_aggregates(
        &self,
        timeframe: Timeframe,
        bars: &[AggregateBar],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        self.ensure_root()?;
        self.write_silver(
            &timeframe.aggregates_table(),
            bars,
            mode,
            |b: &AggregateBar| (b.ticker.clone(), b.period_start),
            |path: &Path, ticker: &str| read_aggregate_file(path, ticker, timeframe),
            aggregates_to_dataframe,
        )
    }

    fn write_indicators(
        &self,
        timeframe: Timeframe,
        rows: &[IndicatorRow],
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        self.ensure_root()?;
        self.write_silver(
            &timeframe.indicators_table(),
            rows,
            mode,
            |r: &IndicatorRow| (r.ticker.clone(), r.date),
            |path: &Path, ticker: &str| read_indicator_file(path, ticker, timeframe),
            indicators_to_dataframe,
        )
    }

    fn read_aggregates(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<AggregateBar>, StoreError> {
        self.ensure_root()?;
        self.read_silver(&timeframe.aggregates_table(), tickers, |path, ticker| {
            read_aggregate_file(path, ticker, timeframe)
        })
    }

    fn read_indicators(
        &self,
        timeframe: Timeframe,
        tickers: &[String],
    ) -> Result<Vec<IndicatorRow>, StoreError> {
        self.ensure_root()?;
        self.read_silver(&timeframe.indicators_table(), tickers, |path, ticker| {
            read_indicator_file(path, ticker, timeframe)
        })
    }
}

impl CheckpointStore for ParquetLake {
    fn get_checkpoint(&self, table: &str) -> Result<Option<NaiveDate>, StoreError> {
        self.checkpoints.get_checkpoint(table)
    }

    fn set_checkpoint(&self, table: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.checkpoints.set_checkpoint(table, date)
    }

    fn get_split_digests(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        self.checkpoints.get_split_digests()
    }

    fn set_split_digests(&self, digests: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.checkpoints.set_split_digests(digests)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |e| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn parquet_err(context: &'static str) -> impl Fn(PolarsError) -> StoreError {
    move |e| StoreError::Parquet(format!("{context}: {e}"))
}

fn to_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

fn from_days(days: i32) -> NaiveDate {
    NaiveDate::default() + chrono::Duration::days(i64::from(days))
}

fn date_column(name: &str, days: Vec<i32>) -> Result<Column, StoreError> {
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(parquet_err("date cast"))
}

/// Write a DataFrame to `path` via a temp file and rename.
fn write_atomic(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(parquet_err("write parquet"))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(path)(e)
    })
}

fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(io_err(path))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Corrupt {
            table: path.display().to_string(),
            message: e.to_string(),
        })
}

fn column_as(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Column, StoreError> {
    df.column(name)
        .map_err(|_| StoreError::Corrupt {
            table: "parquet".into(),
            message: format!("missing column '{name}'"),
        })?
        .cast(dtype)
        .map_err(parquet_err("column cast"))
}

fn read_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, StoreError> {
    let col = column_as(df, name, &DataType::Float64)?;
    Ok(col.f64().map_err(parquet_err("f64 column"))?.into_iter().collect())
}

fn read_u64(df: &DataFrame, name: &str) -> Result<Vec<Option<u64>>, StoreError> {
    let col = column_as(df, name, &DataType::UInt64)?;
    Ok(col.u64().map_err(parquet_err("u64 column"))?.into_iter().collect())
}

/// A column added after files were first written; absent means zero.
fn read_u64_or_zero(df: &DataFrame, name: &str) -> Result<Vec<u64>, StoreError> {
    if df.column(name).is_err() {
        return Ok(vec![0; df.height()]);
    }
    Ok(read_u64(df, name)?.into_iter().map(|v| v.unwrap_or(0)).collect())
}

fn read_i64(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, StoreError> {
    let col = column_as(df, name, &DataType::Int64)?;
    Ok(col.i64().map_err(parquet_err("i64 column"))?.into_iter().collect())
}

fn read_bools(df: &DataFrame, name: &str) -> Result<Vec<Option<bool>>, StoreError> {
    let col = column_as(df, name, &DataType::Boolean)?;
    Ok(col.bool().map_err(parquet_err("bool column"))?.into_iter().collect())
}

fn read_strings(df: &DataFrame, name: &str) -> Result<Vec<String>, StoreError> {
    let col = column_as(df, name, &DataType::String)?;
    let values: Vec<Option<String>> = col
        .str()
        .map_err(parquet_err("string column"))?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    required(values, name)
}

fn read_dates(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, StoreError> {
    let col = column_as(df, name, &DataType::Int32)?;
    let days: Vec<Option<i32>> = col.i32().map_err(parquet_err("date column"))?.into_iter().collect();
    Ok(required(days, name)?.into_iter().map(from_days).collect())
}

/// Reject nulls in a column that must be fully populated.
fn required<T>(values: Vec<Option<T>>, name: &str) -> Result<Vec<T>, StoreError> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or_else(|| StoreError::Corrupt {
                table: "parquet".into(),
                message: format!("null {name} at row {i}"),
            })
        })
        .collect()
}

fn raw_to_dataframe(bars: &[RawBar]) -> Result<DataFrame, StoreError> {
    DataFrame::new(vec![
        date_column("date", bars.iter().map(|b| to_days(b.date)).collect())?,
        Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<f64>>()),
        Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<f64>>()),
        Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<f64>>()),
        Column::new("close".into(), bars.iter().map(|b| b.close).collect::<Vec<f64>>()),
        Column::new("volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<i64>>()),
        Column::new(
            "transactions".into(),
            bars.iter().map(|b| b.transactions).collect::<Vec<u64>>(),
        ),
    ])
    .map_err(parquet_err("raw dataframe"))
}

fn read_raw_file(path: &Path, ticker: &str) -> Result<Vec<RawBar>, StoreError> {
    let df = read_parquet(path)?;
    let dates = read_dates(&df, "date")?;
    // Nulls become NaN / -1 so screening rejects them instead of the read failing.
    let opens = read_f64(&df, "open")?;
    let highs = read_f64(&df, "high")?;
    let lows = read_f64(&df, "low")?;
    let closes = read_f64(&df, "close")?;
    let volumes = read_i64(&df, "volume")?;
    let transactions = read_u64_or_zero(&df, "transactions")?;

    Ok((0..df.height())
        .map(|i| RawBar {
            ticker: ticker.to_string(),
            date: dates[i],
            open: opens[i].unwrap_or(f64::NAN),
            high: highs[i].unwrap_or(f64::NAN),
            low: lows[i].unwrap_or(f64::NAN),
            close: closes[i].unwrap_or(f64::NAN),
            volume: volumes[i].unwrap_or(-1),
            transactions: transactions[i],
        })
        .collect())
}

fn aggregates_to_dataframe(bars: &[AggregateBar]) -> Result<DataFrame, StoreError> {
    DataFrame::new(vec![
        date_column("period_start", bars.iter().map(|b| to_days(b.period_start)).collect())?,
        date_column("period_end", bars.iter().map(|b| to_days(b.period_end)).collect())?,
        Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<f64>>()),
        Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<f64>>()),
        Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<f64>>()),
        Column::new("close".into(), bars.iter().map(|b| b.close).collect::<Vec<f64>>()),
        Column::new("volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
        Column::new(
            "transactions".into(),
            bars.iter().map(|b| b.transactions).collect::<Vec<u64>>(),
        ),
        Column::new(
            "bar_count".into(),
            bars.iter().map(|b| b.bar_count).collect::<Vec<u32>>(),
        ),
    ])
    .map_err(parquet_err("aggregate dataframe"))
}

fn read_aggregate_file(
    path: &Path,
    ticker: &str,
    timeframe: Timeframe,
) -> Result<Vec<AggregateBar>, StoreError> {
    let df = read_parquet(path)?;
    let starts = read_dates(&df, "period_start")?;
    let ends = read_dates(&df, "period_end")?;
    let opens = required(read_f64(&df, "open")?, "open")?;
    let highs = required(read_f64(&df, "high")?, "high")?;
    let lows = required(read_f64(&df, "low")?, "low")?;
    let closes = required(read_f64(&df, "close")?, "close")?;
    let volumes = required(read_u64(&df, "volume")?, "volume")?;
    let transactions = read_u64_or_zero(&df, "transactions")?;
    let counts = required(read_u64(&df, "bar_count")?, "bar_count")?;

    Ok((0..df.height())
        .map(|i| AggregateBar {
            ticker: ticker.to_string(),
            timeframe,
            period_start: starts[i],
            period_end: ends[i],
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
            transactions: transactions[i],
            bar_count: u32::try_from(counts[i]).unwrap_or(u32::MAX),
        })
        .collect())
}

fn indicators_to_dataframe(rows: &[IndicatorRow]) -> Result<DataFrame, StoreError> {
    let opt = |f: fn(&IndicatorRow) -> Option<f64>| rows.iter().map(f).collect::<Vec<Option<f64>>>();
    DataFrame::new(vec![
        date_column("date", rows.iter().map(|r| to_days(r.date)).collect())?,
        Column::new("sma_20".into(), opt(|r| r.sma_20)),
        Column::new("sma_50".into(), opt(|r| r.sma_50)),
        Column::new("sma_200".into(), opt(|r| r.sma_200)),
        Column::new("atr_14".into(), opt(|r| r.atr_14)),
        Column::new("volume_avg_20".into(), opt(|r| r.volume_avg_20)),
        Column::new("volume_ratio".into(), opt(|r| r.volume_ratio)),
        Column::new(
            "is_hvc".into(),
            rows.iter().map(|r| r.is_hvc).collect::<Vec<bool>>(),
        ),
    ])
    .map_err(parquet_err("indicator dataframe"))
}

fn read_indicator_file(
    path: &Path,
    ticker: &str,
    timeframe: Timeframe,
) -> Result<Vec<IndicatorRow>, StoreError> {
    let df = read_parquet(path)?;
    let dates = read_dates(&df, "date")?;
    let sma_20 = read_f64(&df, "sma_20")?;
    let sma_50 = read_f64(&df, "sma_50")?;
    let sma_200 = read_f64(&df, "sma_200")?;
    let atr_14 = read_f64(&df, "atr_14")?;
    let volume_avg_20 = read_f64(&df, "volume_avg_20")?;
    let volume_ratio = read_f64(&df, "volume_ratio")?;
    let is_hvc = read_bools(&df, "is_hvc")?;

    Ok((0..df.height())
        .map(|i| IndicatorRow {
            ticker: ticker.to_string(),
            date: dates[i],
            timeframe,
            sma_20: sma_20[i],
            sma_50: sma_50[i],
            sma_200: sma_200[i],
            atr_14: atr_14[i],
            volume_avg_20: volume_avg_20[i],
            volume_ratio: volume_ratio[i],
            is_hvc: is_hvc[i].unwrap_or(false),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn raw(ticker: &str, date: NaiveDate, close: f64) -> RawBar {
        RawBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            transactions: 25,
        }
    }

    fn lake() -> (tempfile::TempDir, ParquetLake) {
        let dir = tempfile::tempdir().unwrap();
        let lake = ParquetLake::new(dir.path());
        (dir, lake)
    }

    #[test]
    fn raw_bars_roundtrip_across_years() {
        let (_dir, lake) = lake();
        let bars = vec![
            raw("SPY", d(2023, 12, 29), 470.0),
            raw("SPY", d(2024, 1, 2), 472.0),
            raw("QQQ", d(2024, 1, 2), 400.0),
        ];
        lake.write_raw_bars(&bars).unwrap();

        assert_eq!(lake.list_tickers().unwrap(), vec!["QQQ", "SPY"]);
        let spy = lake.read_raw_bars(&["SPY".to_string()], None).unwrap();
        assert_eq!(spy.len(), 2);
        assert_eq!(spy[0].date, d(2023, 12, 29));
        assert_eq!(spy[1].close, 472.0);
        assert_eq!(spy[1].ticker, "SPY");
        assert_eq!(spy[1], bars[1]);

        let tail = lake
            .read_raw_bars(&["SPY".to_string()], Some(d(2023, 12, 29)))
            .unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(lake.get_max_known_date().unwrap(), Some(d(2024, 1, 2)));
        assert!(!lake.year_path("SPY", 2024).with_extension("parquet.tmp").exists());
    }

    #[test]
    fn raw_file_without_transactions_reads_as_zero() {
        let (_dir, lake) = lake();
        let mut df = raw_to_dataframe(&[raw("SPY", d(2024, 1, 2), 10.0)]).unwrap();
        df.drop_in_place("transactions").unwrap();
        let path = lake.year_path("SPY", 2024);
        write_atomic(&mut df, &path).unwrap();

        let bars = read_raw_file(&path, "SPY").unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].transactions, 0);
        assert_eq!(bars[0].volume, 1000);
    }

    #[test]
    fn raw_writes_merge_with_existing_bars() {
        let (_dir, lake) = lake();
        lake.write_raw_bars(&[raw("SPY", d(2024, 1, 2), 1.0)]).unwrap();
        lake.write_raw_bars(&[raw("SPY", d(2024, 1, 2), 2.0), raw("SPY", d(2024, 1, 3), 3.0)])
            .unwrap();

        let bars = lake.read_raw_bars(&["SPY".to_string()], None).unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);

        let meta = lake.get_meta("SPY").unwrap();
        assert_eq!(meta.bar_count, 2);
        assert_eq!(meta.end_date, d(2024, 1, 3));
        assert_eq!(meta.data_hash.len(), 64);
    }

    #[test]
    fn splits_roundtrip_filtered_by_ticker() {
        let (_dir, lake) = lake();
        assert!(lake.read_splits(&["AAPL".to_string()]).unwrap().is_empty());

        lake.write_splits(&[
            SplitEvent::new("AAPL", d(2020, 8, 31), 1.0, 4.0),
            SplitEvent::new("TSLA", d(2022, 8, 25), 1.0, 3.0),
        ])
        .unwrap();
        let splits = lake.read_splits(&["AAPL".to_string()]).unwrap();
        assert_eq!(splits, vec![SplitEvent::new("AAPL", d(2020, 8, 31), 1.0, 4.0)]);
    }

    #[test]
    fn silver_aggregates_follow_write_mode() {
        let (_dir, lake) = lake();
        let bar = |date: NaiveDate, close: f64| AggregateBar {
            ticker: "SPY".into(),
            timeframe: Timeframe::Daily,
            period_start: date,
            period_end: date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
            transactions: 2,
            bar_count: 1,
        };
        let tickers = vec!["SPY".to_string()];

        lake.write_aggregates(
            Timeframe::Daily,
            &[bar(d(2024, 1, 2), 1.0), bar(d(2024, 1, 3), 1.0)],
            WriteMode::Overwrite,
        )
        .unwrap();
        lake.write_aggregates(
            Timeframe::Daily,
            &[bar(d(2024, 1, 3), 2.0), bar(d(2024, 1, 4), 2.0)],
            WriteMode::Append,
        )
        .unwrap();

        let stored = lake.read_aggregates(Timeframe::Daily, &tickers).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].close, 2.0);
        assert_eq!(stored[0], bar(d(2024, 1, 2), 1.0));

        lake.write_aggregates(Timeframe::Daily, &[bar(d(2024, 2, 1), 5.0)], WriteMode::Overwrite)
            .unwrap();
        assert_eq!(lake.read_aggregates(Timeframe::Daily, &tickers).unwrap().len(), 1);
    }

    #[test]
    fn silver_indicators_keep_missing_values() {
        let (_dir, lake) = lake();
        let row = IndicatorRow {
            ticker: "SPY".into(),
            date: d(2024, 1, 8),
            timeframe: Timeframe::Weekly,
            sma_20: Some(10.5),
            sma_50: None,
            sma_200: None,
            atr_14: Some(1.25),
            volume_avg_20: Some(1000.0),
            volume_ratio: Some(3.5),
            is_hvc: true,
        };
        lake.write_indicators(Timeframe::Weekly, &[row.clone()], WriteMode::Overwrite)
            .unwrap();
        let stored = lake
            .read_indicators(Timeframe::Weekly, &["SPY".to_string()])
            .unwrap();
        assert_eq!(stored, vec![row]);
    }

    #[test]
    fn missing_root_is_unreachable() {
        let lake = ParquetLake::new("/nonexistent/tickerlake/root");
        assert!(matches!(lake.list_tickers(), Err(StoreError::Unreachable(_))));
    }

    #[test]
    fn checkpoints_live_under_root() {
        let (dir, lake) = lake();
        lake.set_checkpoint("daily_aggregates", d(2024, 1, 5)).unwrap();
        assert!(dir.path().join("checkpoints.json").exists());
        assert_eq!(
            lake.get_checkpoint("daily_aggregates").unwrap(),
            Some(d(2024, 1, 5))
        );
    }
}
