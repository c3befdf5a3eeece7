//! TickerLake Core: the Silver layer's pure engines and storage seams.
//!
//! - Domain types (raw, adjusted and aggregate bars, splits, indicator rows)
//! - Split adjustment engine
//! - Daily → weekly/monthly aggregation engine
//! - Indicator engine (SMA, ATR, volume average/ratio, HVC flag)
//! - Data-quality screening
//! - Storage traits with in-memory and Parquet implementations

pub mod aggregate;
pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod indicators;
pub mod splits;
