//! Storage traits, adapters and raw-data screening.

pub mod checkpoint;
pub mod memory;
pub mod parquet;
pub mod quality;
pub mod store;
pub mod universe;

pub use checkpoint::{CheckpointState, JsonCheckpointStore};
pub use memory::MemoryLake;
pub use parquet::{BronzeMeta, ParquetLake};
pub use quality::{screen_bars, DataQualityIssue, QualityRule, Screened};
pub use store::{
    CheckpointStore, RawBarStore, SilverStore, SplitRegistry, StoreError, WriteMode,
};
pub use universe::{Universe, UniverseError};
