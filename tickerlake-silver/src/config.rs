//! Pipeline configuration (TOML).
//!
//! Every field has a default, so an empty file is a valid configuration.
//! CLI flags are applied on top with the `with_*` helpers.

use crate::plan::RewriteGranularity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tickerlake_core::data::Universe;
use tickerlake_core::indicators::IndicatorSettings;

pub const DEFAULT_AGGREGATION_BATCH_SIZE: usize = 250;
pub const DEFAULT_INDICATOR_BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tickers per batch for each phase.
///
/// Larger batches mean fewer storage round trips and higher peak memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub aggregation_batch_size: usize,
    pub indicator_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            aggregation_batch_size: DEFAULT_AGGREGATION_BATCH_SIZE,
            indicator_batch_size: DEFAULT_INDICATOR_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the Parquet lake.
    pub data_dir: PathBuf,
    pub rewrite_granularity: RewriteGranularity,
    pub batch: BatchConfig,
    pub indicators: IndicatorSettings,
    pub universe: Universe,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rewrite_granularity: RewriteGranularity::default(),
            batch: BatchConfig::default(),
            indicators: IndicatorSettings::default(),
            universe: Universe::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.aggregation_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch.aggregation_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.batch.indicator_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch.indicator_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        let threshold = self.indicators.hvc_volume_ratio_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "indicators.hvc_volume_ratio_threshold",
                reason: format!("must be a positive number, got {threshold}"),
            });
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_batch_sizes(mut self, aggregation: Option<usize>, indicator: Option<usize>) -> Self {
        if let Some(size) = aggregation {
            self.batch.aggregation_batch_size = size;
        }
        if let Some(size) = indicator {
            self.batch.indicator_batch_size = size;
        }
        self
    }

    pub fn with_granularity(mut self, granularity: RewriteGranularity) -> Self {
        self.rewrite_granularity = granularity;
        self
    }
}
