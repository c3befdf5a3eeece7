//! Ticker universe selection.
//!
//! Stored as TOML with explicit include/exclude lists. An empty include
//! list selects every ticker the raw store knows about.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("failed to read universe file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Universe {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Universe {
    /// Load a universe from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Restrict `available` to this universe. Sorted and deduplicated.
    pub fn select(&self, available: &[String]) -> Vec<String> {
        let include: BTreeSet<&str> = self.include.iter().map(String::as_str).collect();
        let exclude: BTreeSet<&str> = self.exclude.iter().map(String::as_str).collect();

        available
            .iter()
            .map(String::as_str)
            .filter(|t| include.is_empty() || include.contains(t))
            .filter(|t| !exclude.contains(t))
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Number of explicitly included tickers (0 means "all").
    pub fn ticker_count(&self) -> usize {
        self.include.len()
    }
}
