//! JSON-file checkpoint store.
//!
//! One document holds every table's high-water mark and the split digests
//! of the last committed run. Writes are atomic (write .tmp, rename).

use super::store::{CheckpointStore, StoreError};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// On-disk checkpoint document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub tables: BTreeMap<String, NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_digests: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

pub struct JsonCheckpointStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document; a missing file is an empty state.
    pub fn load(&self) -> Result<CheckpointState, StoreError> {
        if !self.path.exists() {
            return Ok(CheckpointState::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            table: "checkpoints".into(),
            message: e.to_string(),
        })
    }

    fn save(&self, state: &CheckpointState) -> Result<(), StoreError> {
        let io_err = |e: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialization(format!("checkpoints: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(e)
        })
    }

    fn update(&self, f: impl FnOnce(&mut CheckpointState)) -> Result<(), StoreError> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.load()?;
        f(&mut state);
        state.updated_at = Some(chrono::Local::now().naive_local());
        self.save(&state)
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn get_checkpoint(&self, table: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.load()?.tables.get(table).copied())
    }

    fn set_checkpoint(&self, table: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.update(|state| {
            state.tables.insert(table.to_string(), date);
        })
    }

    fn get_split_digests(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        Ok(self.load()?.split_digests)
    }

    fn set_split_digests(&self, digests: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.update(|state| {
            state.split_digests = Some(digests.clone());
        })
    }
}
