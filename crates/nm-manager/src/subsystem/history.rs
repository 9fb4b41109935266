//! History of values entered for launch parameters
//!
//! Values are kept most-recent-first per key and persisted as JSON in the
//! config directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use nm_core::config::ManagerConfig;
use nm_core::error::HistoryError;
use nm_core::traits::HistoryStore;

/// Bounded per-key history of entered values
pub struct History {
    path: PathBuf,
    max_entries: usize,
    entries: RwLock<BTreeMap<String, Vec<String>>>,
}

impl History {
    /// Create an empty history persisted at `path`
    pub fn new(path: PathBuf, max_entries: usize) -> Self {
        Self {
            path,
            max_entries: max_entries.max(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a history in the config directory
    pub fn from_config(cfg_dir: &Path, config: &ManagerConfig) -> Self {
        Self::new(cfg_dir.join(&config.history_file), config.history_max_entries)
    }

    /// File the history is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted entries, replacing the in-memory state.
    ///
    /// A missing file is an empty history. Returns the number of keys.
    pub fn load(&self) -> Result<usize, HistoryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mut loaded: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
        for values in loaded.values_mut() {
            values.truncate(self.max_entries);
        }
        let count = loaded.len();
        *self.entries.write() = loaded;
        tracing::debug!("Loaded {} history keys from {:?}", count, self.path);
        Ok(count)
    }

    /// Remember `value` for `key` as the most recent entry
    pub fn add(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        let values = entries.entry(key.to_string()).or_default();
        values.retain(|v| v != value);
        values.insert(0, value.to_string());
        values.truncate(self.max_entries);
    }

    /// Values entered for `key`, most recent first
    pub fn get(&self, key: &str) -> Vec<String> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of keys with a history
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing was entered yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl HistoryStore for History {
    fn store_all(&self) -> Result<(), HistoryError> {
        let content = serde_json::to_string_pretty(&*self.entries.read())?;
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        // Replace the file atomically through a sibling temp file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        tracing::info!("Stored history to {:?}", self.path);
        Ok(())
    }
}
