//! Polling file watcher
//!
//! Tracks modification times of configuration files and reports which of
//! them changed since the previous check. Each file carries the set of
//! owners (e.g. launch files) that registered it.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;

use nm_core::error::WatchError;

struct WatchedFile {
    modified: Option<SystemTime>,
    owners: BTreeSet<String>,
}

/// Change reported by [`FileWatcher::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// The file's modification time changed
    Modified { path: PathBuf, owners: Vec<String> },
    /// The file disappeared
    Removed { path: PathBuf, owners: Vec<String> },
}

impl FileEvent {
    /// Path of the affected file
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Modified { path, .. } | FileEvent::Removed { path, .. } => path,
        }
    }
}

/// Watches a set of files by polling their metadata
pub struct FileWatcher {
    files: DashMap<PathBuf, WatchedFile>,
}

impl FileWatcher {
    /// Create an empty watcher
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    /// Watch `path` on behalf of `owner`
    pub fn add(&self, path: &Path, owner: &str) -> Result<(), WatchError> {
        let modified = modified_time(path).map_err(|source| WatchError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        let mut entry = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchedFile {
                modified: Some(modified),
                owners: BTreeSet::new(),
            });
        entry.owners.insert(owner.to_string());
        Ok(())
    }

    /// Drop `owner`'s interest in `path`; the file is forgotten once no
    /// owner is left. Returns whether the file is still watched.
    pub fn remove(&self, path: &Path, owner: &str) -> bool {
        let still_watched = match self.files.get_mut(path) {
            Some(mut entry) => {
                entry.owners.remove(owner);
                !entry.owners.is_empty()
            }
            None => return false,
        };
        if !still_watched {
            self.files.remove(path);
        }
        still_watched
    }

    /// Report files changed since the previous check.
    ///
    /// A removed file is reported once and stays watched, so it is reported
    /// as modified when it reappears.
    pub fn check(&self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        for mut entry in self.files.iter_mut() {
            let current = modified_time(entry.key()).ok();
            if current == entry.modified {
                continue;
            }
            let path = entry.key().clone();
            let owners = entry.owners.iter().cloned().collect();
            entry.modified = current;
            events.push(match current {
                Some(_) => FileEvent::Modified { path, owners },
                None => FileEvent::Removed { path, owners },
            });
        }
        events.sort_by(|a, b| a.path().cmp(b.path()));
        events
    }

    /// Owners of a watched file
    pub fn owners(&self, path: &Path) -> Vec<String> {
        self.files
            .get(path)
            .map(|e| e.owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All watched files
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Number of watched files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if nothing is watched
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn modified_time(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch_later(path: &Path, content: &str) {
        let before = modified_time(path).ok();
        fs::write(path, content).unwrap();
        // Some filesystems have coarse timestamps
        if modified_time(path).ok() == before {
            let file = fs::OpenOptions::new().write(true).open(path).unwrap();
            let later = before.unwrap() + Duration::from_secs(2);
            file.set_modified(later).unwrap();
        }
    }

    #[test]
    fn test_add_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new();
        let result = watcher.add(&dir.path().join("missing.launch"), "a.launch");
        assert!(matches!(result, Err(WatchError::Metadata { .. })));
        assert!(watcher.is_empty());
    }

    #[test]
    fn test_detects_modification_and_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot.launch");
        fs::write(&path, "<launch/>").unwrap();

        let watcher = FileWatcher::new();
        watcher.add(&path, "robot.launch").unwrap();
        assert!(watcher.check().is_empty());

        touch_later(&path, "<launch></launch>");
        assert_eq!(
            watcher.check(),
            vec![FileEvent::Modified {
                path: path.clone(),
                owners: vec!["robot.launch".to_string()],
            }]
        );
        assert!(watcher.check().is_empty());

        fs::remove_file(&path).unwrap();
        let events = watcher.check();
        assert!(matches!(&events[..], [FileEvent::Removed { .. }]));
        assert!(watcher.check().is_empty());
    }

    #[test]
    fn test_owners_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.yaml");
        fs::write(&path, "a: 1").unwrap();

        let watcher = FileWatcher::new();
        watcher.add(&path, "a.launch").unwrap();
        watcher.add(&path, "b.launch").unwrap();
        assert_eq!(watcher.len(), 1);
        assert_eq!(watcher.owners(&path), vec!["a.launch", "b.launch"]);

        assert!(watcher.remove(&path, "a.launch"));
        assert!(!watcher.remove(&path, "b.launch"));
        assert!(watcher.watched().is_empty());
        assert!(!watcher.remove(&path, "b.launch"));
    }
}
