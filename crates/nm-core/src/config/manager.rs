//! Manager configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Candidate terminal emulators, checked in order
pub const DEFAULT_TERMINAL_CANDIDATES: &[&str] = &["/usr/bin/x-terminal-emulator", "/usr/bin/xterm"];

/// Configuration for the node manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound for a single background host name lookup.
    /// Zero disables the timeout.
    #[serde(with = "duration_secs")]
    pub resolve_timeout: Duration,

    /// Terminal emulators to check, first executable match wins
    pub terminal_candidates: Vec<PathBuf>,

    /// Maximum number of values remembered per history key
    pub history_max_entries: usize,

    /// History file name inside the config directory
    pub history_file: String,

    /// ssh client binary
    pub ssh_binary: PathBuf,

    /// Connect timeout passed to the ssh client
    #[serde(with = "duration_secs")]
    pub ssh_connect_timeout: Duration,

    /// Interval between file watcher polls
    #[serde(with = "duration_secs")]
    pub watch_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(10),
            terminal_candidates: DEFAULT_TERMINAL_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .collect(),
            history_max_entries: 10,
            history_file: "history.json".to_string(),
            ssh_binary: PathBuf::from("ssh"),
            ssh_connect_timeout: Duration::from_secs(5),
            watch_interval: Duration::from_secs(2),
        }
    }
}

impl ManagerConfig {
    /// Lookup timeout, `None` when disabled
    pub fn resolve_timeout(&self) -> Option<Duration> {
        if self.resolve_timeout.is_zero() {
            None
        } else {
            Some(self.resolve_timeout)
        }
    }
}
