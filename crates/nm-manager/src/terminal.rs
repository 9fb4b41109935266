//! Terminal emulator discovery
//!
//! Finds a terminal emulator once per process and wraps commands so they run
//! in a visible terminal window.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use nm_core::config::ManagerConfig;

/// Looks for a terminal emulator on first use and remembers the result
pub struct TerminalLocator {
    /// Paths to check, in order
    candidates: Vec<PathBuf>,
    /// Detected emulator; an empty string means none was found
    emulator: OnceLock<String>,
}

impl TerminalLocator {
    /// Create a locator over the given candidate paths
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            emulator: OnceLock::new(),
        }
    }

    /// Create a locator over the configured candidates
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.terminal_candidates.clone())
    }

    /// Whether the filesystem has been searched already
    pub fn is_detected(&self) -> bool {
        self.emulator.get().is_some()
    }

    /// Path of the terminal emulator, or `""` if none is installed.
    ///
    /// The filesystem is searched on the first call only.
    pub fn emulator(&self) -> &str {
        self.emulator.get_or_init(|| {
            let found = self
                .candidates
                .iter()
                .find(|path| is_executable(path))
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default();
            if found.is_empty() {
                tracing::warn!("No terminal emulator found in {:?}", self.candidates);
            } else {
                tracing::debug!("Using terminal emulator {}", found);
            }
            found
        })
    }

    /// Build a command line that runs `argv` in a new terminal titled `title`.
    ///
    /// Returns an empty string when no terminal emulator is available; the
    /// caller should then run the command detached. Arguments are joined with
    /// single spaces and are not quoted, so arguments containing spaces or
    /// shell metacharacters must be escaped by the caller.
    pub fn terminal_cmd<S: AsRef<str>>(&self, argv: &[S], title: &str) -> String {
        let emulator = self.emulator();
        if emulator.is_empty() {
            return String::new();
        }
        let command = argv
            .iter()
            .map(|arg| arg.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        [emulator, "-title", title, "-e", command.as_str()].join(" ")
    }
}

impl Default for TerminalLocator {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

/// Regular file with at least one execute bit set
fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
