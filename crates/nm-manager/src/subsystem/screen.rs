//! Screen session naming and command synthesis
//!
//! Nodes started detached run inside a named `screen` session so their
//! output can be inspected later. Session names are `<host>_<node>` with
//! every `/` replaced by `_`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// screen binary
pub const SCREEN: &str = "screen";

/// Separator between host and node, also replaces `/` in node names
const NAME_SEP: char = '_';

/// A session reported by `screen -ls`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSession {
    /// Pid of the screen process
    pub pid: u32,
    /// Host the node was started for
    pub host: String,
    /// Node name decoded from the session name
    pub node: String,
    /// Whether a terminal is attached
    pub attached: bool,
}

/// Builds screen sessions for nodes and keeps their logs under the config dir
pub struct ScreenHandler {
    screen_dir: PathBuf,
}

impl ScreenHandler {
    /// Create a handler storing logs and config files in `<cfg_dir>/screen`
    pub fn new(cfg_dir: &Path) -> Self {
        Self {
            screen_dir: cfg_dir.join("screen"),
        }
    }

    /// Directory holding screen logs and configs
    pub fn screen_dir(&self) -> &Path {
        &self.screen_dir
    }

    /// Session name for a node, e.g. `robot`, `/ns/talker` -> `robot__ns_talker`
    pub fn session_name(host: &str, node: &str) -> String {
        format!("{}{}{}", host, NAME_SEP, node).replace('/', &NAME_SEP.to_string())
    }

    /// Split a full session name (`<pid>.<host>_<node>`) into pid, host and
    /// node name.
    ///
    /// Host names never contain `_`; the node decoding is lossy for node
    /// names that do.
    pub fn split_session_name(session: &str) -> Option<(u32, String, String)> {
        let (pid, name) = session.split_once('.')?;
        let pid = pid.parse().ok()?;
        let (host, node) = name.split_once(NAME_SEP)?;
        if host.is_empty() || node.is_empty() {
            return None;
        }
        Some((pid, host.to_string(), node.replace(NAME_SEP, "/")))
    }

    /// Log file of a node's session
    pub fn log_path(&self, host: &str, node: &str) -> PathBuf {
        self.screen_dir
            .join(format!("{}.log", Self::session_name(host, node)))
    }

    /// screen configuration file of a node's session
    pub fn cfg_path(&self, host: &str, node: &str) -> PathBuf {
        self.screen_dir
            .join(format!("{}.conf", Self::session_name(host, node)))
    }

    /// Write the screen configuration that redirects the session log.
    ///
    /// Returns the path of the written file.
    pub fn write_config(&self, host: &str, node: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.screen_dir)?;
        let path = self.cfg_path(host, node);
        let content = format!(
            "logfile {}\nlogfile flush 0\ndefscrollback 10000\n",
            self.log_path(host, node).display()
        );
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Arguments that start `argv` in a detached, logged session
    pub fn launch_args<S: AsRef<str>>(&self, host: &str, node: &str, argv: &[S]) -> Vec<String> {
        let mut args = vec![
            SCREEN.to_string(),
            "-c".to_string(),
            self.cfg_path(host, node).to_string_lossy().into_owned(),
            "-L".to_string(),
            "-dmS".to_string(),
            Self::session_name(host, node),
        ];
        args.extend(argv.iter().map(|arg| arg.as_ref().to_string()));
        args
    }

    /// Arguments that terminate a session
    pub fn kill_args(session: &str) -> Vec<String> {
        [SCREEN, "-X", "-S", session, "quit"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Parse the output of `screen -ls`
    pub fn parse_session_list(output: &str) -> Vec<ScreenSession> {
        output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let session = fields.next()?;
                let (pid, host, node) = Self::split_session_name(session)?;
                let attached = line.contains("(Attached)");
                Some(ScreenSession {
                    pid,
                    host,
                    node,
                    attached,
                })
            })
            .collect()
    }
}
