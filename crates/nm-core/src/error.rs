//! Core error types for the node manager

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the node manager
#[derive(Error, Debug)]
pub enum NmError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Subsystem registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Remote shell error
    #[error("Remote shell error: {0}")]
    Shell(#[from] ShellError),

    /// History store error
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// File watcher error
    #[error("File watcher error: {0}")]
    Watch(#[from] WatchError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// The configuration directory could not be created
    #[error("Failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither ROS_HOME nor a home directory is available
    #[error("Cannot determine home directory")]
    NoHome,

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Master URI could not be parsed
    #[error("Invalid master URI '{uri}': {source}")]
    MasterUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
}

/// Subsystem registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// `init_globals` was called a second time
    #[error("Subsystems are already initialized")]
    AlreadyInitialized,

    /// An accessor was used before `init_globals`
    #[error("Subsystems are not initialized")]
    NotInitialized,

    /// Initialization ran outside of a tokio runtime
    #[error("No async runtime available for background resolution")]
    NoRuntime,
}

/// Remote shell errors
#[derive(Error, Debug)]
pub enum ShellError {
    /// Spawning the ssh client failed
    #[error("Failed to spawn ssh for {host}: {source}")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Session not found
    #[error("Remote session not found: {0}")]
    NotFound(u64),

    /// The remote command exited unsuccessfully
    #[error("Remote command on {host} failed with status {status:?}: {stderr}")]
    CommandFailed {
        host: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The session was closed before the command finished
    #[error("Remote session {0} was closed")]
    Closed(u64),

    /// I/O error while talking to a session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// History store errors
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Reading or writing the history file failed
    #[error("History file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The history file is not valid JSON
    #[error("Malformed history file: {0}")]
    Format(#[from] serde_json::Error),
}

/// File watcher errors
#[derive(Error, Debug)]
pub enum WatchError {
    /// The watched file could not be inspected
    #[error("Cannot watch {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
