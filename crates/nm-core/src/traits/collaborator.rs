//! Services the lifecycle orchestrator talks to

use async_trait::async_trait;

use crate::error::{ConfigError, HistoryError, ShellError};

/// Remote-shell transport holding open sessions to other hosts
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Number of sessions currently open
    fn open_sessions(&self) -> usize;

    /// Close every open remote session
    async fn close_all(&self) -> Result<(), ShellError>;
}

/// Persistent store of previously entered values
pub trait HistoryStore: Send + Sync {
    /// Persist all in-memory entries
    fn store_all(&self) -> Result<(), HistoryError>;
}

/// Presentation layer (window, dialog) that wants to be told about exit
pub trait Presentation: Send + Sync {
    /// Release UI resources before the event loop stops
    fn finish(&self) -> anyhow::Result<()>;
}

/// Translates middleware master URIs into host names
pub trait NameResolver: Send + Sync {
    /// Host portion of a master URI
    fn get_hostname(&self, master_uri: &str) -> Result<String, ConfigError>;
}
