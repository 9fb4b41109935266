//! Shutdown orchestration
//!
//! The lifecycle moves `Running -> ShuttingDown -> Terminated` exactly once.
//! Shutdown runs a fixed sequence of steps; each step is isolated so a
//! failing or panicking step never prevents the ones after it.
//!
//! # Steps
//!
//! 1. Close all remote shell sessions
//! 2. Persist the history
//! 3. Let the presentation layer finish
//! 4. Stop the event loop

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use nm_core::traits::{HistoryStore, Presentation, RemoteShell};

/// Lifecycle state of the manager process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Normal operation
    Running = 0,
    /// Shutdown steps are executing
    ShuttingDown = 1,
    /// Shutdown completed
    Terminated = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Terminated,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::ShuttingDown => write!(f, "shutting down"),
            LifecycleState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Collaborators visited during shutdown; absent ones are skipped
#[derive(Default, Clone, Copy)]
pub struct ShutdownTargets<'a> {
    pub shell: Option<&'a dyn RemoteShell>,
    pub history: Option<&'a dyn HistoryStore>,
    pub presentation: Option<&'a dyn Presentation>,
}

/// Runs the shutdown sequence at most once
pub struct Lifecycle {
    state: AtomicU8,
    /// Cancelled as the last shutdown step
    event_loop: CancellationToken,
}

impl Lifecycle {
    /// Create a running lifecycle
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Running as u8),
            event_loop: CancellationToken::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Token the event loop waits on
    pub fn event_loop_token(&self) -> CancellationToken {
        self.event_loop.clone()
    }

    /// Run the shutdown sequence.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// immediately. Never fails: step failures are logged and skipped.
    pub async fn shutdown(&self, targets: ShutdownTargets<'_>) {
        if self
            .state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::debug!("Shutdown already {}", self.state());
            return;
        }
        tracing::info!("Shutting down node manager...");

        if let Some(shell) = targets.shell {
            let open = shell.open_sessions();
            match AssertUnwindSafe(shell.close_all()).catch_unwind().await {
                Ok(Ok(())) => tracing::info!("Closed {} remote sessions", open),
                Ok(Err(e)) => tracing::warn!("Failed to close remote sessions: {}", e),
                Err(_) => tracing::error!("Closing remote sessions panicked"),
            }
        }

        if let Some(history) = targets.history {
            match std::panic::catch_unwind(AssertUnwindSafe(|| history.store_all())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to store history: {}", e),
                Err(_) => tracing::error!("Storing history panicked"),
            }
        }

        if let Some(presentation) = targets.presentation {
            match std::panic::catch_unwind(AssertUnwindSafe(|| presentation.finish())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Presentation finish failed: {:#}", e),
                Err(_) => tracing::error!("Presentation finish panicked"),
            }
        }

        self.event_loop.cancel();
        self.state
            .store(LifecycleState::Terminated as u8, Ordering::SeqCst);
        tracing::info!("Node manager shutdown complete");
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
