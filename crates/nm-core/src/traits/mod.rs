//! Collaborator trait definitions
//!
//! The manager core drives these services during startup and shutdown but
//! does not implement their protocols itself.

mod collaborator;
mod lookup;

pub use collaborator::{HistoryStore, NameResolver, Presentation, RemoteShell};
pub use lookup::HostLookup;
