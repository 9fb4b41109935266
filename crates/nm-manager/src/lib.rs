//! nm-manager: Host locality resolution and subsystem lifecycle
//!
//! The manager decides for every node launch whether the target host is
//! this machine, builds the command that starts the node (visible terminal,
//! detached screen session, or remote starter over ssh), and tears down all
//! subsystems in a fixed order when the process exits.

pub mod lifecycle;
pub mod locality;
pub mod registry;
pub mod subsystem;
pub mod terminal;

pub use lifecycle::{Lifecycle, LifecycleState};
pub use locality::LocalityResolver;
pub use registry::{Registry, Subsystems};
pub use terminal::TerminalLocator;
