//! Subsystem handlers owned by the registry
//!
//! Each handler synchronizes its own state; none of their constructors
//! touches another subsystem or performs I/O.

pub mod history;
pub mod nameres;
pub mod screen;
pub mod ssh;
pub mod starter;
pub mod watcher;

pub use history::History;
pub use nameres::NameResolution;
pub use screen::{ScreenHandler, ScreenSession};
pub use ssh::SshHandler;
pub use starter::{LaunchPlan, NodeLaunch, StartHandler};
pub use watcher::{FileEvent, FileWatcher};
