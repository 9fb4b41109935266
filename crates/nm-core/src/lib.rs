//! nm-core: Core abstractions and configuration for the node manager
//!
//! This crate provides the shared types, collaborator traits, error types
//! and configuration structures used by the manager library and binary.

pub mod config;
pub mod error;
pub mod process;
pub mod traits;
pub mod types;

pub use error::NmError;
pub use types::{Classification, HostLocality};
