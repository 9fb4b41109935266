//! Host locality resolution
//!
//! Decides whether a host name refers to this machine. Literal addresses are
//! classified synchronously; symbolic names are resolved by a background
//! task while callers get an immediate provisional `false`.

mod cache;
mod lookup;
mod resolver;

pub use cache::HostCache;
pub use lookup::{interface_addresses, SystemLookup};
pub use resolver::{classify, LocalityResolver};
