//! Host name lookup abstraction

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;

/// Resolves host names and knows the addresses of this machine.
///
/// The locality resolver only talks to the network through this trait.
#[async_trait]
pub trait HostLookup: Send + Sync + 'static {
    /// Resolve a symbolic host name into its addresses.
    ///
    /// May block for as long as the system resolver takes.
    async fn lookup(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;

    /// Addresses assigned to this machine, excluding loopback ranges
    fn local_addresses(&self) -> &[IpAddr];
}
