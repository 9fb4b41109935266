//! System resolver backed host lookup

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use nm_core::traits::HostLookup;

/// Host lookup through the operating system resolver
pub struct SystemLookup {
    /// Non-loopback addresses of this machine
    local_addresses: Vec<IpAddr>,
}

impl SystemLookup {
    /// Discover this machine's addresses.
    ///
    /// Collects the addresses of all network interfaces plus whatever this
    /// machine's host name resolves to. The host name lookup is bounded by
    /// `timeout`; failures only shrink the result.
    pub async fn discover(timeout: Option<Duration>) -> Self {
        let mut local_addresses = match interface_addresses() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!("Failed to list network interfaces: {}", e);
                Vec::new()
            }
        };

        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        match with_timeout(resolve(&hostname), timeout).await {
            Ok(addrs) => local_addresses.extend(addrs),
            Err(e) => tracing::warn!("Failed to resolve own host name {}: {}", hostname, e),
        }

        let local_addresses = normalize(local_addresses);
        tracing::debug!("Local addresses of {}: {:?}", hostname, local_addresses);
        Self { local_addresses }
    }

    /// Use a fixed set of local addresses
    pub fn with_local_addresses(local_addresses: Vec<IpAddr>) -> Self {
        Self { local_addresses }
    }
}

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        resolve(hostname).await
    }

    fn local_addresses(&self) -> &[IpAddr] {
        &self.local_addresses
    }
}

async fn resolve(hostname: &str) -> io::Result<Vec<IpAddr>> {
    let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((hostname, 0))
        .await?
        .map(|addr| addr.ip().to_canonical())
        .collect();
    addrs.sort();
    addrs.dedup();
    Ok(addrs)
}

/// Canonical, sorted, deduplicated addresses without loopback ranges
fn normalize(addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut addrs: Vec<IpAddr> = addrs
        .into_iter()
        .map(|ip| ip.to_canonical())
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .collect();
    addrs.sort();
    addrs.dedup();
    addrs
}

/// Run a lookup, failing with `TimedOut` once `timeout` expires
async fn with_timeout<F>(lookup: F, timeout: Option<Duration>) -> io::Result<Vec<IpAddr>>
where
    F: Future<Output = io::Result<Vec<IpAddr>>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, lookup).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("lookup timed out after {:?}", limit),
            ))
        }),
        None => lookup.await,
    }
}

/// Addresses assigned to the network interfaces of this machine
#[cfg(unix)]
pub fn interface_addresses() -> io::Result<Vec<IpAddr>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // getifaddrs allocates the list; it is released with freeifaddrs below
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut addrs = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        unsafe {
            if let Some(ip) = sockaddr_ip((*cursor).ifa_addr) {
                addrs.push(ip);
            }
            cursor = (*cursor).ifa_next;
        }
    }

    unsafe { libc::freeifaddrs(head) };
    Ok(addrs)
}

/// Addresses assigned to the network interfaces of this machine
#[cfg(not(unix))]
pub fn interface_addresses() -> io::Result<Vec<IpAddr>> {
    Ok(Vec::new())
}

/// IP address of an `AF_INET` / `AF_INET6` socket address.
///
/// `addr` must be null or point to a valid `sockaddr` whose family tag
/// matches its actual layout.
#[cfg(unix)]
unsafe fn sockaddr_ip(addr: *const libc::sockaddr) -> Option<IpAddr> {
    if addr.is_null() {
        return None;
    }
    match (*addr).sa_family as libc::c_int {
        libc::AF_INET => {
            let sin = &*(addr as *const libc::sockaddr_in);
            Some(IpAddr::V4(std::net::Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(addr as *const libc::sockaddr_in6);
            Some(IpAddr::from(sin6.sin6_addr.s6_addr))
        }
        _ => None,
    }
}
