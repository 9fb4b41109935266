//! Non-blocking locality resolver

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use nm_core::traits::HostLookup;
use nm_core::{Classification, HostLocality};

use super::cache::{Completion, HostCache, Slot};

/// Classify resolved addresses.
///
/// Local if any address is loopback or assigned to this machine.
pub fn classify(addrs: &[IpAddr], local_addresses: &[IpAddr]) -> HostLocality {
    let local = addrs.iter().any(|ip| {
        let ip = ip.to_canonical();
        ip.is_loopback() || local_addresses.contains(&ip)
    });
    HostLocality::from(local)
}

/// Shared, cached local/remote classification of host names.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct LocalityResolver {
    cache: Arc<HostCache>,
    lookup: Arc<dyn HostLookup>,
    runtime: Handle,
    timeout: Option<Duration>,
    /// Number of background resolutions started so far
    spawned: AtomicUsize,
}

impl LocalityResolver {
    /// Create a resolver that spawns background lookups onto `runtime`
    pub fn new(lookup: Arc<dyn HostLookup>, runtime: Handle) -> Self {
        Self {
            cache: Arc::new(HostCache::new()),
            lookup,
            runtime,
            timeout: None,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Bound every background lookup; on expiry the host is remote
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `hostname` refers to this machine.
    ///
    /// Never blocks. An empty host name means this machine. Literal
    /// addresses are answered on the first call; a symbolic name answers
    /// `false` until its background resolution has finalized, so callers
    /// that need the final answer must ask again or use [`Self::resolve`].
    pub fn is_local(&self, hostname: &str) -> bool {
        if hostname.is_empty() {
            return true;
        }
        match self.claim(hostname) {
            Slot::Resolved(locality) => locality.is_local(),
            Slot::Pending(_) => false,
            Slot::Claimed(completion) => {
                self.spawn_resolution(hostname, completion);
                false
            }
        }
    }

    /// Make sure `hostname` is classified or resolving, without waiting.
    ///
    /// Literal addresses are finalized on the spot; symbolic names start
    /// their background resolution now instead of on first use. Known hosts
    /// are left untouched.
    pub fn prewarm(&self, hostname: &str) {
        if hostname.is_empty() {
            return;
        }
        if let Slot::Claimed(completion) = self.claim(hostname) {
            self.spawn_resolution(hostname, completion);
        }
    }

    /// Final classification of `hostname`, waiting for a pending
    /// resolution to complete.
    pub async fn resolve(&self, hostname: &str) -> HostLocality {
        if hostname.is_empty() {
            return HostLocality::Local;
        }
        match self.claim(hostname) {
            Slot::Resolved(locality) => locality,
            Slot::Pending(rx) => wait_finalized(rx).await,
            Slot::Claimed(completion) => {
                let rx = completion.subscribe();
                self.spawn_resolution(hostname, completion);
                wait_finalized(rx).await
            }
        }
    }

    /// Cache state of `hostname`, `None` if it was never queried
    pub fn classification(&self, hostname: &str) -> Option<Classification> {
        self.cache.get(hostname)
    }

    /// Number of background resolutions started since creation
    pub fn background_resolutions(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Number of cached hosts
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }

    fn claim(&self, hostname: &str) -> Slot {
        let local_addresses = self.lookup.local_addresses();
        self.cache.get_or_claim(hostname, || {
            hostname
                .parse::<IpAddr>()
                .ok()
                .map(|ip| classify(&[ip], local_addresses))
        })
    }

    fn spawn_resolution(&self, hostname: &str, completion: Completion) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let hostname = hostname.to_string();
        let cache = Arc::clone(&self.cache);
        let lookup = Arc::clone(&self.lookup);
        let timeout = self.timeout;

        tracing::debug!(host = %hostname, "Resolving host in background");
        self.runtime.spawn(async move {
            let locality = resolve_host(lookup.as_ref(), &hostname, timeout).await;
            cache.finalize(&hostname, completion, locality);
        });
    }
}

async fn resolve_host(
    lookup: &dyn HostLookup,
    hostname: &str,
    timeout: Option<Duration>,
) -> HostLocality {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, lookup.lookup(hostname)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Resolving {} timed out after {:?}, assuming remote", hostname, limit);
                return HostLocality::Remote;
            }
        },
        None => lookup.lookup(hostname).await,
    };

    match result {
        Ok(addrs) if !addrs.is_empty() => classify(&addrs, lookup.local_addresses()),
        Ok(_) => {
            tracing::warn!("No addresses for {}, assuming remote", hostname);
            HostLocality::Remote
        }
        Err(e) => {
            tracing::warn!("Cannot resolve {}: {}, assuming remote", hostname, e);
            HostLocality::Remote
        }
    }
}

async fn wait_finalized(mut rx: watch::Receiver<Option<HostLocality>>) -> HostLocality {
    match rx.wait_for(Option::is_some).await {
        Ok(value) => (*value).unwrap_or(HostLocality::Remote),
        // The resolving task went away without finalizing
        Err(_) => HostLocality::Remote,
    }
}
