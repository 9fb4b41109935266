//! Hostname classification cache
//!
//! Every entry is either pending (a background resolution is in flight) or
//! finalized. A finalized entry never changes again. All access goes through
//! a single mutex, and the lookup itself never runs while it is held.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;

use nm_core::{Classification, HostLocality};

enum Entry {
    /// Resolution in flight; the receiver observes its completion
    Pending(watch::Receiver<Option<HostLocality>>),
    /// Final classification
    Resolved(HostLocality),
}

/// Outcome of [`HostCache::get_or_claim`]
pub(crate) enum Slot {
    /// Already finalized
    Resolved(HostLocality),
    /// Another caller owns the resolution
    Pending(watch::Receiver<Option<HostLocality>>),
    /// This caller registered the pending entry and must resolve it
    Claimed(Completion),
}

/// Obligation to finalize a claimed pending entry
pub(crate) struct Completion {
    tx: watch::Sender<Option<HostLocality>>,
}

impl Completion {
    /// Receiver that observes the finalization of this entry
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<HostLocality>> {
        self.tx.subscribe()
    }
}

/// Append-only map from host name to locality classification
pub struct HostCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl HostCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of a host, `None` if it was never seen
    pub fn get(&self, hostname: &str) -> Option<Classification> {
        self.entries.lock().get(hostname).map(|entry| match entry {
            Entry::Pending(_) => Classification::Pending,
            Entry::Resolved(locality) => (*locality).into(),
        })
    }

    /// Look up a host and, if absent, register it in the same critical section.
    ///
    /// `literal` runs under the lock and must not block: when it returns a
    /// classification the entry is stored as finalized, otherwise a pending
    /// entry is inserted and the caller receives the [`Completion`]. At most
    /// one caller per host can ever be handed a `Completion`.
    pub(crate) fn get_or_claim<F>(&self, hostname: &str, literal: F) -> Slot
    where
        F: FnOnce() -> Option<HostLocality>,
    {
        let mut entries = self.entries.lock();
        match entries.get(hostname) {
            Some(Entry::Resolved(locality)) => return Slot::Resolved(*locality),
            Some(Entry::Pending(rx)) => return Slot::Pending(rx.clone()),
            None => {}
        }

        if let Some(locality) = literal() {
            entries.insert(hostname.to_string(), Entry::Resolved(locality));
            tracing::debug!(host = hostname, %locality, "Classified literal address");
            return Slot::Resolved(locality);
        }

        let (tx, rx) = watch::channel(None);
        entries.insert(hostname.to_string(), Entry::Pending(rx));
        tracing::debug!(host = hostname, "Registered pending resolution");
        Slot::Claimed(Completion { tx })
    }

    /// Store the final classification of a claimed entry and wake waiters.
    ///
    /// Returns the classification that is now cached.
    pub(crate) fn finalize(
        &self,
        hostname: &str,
        completion: Completion,
        locality: HostLocality,
    ) -> HostLocality {
        let stored = {
            let mut entries = self.entries.lock();
            match entries.get(hostname) {
                Some(Entry::Resolved(existing)) => *existing,
                _ => {
                    entries.insert(hostname.to_string(), Entry::Resolved(locality));
                    locality
                }
            }
        };
        tracing::debug!(host = hostname, locality = %stored, "Finalized host classification");
        completion.tx.send_replace(Some(stored));
        stored
    }

    /// Number of known hosts, pending ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no host was ever classified
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for HostCache {
    fn default() -> Self {
        Self::new()
    }
}
