//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final local/remote classification of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostLocality {
    /// The host is this machine
    Local,
    /// The host is another machine, or could not be resolved
    Remote,
}

impl HostLocality {
    /// Whether the host is this machine
    pub fn is_local(self) -> bool {
        matches!(self, HostLocality::Local)
    }
}

impl From<bool> for HostLocality {
    fn from(local: bool) -> Self {
        if local {
            HostLocality::Local
        } else {
            HostLocality::Remote
        }
    }
}

impl fmt::Display for HostLocality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostLocality::Local => write!(f, "local"),
            HostLocality::Remote => write!(f, "remote"),
        }
    }
}

/// Observable state of a hostname in the locality cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Background resolution is in flight
    Pending,
    /// Finalized as local
    Local,
    /// Finalized as remote
    Remote,
}

impl Classification {
    /// The finalized locality, if resolution has completed
    pub fn locality(self) -> Option<HostLocality> {
        match self {
            Classification::Pending => None,
            Classification::Local => Some(HostLocality::Local),
            Classification::Remote => Some(HostLocality::Remote),
        }
    }
}

impl From<HostLocality> for Classification {
    fn from(locality: HostLocality) -> Self {
        match locality {
            HostLocality::Local => Classification::Local,
            HostLocality::Remote => Classification::Remote,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Pending => write!(f, "pending"),
            Classification::Local => write!(f, "local"),
            Classification::Remote => write!(f, "remote"),
        }
    }
}
