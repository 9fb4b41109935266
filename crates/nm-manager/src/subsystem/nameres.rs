//! Master URI and host name resolution

use std::collections::BTreeSet;

use dashmap::DashMap;
use url::Url;

use nm_core::error::ConfigError;
use nm_core::traits::NameResolver;

/// Names and hosts known for one master
#[derive(Debug, Clone, Default)]
struct MasterEntry {
    name: Option<String>,
    hosts: BTreeSet<String>,
}

/// Translates between master URIs, master names and host names
pub struct NameResolution {
    masters: DashMap<String, MasterEntry>,
}

impl NameResolution {
    /// Create an empty name resolution table
    pub fn new() -> Self {
        Self {
            masters: DashMap::new(),
        }
    }

    /// Parse a master URI, accepting `host:port` without a scheme
    pub fn parse_masteruri(master_uri: &str) -> Result<Url, ConfigError> {
        let trimmed = master_uri.trim();
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
        Url::parse(&candidate).map_err(|source| ConfigError::MasterUri {
            uri: master_uri.to_string(),
            source,
        })
    }

    /// Host name part of a master URI, without IPv6 brackets
    pub fn get_hostname(&self, master_uri: &str) -> Result<String, ConfigError> {
        let url = Self::parse_masteruri(master_uri)?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::Invalid(format!("Master URI without host: {}", master_uri)))?;
        Ok(host.trim_start_matches('[').trim_end_matches(']').to_string())
    }

    /// Register a master under a name, reachable through `host`
    pub fn add_master_entry(&self, master_uri: &str, name: Option<&str>, host: &str) {
        let mut entry = self.masters.entry(master_uri.to_string()).or_default();
        if let Some(name) = name {
            entry.name = Some(name.to_string());
        }
        entry.hosts.insert(host.to_string());
    }

    /// Remove a master and everything known about it
    pub fn remove_master_entry(&self, master_uri: &str) -> bool {
        self.masters.remove(master_uri).is_some()
    }

    /// Name of a registered master
    pub fn mastername(&self, master_uri: &str) -> Option<String> {
        self.masters.get(master_uri).and_then(|e| e.name.clone())
    }

    /// Master URI registered under `name`
    pub fn masteruri(&self, name: &str) -> Option<String> {
        self.masters
            .iter()
            .find(|e| e.value().name.as_deref() == Some(name))
            .map(|e| e.key().clone())
    }

    /// Hosts through which a master was seen
    pub fn hosts(&self, master_uri: &str) -> Vec<String> {
        self.masters
            .get(master_uri)
            .map(|e| e.hosts.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for NameResolution {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolver for NameResolution {
    fn get_hostname(&self, master_uri: &str) -> Result<String, ConfigError> {
        NameResolution::get_hostname(self, master_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_hostname() {
        let nameres = NameResolution::new();
        assert_eq!(nameres.get_hostname("http://localhost:11311/").unwrap(), "localhost");
        assert_eq!(nameres.get_hostname("http://Robot-1:11311").unwrap(), "robot-1");
        assert_eq!(nameres.get_hostname("build-farm-42:11311").unwrap(), "build-farm-42");
        assert_eq!(nameres.get_hostname("http://[::1]:11311/").unwrap(), "::1");
        assert_eq!(nameres.get_hostname("http://10.0.0.7:11311/").unwrap(), "10.0.0.7");
    }

    #[test]
    fn test_invalid_masteruri() {
        let nameres = NameResolution::new();
        assert!(nameres.get_hostname("http://").is_err());
        assert!(nameres.get_hostname("").is_err());
    }

    #[test]
    fn test_master_entries() {
        let nameres = NameResolution::new();
        let uri = "http://robot:11311/";
        nameres.add_master_entry(uri, Some("robot_master"), "robot");
        nameres.add_master_entry(uri, None, "10.0.0.7");

        assert_eq!(nameres.mastername(uri).as_deref(), Some("robot_master"));
        assert_eq!(nameres.masteruri("robot_master").as_deref(), Some(uri));
        assert_eq!(nameres.hosts(uri), vec!["10.0.0.7", "robot"]);

        assert!(nameres.remove_master_entry(uri));
        assert!(nameres.mastername(uri).is_none());
        assert!(!nameres.remove_master_entry(uri));
    }
}
