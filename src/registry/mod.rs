// file: src/registry/mod.rs
// version: 1.4.0
// guid: 7c1d3e5f-8a9b-4c0d-a2e4-f6a8b0c2d4e6

//! Host registry: persisted mapping from short alias to SSH connection
//! descriptor
//!
//! The registry file (`~/.config/mesh/hosts.yaml`) is the sole source of
//! truth; every operation reloads from disk so callers never see a stale
//! in-memory copy. Schema:
//!
//! ```yaml
//! hosts:
//!   ubu1:
//!     ip: 192.168.50.10
//!     port: 22
//!     user: ubuntu
//! ```

use crate::{MeshError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A registered mesh host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Short alias, validated against the hostname pattern
    pub name: String,
    /// IP address or DNS name
    pub address: String,
    /// SSH port (1-65535)
    pub port: u16,
    /// SSH username
    pub user: String,
}

impl HostEntry {
    /// SSH target string (`user@address`)
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// On-disk shape of a single host entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredHost {
    ip: String,
    #[serde(default = "default_port")]
    port: u16,
    user: Option<String>,
}

fn default_port() -> u16 {
    22
}

/// Validate a host alias for use as a registry key and SSH config host.
///
/// Must start alphanumeric, contain only alphanumerics/hyphen/underscore,
/// and be at most 63 characters.
pub fn validate_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    // Compiled per call; validation is nowhere near a hot path
    let pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("static pattern");
    pattern.is_match(name)
}

/// File-backed host registry
pub struct HostRegistry {
    path: PathBuf,
    default_user: String,
}

impl HostRegistry {
    /// Open the registry at an explicit path
    pub fn at(path: impl Into<PathBuf>, default_user: &str) -> Self {
        Self {
            path: path.into(),
            default_user: default_user.to_string(),
        }
    }

    /// Open the registry at the default per-user location
    pub fn open(default_user: &str) -> Result<Self> {
        Ok(Self::at(crate::config::hosts_file()?, default_user))
    }

    /// Load all hosts from the backing store.
    ///
    /// Missing or empty files yield an empty map. Malformed individual
    /// entries are skipped rather than failing the whole load.
    pub fn list(&self) -> Result<BTreeMap<String, HostEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let doc: serde_yaml::Value = match serde_yaml::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                debug!("Registry file is not valid YAML, treating as empty: {}", e);
                return Ok(BTreeMap::new());
            }
        };

        let mut result = BTreeMap::new();
        let hosts = match doc.get("hosts") {
            Some(serde_yaml::Value::Mapping(map)) => map,
            _ => return Ok(BTreeMap::new()),
        };
        for (key, value) in hosts {
            let Some(name) = key.as_str() else {
                continue;
            };
            let stored: StoredHost = match serde_yaml::from_value(value.clone()) {
                Ok(stored) => stored,
                Err(_) => {
                    debug!("Skipping malformed registry entry: {}", name);
                    continue;
                }
            };
            result.insert(
                name.to_string(),
                HostEntry {
                    name: name.to_string(),
                    address: stored.ip,
                    port: stored.port,
                    user: stored.user.unwrap_or_else(|| self.default_user.clone()),
                },
            );
        }
        Ok(result)
    }

    /// Look up a single host by alias
    pub fn get(&self, name: &str) -> Result<Option<HostEntry>> {
        Ok(self.list()?.remove(name))
    }

    /// Add or replace a host. Upsert semantics: re-adding the same name
    /// replaces address/port/user wholesale.
    pub fn upsert(&self, name: &str, address: &str, port: u16, user: &str) -> Result<HostEntry> {
        if !validate_hostname(name) {
            return Err(MeshError::InvalidHostname {
                name: name.to_string(),
            });
        }
        if port == 0 {
            return Err(MeshError::Config(format!(
                "Invalid port 0 for host '{}'",
                name
            )));
        }
        let entry = HostEntry {
            name: name.to_string(),
            address: address.to_string(),
            port,
            user: user.to_string(),
        };
        let mut hosts = self.list()?;
        hosts.insert(name.to_string(), entry.clone());
        self.persist(&hosts)?;
        Ok(entry)
    }

    /// Remove a host. Returns false (without error) when the alias is absent.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut hosts = self.list()?;
        if hosts.remove(name).is_none() {
            return Ok(false);
        }
        self.persist(&hosts)?;
        Ok(true)
    }

    fn persist(&self, hosts: &BTreeMap<String, HostEntry>) -> Result<()> {
        let stored: BTreeMap<&str, StoredHost> = hosts
            .values()
            .map(|h| {
                (
                    h.name.as_str(),
                    StoredHost {
                        ip: h.address.clone(),
                        port: h.port,
                        user: Some(h.user.clone()),
                    },
                )
            })
            .collect();
        let mut doc = BTreeMap::new();
        doc.insert("hosts", stored);
        let content = serde_yaml::to_string(&doc)?;
        crate::sshconf::write_atomic(&self.path, &content)?;
        Ok(())
    }

    /// Path to the backing store (for diagnostics)
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> HostRegistry {
        HostRegistry::at(dir.path().join("hosts.yaml"), "steve")
    }

    #[test]
    fn test_validate_hostname_accepts_valid_aliases() {
        assert!(validate_hostname("ubu1"));
        assert!(validate_hostname("office-one"));
        assert!(validate_hostname("server_01"));
        assert!(validate_hostname("a"));
        assert!(validate_hostname("A1-b2_c3"));
    }

    #[test]
    fn test_validate_hostname_rejects_invalid_aliases() {
        assert!(!validate_hostname(""));
        assert!(!validate_hostname("host name"));
        assert!(!validate_hostname("-host"));
        assert!(!validate_hostname("_host"));
        assert!(!validate_hostname("host@name"));
        assert!(!validate_hostname("host.name"));
        assert!(!validate_hostname(&"a".repeat(64)));
        assert!(validate_hostname(&"a".repeat(63)));
    }

    #[test]
    fn test_upsert_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let entry = reg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();
        assert_eq!(entry.name, "ubu1");

        let loaded = reg.get("ubu1").unwrap().unwrap();
        assert_eq!(loaded.address, "192.168.50.10");
        assert_eq!(loaded.port, 22);
        assert_eq!(loaded.user, "ubuntu");
        assert_eq!(loaded.ssh_target(), "ubuntu@192.168.50.10");
    }

    #[test]
    fn test_upsert_is_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        reg.upsert("ubu1", "192.168.50.10", 22, "steve").unwrap();
        reg.upsert("ubu1", "192.168.50.20", 2222, "admin").unwrap();

        let hosts = reg.list().unwrap();
        assert_eq!(hosts.len(), 1);
        let entry = &hosts["ubu1"];
        assert_eq!(entry.address, "192.168.50.20");
        assert_eq!(entry.port, 2222);
        assert_eq!(entry.user, "admin");
    }

    #[test]
    fn test_upsert_rejects_invalid_name_without_persisting() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        let err = reg.upsert("invalid host", "192.168.1.1", 22, "steve");
        assert!(matches!(err, Err(MeshError::InvalidHostname { .. })));
        assert!(!dir.path().join("hosts.yaml").exists());
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_rejects_port_zero() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(reg.upsert("ubu1", "192.168.1.1", 0, "steve").is_err());
    }

    #[test]
    fn test_remove_absent_host_returns_false() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(!reg.remove("nonexistent").unwrap());
        assert!(!dir.path().join("hosts.yaml").exists());
    }

    #[test]
    fn test_remove_existing_host() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.upsert("ubu1", "192.168.50.10", 22, "steve").unwrap();

        assert!(reg.remove("ubu1").unwrap());
        assert!(reg.get("ubu1").unwrap().is_none());
    }

    #[test]
    fn test_list_empty_store() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_skips_malformed_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.yaml");
        std::fs::write(
            &path,
            "hosts:\n  valid_host:\n    ip: 192.168.1.1\n    port: 22\n    user: steve\n  null_host: null\n  bad_host: \"just a string\"\n",
        )
        .unwrap();

        let reg = HostRegistry::at(path, "steve");
        let hosts = reg.list().unwrap();
        assert_eq!(hosts.len(), 1);
        assert!(hosts.contains_key("valid_host"));
    }

    #[test]
    fn test_missing_user_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.yaml");
        std::fs::write(&path, "hosts:\n  ubu1:\n    ip: 192.168.1.1\n").unwrap();

        let reg = HostRegistry::at(path, "steve");
        let entry = reg.get("ubu1").unwrap().unwrap();
        assert_eq!(entry.user, "steve");
        assert_eq!(entry.port, 22);
    }
}
