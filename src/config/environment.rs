// file: src/config/environment.rs
// version: 1.2.0
// guid: 4d6e8f02-1a3b-4c5d-be7f-90a1b2c3d4e5

//! Environment snapshot: local OS type, machine role, default SSH user
//!
//! The snapshot is taken once at process start and passed around explicitly,
//! so role detection is testable without hidden global state.

use std::collections::HashMap;
use std::path::Path;

/// Local operating system type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOs {
    Linux,
    Wsl2,
    Windows,
    Macos,
    Unknown,
}

impl LocalOs {
    /// Get the OS type as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalOs::Linux => "linux",
            LocalOs::Wsl2 => "wsl2",
            LocalOs::Windows => "windows",
            LocalOs::Macos => "macos",
            LocalOs::Unknown => "unknown",
        }
    }
}

/// Machine role in the mesh network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Headscale coordination server
    Server,
    /// WSL2 client
    Wsl2,
    /// Windows client
    Windows,
    Unknown,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Wsl2 => "wsl2",
            Role::Windows => "windows",
            Role::Unknown => "unknown",
        }
    }
}

/// Environment snapshot captured at process start
#[derive(Debug, Clone)]
pub struct Environment {
    /// Default SSH user for registry entries without an explicit user
    pub default_user: String,
    /// Local hostname, lowercased
    pub hostname: String,
    /// Local operating system type
    pub os_type: LocalOs,
    /// Machine role derived from hostname mappings and OS type
    pub role: Role,
}

impl Environment {
    /// Capture the current process environment
    pub fn capture() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let hostname = local_hostname(&vars);
        let os_type = detect_local_os();
        let role = detect_role(&hostname, os_type, &vars);
        Self {
            default_user: default_user(&vars),
            hostname,
            os_type,
            role,
        }
    }

    /// Build an environment from explicit values (tests and role overrides)
    pub fn with_values(
        default_user: &str,
        hostname: &str,
        os_type: LocalOs,
        vars: &HashMap<String, String>,
    ) -> Self {
        let hostname = hostname.to_lowercase();
        let role = detect_role(&hostname, os_type, vars);
        Self {
            default_user: default_user.to_string(),
            hostname,
            os_type,
            role,
        }
    }
}

/// Default SSH user: MESH_DEFAULT_USER, then USER, then "user"
fn default_user(vars: &HashMap<String, String>) -> String {
    vars.get("MESH_DEFAULT_USER")
        .or_else(|| vars.get("USER"))
        .cloned()
        .unwrap_or_else(|| "user".to_string())
}

fn local_hostname(vars: &HashMap<String, String>) -> String {
    if let Some(name) = vars.get("HOSTNAME").or_else(|| vars.get("COMPUTERNAME")) {
        if !name.trim().is_empty() {
            return name.trim().to_lowercase();
        }
    }
    // Shells don't always export HOSTNAME; fall back to the hostname binary
    std::process::Command::new("hostname")
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Detect the local operating system type
pub fn detect_local_os() -> LocalOs {
    if cfg!(target_os = "windows") {
        return LocalOs::Windows;
    }
    if cfg!(target_os = "macos") {
        return LocalOs::Macos;
    }
    if cfg!(target_os = "linux") {
        // WSL2 kernels identify themselves in /proc/version
        if let Ok(version) = std::fs::read_to_string(Path::new("/proc/version")) {
            if version.to_lowercase().contains("microsoft") {
                return LocalOs::Wsl2;
            }
        }
        return LocalOs::Linux;
    }
    LocalOs::Unknown
}

fn hostnames_from(vars: &HashMap<String, String>, key: &str) -> Vec<String> {
    vars.get(key)
        .map(|v| {
            v.split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Determine the machine role from hostname mappings and OS type.
///
/// Priority: configured hostname mapping (MESH_SERVER_HOSTNAMES,
/// MESH_WSL2_HOSTNAMES, MESH_WINDOWS_HOSTNAMES), then OS-based inference.
/// WSL2 and Windows often share a hostname; the OS type disambiguates.
pub fn detect_role(hostname: &str, os_type: LocalOs, vars: &HashMap<String, String>) -> Role {
    let hostname = hostname.to_lowercase();
    let servers = hostnames_from(vars, "MESH_SERVER_HOSTNAMES");
    let wsl2 = hostnames_from(vars, "MESH_WSL2_HOSTNAMES");
    let windows = hostnames_from(vars, "MESH_WINDOWS_HOSTNAMES");

    if servers.contains(&hostname) {
        return Role::Server;
    }
    if wsl2.contains(&hostname) || windows.contains(&hostname) {
        return match os_type {
            LocalOs::Wsl2 => Role::Wsl2,
            LocalOs::Windows => Role::Windows,
            _ if wsl2.contains(&hostname) => Role::Wsl2,
            _ => Role::Windows,
        };
    }

    // No configuration matched; infer from OS for simple setups
    match os_type {
        LocalOs::Wsl2 => Role::Wsl2,
        LocalOs::Windows => Role::Windows,
        _ => Role::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_user_precedence() {
        let v = vars(&[("MESH_DEFAULT_USER", "mesh"), ("USER", "steve")]);
        assert_eq!(default_user(&v), "mesh");

        let v = vars(&[("USER", "steve")]);
        assert_eq!(default_user(&v), "steve");

        let v = vars(&[]);
        assert_eq!(default_user(&v), "user");
    }

    #[test]
    fn test_role_server_hostname_match() {
        let v = vars(&[("MESH_SERVER_HOSTNAMES", "hub,hub.local")]);
        assert_eq!(detect_role("HUB", LocalOs::Linux, &v), Role::Server);
        assert_eq!(detect_role("hub.local", LocalOs::Linux, &v), Role::Server);
    }

    #[test]
    fn test_role_shared_hostname_disambiguated_by_os() {
        let v = vars(&[
            ("MESH_WSL2_HOSTNAMES", "box"),
            ("MESH_WINDOWS_HOSTNAMES", "box"),
        ]);
        assert_eq!(detect_role("box", LocalOs::Wsl2, &v), Role::Wsl2);
        assert_eq!(detect_role("box", LocalOs::Windows, &v), Role::Windows);
    }

    #[test]
    fn test_role_unconfigured_linux_is_unknown() {
        let v = vars(&[]);
        assert_eq!(detect_role("anything", LocalOs::Linux, &v), Role::Unknown);
    }

    #[test]
    fn test_role_unconfigured_wsl2_infers_client() {
        let v = vars(&[]);
        assert_eq!(detect_role("anything", LocalOs::Wsl2, &v), Role::Wsl2);
        assert_eq!(detect_role("anything", LocalOs::Windows, &v), Role::Windows);
    }

    #[test]
    fn test_with_values_lowercases_hostname() {
        let v = vars(&[]);
        let env = Environment::with_values("steve", "MixedCase", LocalOs::Linux, &v);
        assert_eq!(env.hostname, "mixedcase");
    }
}
