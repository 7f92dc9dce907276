// file: src/config/mod.rs
// version: 1.3.0
// guid: 9b0c1d2e-3f4a-45b6-8c7d-e8f9a0b1c2d3

//! Configuration module for meshctl
//!
//! Owns the per-user file locations and the environment snapshot captured
//! once at process start. Nothing in here reads environment variables after
//! startup; callers pass the `Environment` around explicitly.

pub mod environment;

pub use environment::{Environment, LocalOs, Role};

use crate::Result;
use std::fs;
use std::path::PathBuf;

/// Default Headscale control-plane port
pub const HEADSCALE_PORT: u16 = 8080;

/// Get the meshctl config directory (`~/.config/mesh`), creating it on demand
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| crate::error::MeshError::config("Cannot determine home directory"))?;
    let dir = home.join(".config").join("mesh");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path to the host registry file (`~/.config/mesh/hosts.yaml`)
pub fn hosts_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("hosts.yaml"))
}

/// Path to the saved Headscale server URL
pub fn server_url_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("headscale-server"))
}

/// Path to the user's SSH client configuration (`~/.ssh/config`)
pub fn ssh_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| crate::error::MeshError::config("Cannot determine home directory"))?;
    Ok(home.join(".ssh").join("config"))
}

/// Read the saved Headscale server URL, if one was persisted
pub fn load_saved_server() -> Result<Option<String>> {
    let path = server_url_file()?;
    if !path.exists() {
        return Ok(None);
    }
    let url = fs::read_to_string(&path)?;
    let url = url.trim();
    if url.is_empty() {
        Ok(None)
    } else {
        Ok(Some(url.to_string()))
    }
}

/// Persist the Headscale server URL for later runs
pub fn save_server(url: &str) -> Result<()> {
    fs::write(server_url_file()?, url)?;
    Ok(())
}

/// Syncthing GUI port for a machine role
pub fn syncthing_gui_port(role: Role) -> u16 {
    match role {
        Role::Server => 8384,
        Role::Wsl2 => 8385,
        Role::Windows => 8386,
        Role::Unknown => 8384,
    }
}

/// Syncthing sync protocol port for a machine role
pub fn syncthing_sync_port(role: Role) -> u16 {
    match role {
        Role::Server => 22000,
        Role::Wsl2 => 22001,
        Role::Windows => 22002,
        Role::Unknown => 22000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syncthing_ports_per_role() {
        assert_eq!(syncthing_gui_port(Role::Server), 8384);
        assert_eq!(syncthing_gui_port(Role::Wsl2), 8385);
        assert_eq!(syncthing_gui_port(Role::Windows), 8386);
        assert_eq!(syncthing_sync_port(Role::Server), 22000);
        assert_eq!(syncthing_sync_port(Role::Wsl2), 22001);
        assert_eq!(syncthing_sync_port(Role::Windows), 22002);
    }

    #[test]
    fn test_unknown_role_falls_back_to_server_ports() {
        assert_eq!(syncthing_gui_port(Role::Unknown), 8384);
        assert_eq!(syncthing_sync_port(Role::Unknown), 22000);
    }
}
