// file: src/sshconf/mod.rs
// version: 1.3.0
// guid: 2e4f6a80-9b1c-4d3e-85f7-a9b1c3d5e7f0

//! SSH client config reconciler
//!
//! Manages delimited, tool-owned host blocks inside `~/.ssh/config` without
//! disturbing hand-authored content:
//!
//! ```text
//! # mesh-managed: ubu1
//! Host ubu1
//!     HostName 192.168.50.10
//!     Port 22
//!     User ubuntu
//! # end mesh-managed: ubu1
//! ```
//!
//! Every edit is a whole-file read-modify-write, committed with a
//! temp-file-then-rename so an interrupted run never leaves a half-written
//! config behind.

use crate::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Start marker prefix for a dynamic host block
pub const BLOCK_START: &str = "# mesh-managed:";
/// End marker prefix for a dynamic host block
pub const BLOCK_END: &str = "# end mesh-managed:";

/// Write a file atomically via temp-file-then-rename in the target directory
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        crate::error::MeshError::config(format!("Path has no parent: {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| crate::error::MeshError::Io(e.error))?;
    Ok(())
}

/// Reconciler over one SSH config file
pub struct SshConfig {
    path: PathBuf,
}

impl SshConfig {
    /// Open the reconciler over an explicit config path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the reconciler over the default per-user SSH config
    pub fn open() -> Result<Self> {
        Ok(Self::at(crate::config::ssh_config_path()?))
    }

    fn read(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(&self.path)?)
    }

    fn write(&self, content: &str) -> Result<()> {
        write_atomic(&self.path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
            if let Some(dir) = self.path.parent() {
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }

    /// Check whether a host entry exists, either as a dynamic block or as a
    /// statically authored `Host <name>` directive.
    pub fn block_exists(&self, name: &str) -> Result<bool> {
        let content = self.read()?;
        if has_marker(&content, name) {
            return Ok(true);
        }
        for line in content.lines() {
            let stripped = line.trim();
            if stripped.to_lowercase().starts_with("host ") {
                if let Some(rest) = stripped.get(5..) {
                    if rest.split_whitespace().any(|h| h == name) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Add or replace the dynamic block for a host.
    ///
    /// Any prior dynamic block for the name is removed first; static entries
    /// are never touched. The result contains exactly one block per name.
    pub fn upsert(&self, name: &str, address: &str, port: u16, user: &str) -> Result<()> {
        let existing = self.read()?;
        let existing = remove_block(&existing, name);

        let block = format!(
            "{start} {name}\nHost {name}\n    HostName {address}\n    Port {port}\n    User {user}\n{end} {name}\n",
            start = BLOCK_START,
            end = BLOCK_END,
        );

        let new_content = if existing.trim().is_empty() {
            block
        } else {
            format!("{}\n\n{}", existing.trim_end(), block)
        };
        self.write(&new_content)?;
        debug!("Upserted SSH config block for {}", name);
        Ok(())
    }

    /// Remove the dynamic block for a host.
    ///
    /// Returns false (without error) when no dynamic block exists; a static
    /// `Host <name>` entry without markers is left untouched.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let content = self.read()?;
        if !has_marker(&content, name) {
            return Ok(false);
        }
        let new_content = remove_block(&content, name);
        self.write(&new_content)?;
        debug!("Removed SSH config block for {}", name);
        Ok(true)
    }

    /// Path to the config file (for diagnostics)
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether content carries a start marker for exactly this name. Markers
/// are compared as whole lines so `ubu1` never matches `ubu10`.
fn has_marker(content: &str, name: &str) -> bool {
    let start_marker = format!("{} {}", BLOCK_START, name);
    content.lines().any(|line| line.trim() == start_marker)
}

/// Remove one dynamic host block from config content, then collapse runs of
/// 3+ blank lines to at most 2 and trim leading blanks.
fn remove_block(content: &str, name: &str) -> String {
    let start_marker = format!("{} {}", BLOCK_START, name);
    let end_marker = format!("{} {}", BLOCK_END, name);

    let mut kept = Vec::new();
    let mut in_block = false;
    for line in content.lines() {
        if line.trim() == start_marker {
            in_block = true;
            continue;
        }
        if line.trim() == end_marker {
            in_block = false;
            continue;
        }
        if !in_block {
            kept.push(line);
        }
    }

    let mut result = kept.join("\n");
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }
    let trimmed = result.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SshConfig {
        SshConfig::at(dir.path().join("config"))
    }

    #[test]
    fn test_upsert_creates_block() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);

        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();
        assert!(cfg.block_exists("ubu1").unwrap());

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(content.contains("# mesh-managed: ubu1"));
        assert!(content.contains("# end mesh-managed: ubu1"));
        assert!(content.contains("Host ubu1"));
        assert!(content.contains("HostName 192.168.50.10"));
        assert!(content.contains("Port 22"));
        assert!(content.contains("User ubuntu"));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);

        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();
        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert_eq!(content.matches("# mesh-managed: ubu1").count(), 1);
        assert_eq!(content.matches("Host ubu1").count(), 1);
    }

    #[test]
    fn test_upsert_replaces_prior_block() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);

        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();
        cfg.upsert("ubu1", "10.0.0.5", 2222, "admin").unwrap();

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert_eq!(content.matches("# mesh-managed: ubu1").count(), 1);
        assert!(content.contains("HostName 10.0.0.5"));
        assert!(content.contains("Port 2222"));
        assert!(!content.contains("192.168.50.10"));
    }

    #[test]
    fn test_upsert_preserves_static_entries() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let static_entry = "Host myserver\n    HostName server.local\n    User admin\n";
        std::fs::write(cfg.path(), static_entry).unwrap();

        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(content.contains("Host myserver\n    HostName server.local\n    User admin"));
        assert!(content.contains("Host ubu1"));
    }

    #[test]
    fn test_remove_block() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        cfg.upsert("ubu1", "192.168.50.10", 22, "ubuntu").unwrap();

        assert!(cfg.remove("ubu1").unwrap());
        assert!(!cfg.block_exists("ubu1").unwrap());
        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(!content.contains("ubu1"));
    }

    #[test]
    fn test_remove_absent_block_returns_false() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        assert!(!cfg.remove("nonexistent").unwrap());
    }

    #[test]
    fn test_prefix_sharing_aliases_stay_independent() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        cfg.upsert("ubu1", "192.168.50.10", 22, "steve").unwrap();
        cfg.upsert("ubu10", "192.168.50.11", 22, "steve").unwrap();

        assert!(cfg.remove("ubu1").unwrap());

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(content.contains("Host ubu10"));
        assert!(content.contains("HostName 192.168.50.11"));
        assert!(cfg.block_exists("ubu10").unwrap());
        assert!(!content.contains("192.168.50.10"));
    }

    #[test]
    fn test_remove_prefix_alias_is_not_a_match_for_longer_name() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        cfg.upsert("ubu10", "192.168.50.11", 22, "steve").unwrap();

        // Only ubu10 exists; removing ubu1 is a no-op that reports absence
        assert!(!cfg.remove("ubu1").unwrap());
        assert!(!cfg.block_exists("ubu1").unwrap());
        assert!(cfg.block_exists("ubu10").unwrap());

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(content.contains("Host ubu10"));
    }

    #[test]
    fn test_upsert_prefix_alias_leaves_longer_sibling_intact() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        cfg.upsert("ubu10", "192.168.50.11", 22, "steve").unwrap();
        cfg.upsert("ubu1", "192.168.50.10", 22, "steve").unwrap();

        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(cfg.block_exists("ubu1").unwrap());
        assert!(cfg.block_exists("ubu10").unwrap());
        assert!(content.contains("HostName 192.168.50.11"));
        assert!(content.contains("HostName 192.168.50.10"));
    }

    #[test]
    fn test_remove_never_touches_static_entries() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let static_entry = "Host ubu1\n    HostName 192.168.50.10\n    User steve\n";
        std::fs::write(cfg.path(), static_entry).unwrap();

        // No dynamic markers: nothing to remove
        assert!(!cfg.remove("ubu1").unwrap());
        let content = std::fs::read_to_string(cfg.path()).unwrap();
        assert!(content.contains("Host ubu1"));
    }

    #[test]
    fn test_block_exists_matches_static_host_directive() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        std::fs::write(
            cfg.path(),
            "Host myserver other\n    HostName server.local\n",
        )
        .unwrap();

        assert!(cfg.block_exists("myserver").unwrap());
        assert!(cfg.block_exists("other").unwrap());
        assert!(!cfg.block_exists("nonexistent").unwrap());
    }

    #[test]
    fn test_remove_collapses_blank_lines() {
        let content = "Host a\n    HostName a.local\n\n\n# mesh-managed: b\nHost b\n    HostName b.local\n# end mesh-managed: b\n\n\nHost c\n    HostName c.local\n";
        let result = remove_block(content, "b");
        assert!(!result.contains("\n\n\n"));
        assert!(result.contains("Host a"));
        assert!(result.contains("Host c"));
        assert!(!result.contains("Host b"));
        assert!(!result.starts_with('\n'));
    }

    #[test]
    fn test_remove_block_from_empty_yields_empty() {
        assert_eq!(remove_block("", "x"), "");
        let only_block = "# mesh-managed: x\nHost x\n    HostName 1.2.3.4\n# end mesh-managed: x\n";
        assert_eq!(remove_block(only_block, "x"), "");
    }
}
