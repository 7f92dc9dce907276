// file: src/headscale/mod.rs
// version: 1.4.0
// guid: f0a2b4c6-3d5e-4f70-a1b3-c5d7e9f1a3b5

//! Headscale coordination-server client
//!
//! Talks to the locally running Headscale instance through its CLI (with
//! sudo, JSON output) and to its health endpoint over HTTP. The
//! `Coordinator` trait is the seam the provisioning state machine depends
//! on, so tests can substitute a canned server view.

use crate::Result;
use regex::Regex;
use serde::Deserialize;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, warn};

/// One registered mesh member as reported by the coordination server
#[derive(Debug, Clone)]
pub struct Member {
    /// Display name (Headscale "given name")
    pub display_name: String,
    pub online: bool,
    /// Assigned overlay addresses
    pub addresses: Vec<String>,
}

/// Coordination-server operations the provisioner depends on
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    /// Probe the server health endpoint. Advisory: callers treat a failure
    /// as a warning, not a precondition.
    async fn health(&self, server_url: &str) -> bool;

    /// Create a namespace user. Idempotent: succeeds when the user already
    /// exists.
    async fn create_user(&self, name: &str) -> Result<bool>;

    /// List members registered under a namespace
    async fn list_members(&self, namespace: &str) -> Result<Vec<Member>>;

    /// Issue a pre-auth join credential for a namespace
    async fn issue_preauth_key(
        &self,
        namespace: &str,
        reusable: bool,
        ephemeral: bool,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    #[serde(rename = "givenName", default)]
    given_name: String,
    #[serde(default)]
    online: bool,
    #[serde(rename = "ipAddresses", default)]
    ip_addresses: Vec<String>,
}

/// Result of one local command invocation
struct LocalOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Headscale client backed by the `headscale` CLI
#[derive(Debug, Default)]
pub struct HeadscaleCli {
    http: reqwest::Client,
}

impl HeadscaleCli {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Check whether the headscale binary is available locally
    pub fn is_installed() -> bool {
        which::which("headscale").is_ok()
    }

    async fn run_sudo(&self, args: &[&str]) -> LocalOutput {
        let mut cmd = tokio::process::Command::new("sudo");
        cmd.arg("headscale").args(args);
        debug!("sudo headscale {}", args.join(" "));
        let future = cmd.output();
        match tokio::time::timeout(Duration::from_secs(15), future).await {
            Ok(Ok(output)) => LocalOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => LocalOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("Failed to run headscale: {}", e),
            },
            Err(_) => LocalOutput {
                success: false,
                stdout: String::new(),
                stderr: "headscale command timed out".to_string(),
            },
        }
    }

    /// Resolve a user name to its numeric id. Headscale 0.27+ addresses
    /// users by id, not name.
    async fn user_id(&self, name: &str) -> Option<String> {
        let out = self
            .run_sudo(&["users", "list", "--output", "json"])
            .await;
        if !out.success {
            return None;
        }
        let users: Vec<serde_json::Value> = serde_json::from_str(&out.stdout).ok()?;
        for user in users {
            let matches = user.get("name").and_then(|v| v.as_str()) == Some(name)
                || user.get("username").and_then(|v| v.as_str()) == Some(name);
            if matches {
                return match user.get("id") {
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl Coordinator for HeadscaleCli {
    async fn health(&self, server_url: &str) -> bool {
        let url = format!("{}/health", server_url.trim_end_matches('/'));
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Health probe failed for {}: {}", url, e);
                false
            }
        }
    }

    async fn create_user(&self, name: &str) -> Result<bool> {
        let out = self.run_sudo(&["users", "create", name]).await;
        Ok(out.success || out.stderr.to_lowercase().contains("already exists"))
    }

    async fn list_members(&self, namespace: &str) -> Result<Vec<Member>> {
        let user_id = self.user_id(namespace).await;
        let mut args = vec!["nodes", "list", "--output", "json"];
        if let Some(id) = user_id.as_deref() {
            args.extend(["--user", id]);
        }
        let out = self.run_sudo(&args).await;
        if !out.success {
            return Err(crate::error::MeshError::config(format!(
                "headscale nodes list failed: {}",
                out.stderr.trim()
            )));
        }
        parse_members(&out.stdout)
    }

    async fn issue_preauth_key(
        &self,
        namespace: &str,
        reusable: bool,
        ephemeral: bool,
    ) -> Result<Option<String>> {
        let Some(user_id) = self.user_id(namespace).await else {
            warn!("Headscale user '{}' not found", namespace);
            return Ok(None);
        };
        let mut args = vec![
            "preauthkeys",
            "create",
            "--user",
            user_id.as_str(),
            "--output",
            "json",
        ];
        if reusable {
            args.push("--reusable");
        }
        if ephemeral {
            args.push("--ephemeral");
        }
        let out = self.run_sudo(&args).await;
        if !out.success {
            return Err(crate::error::MeshError::credential(format!(
                "preauth key creation failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(extract_preauth_key(&out.stdout))
    }
}

/// Parse the JSON node list from the headscale CLI into members
fn parse_members(stdout: &str) -> crate::Result<Vec<Member>> {
    let nodes: Vec<NodeRecord> = serde_json::from_str(stdout)?;
    Ok(nodes
        .into_iter()
        .map(|n| Member {
            display_name: n.given_name,
            online: n.online,
            addresses: n.ip_addresses,
        })
        .collect())
}

/// Extract a pre-auth key from headscale CLI output.
///
/// Headscale can pollute stdout with warnings (juanfont/headscale#1797), so
/// parsing degrades gracefully: full JSON, then the outermost-brace JSON
/// slice, then a bare hex line.
pub fn extract_preauth_key(output: &str) -> Option<String> {
    let output = output.trim();

    if let Ok(data) = serde_json::from_str::<serde_json::Value>(output) {
        if let Some(key) = data.get("key").and_then(|k| k.as_str()) {
            return Some(key.to_string());
        }
    }

    if let (Some(start), Some(end)) = (output.find('{'), output.rfind('}')) {
        if start < end {
            if let Ok(data) = serde_json::from_str::<serde_json::Value>(&output[start..=end]) {
                if let Some(key) = data.get("key").and_then(|k| k.as_str()) {
                    return Some(key.to_string());
                }
            }
        }
    }

    let hex_line = Regex::new(r"^[a-f0-9]{48,}$").expect("static pattern");
    for line in output.lines() {
        let line = line.trim();
        if hex_line.is_match(line) {
            return Some(line.to_string());
        }
    }
    None
}

/// Get the local machine's IP address that is routable to other hosts.
///
/// Connects a UDP socket toward a public address (no packet is sent) and
/// reads back the chosen source address. Falls back to loopback.
pub fn local_ip() -> String {
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Default Headscale server URL built from the local routable IP
pub fn default_server_url() -> String {
    format!("http://{}:{}", local_ip(), crate::config::HEADSCALE_PORT)
}

/// Extract the bare host from a server URL (for LAN reachability probes)
pub fn server_host(server_url: &str) -> Option<String> {
    let pattern = Regex::new(r"://([^:/]+)").expect("static pattern");
    pattern
        .captures(server_url)
        .map(|c| c[1].to_string())
}
