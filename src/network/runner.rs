// file: src/network/runner.rs
// version: 1.5.0
// guid: d2e4f6a8-1b3c-4d5e-a6f8-0a2b4c6d8e0f

//! SSH command runner for remote provisioning operations
//!
//! Shells out to the system `ssh` binary in batch mode. Authentication must
//! be non-interactive (agent or key); unknown host keys are accepted and
//! pinned on first connect so provisioning never blocks on a prompt.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// SSH options for non-interactive connections
const SSH_OPTS: [&str; 6] = [
    "-o",
    "BatchMode=yes",
    "-o",
    "ConnectTimeout=10",
    "-o",
    "StrictHostKeyChecking=accept-new",
];

/// One SSH-reachable target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// `user@address` or bare address
    pub host: String,
    /// SSH port
    pub port: u16,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of one remote command: success flag plus combined stdout+stderr
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

impl CommandOutput {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            output: reason.into(),
        }
    }
}

/// Runner that executes commands on remote hosts via the `ssh` binary
#[derive(Debug, Default, Clone)]
pub struct SshRunner;

impl SshRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, target: &SshTarget, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(SSH_OPTS)
            .arg("-p")
            .arg(target.port.to_string())
            .arg(&target.host)
            .arg(remote_cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Execute a command on the target, bounded by a timeout.
    ///
    /// Transport problems (timeout, missing ssh binary) are folded into a
    /// failed `CommandOutput` rather than surfaced as errors; every step in a
    /// provisioning session treats them as step failures.
    pub async fn run(
        &self,
        target: &SshTarget,
        remote_cmd: &str,
        timeout: Duration,
    ) -> CommandOutput {
        debug!("ssh {} -> {}", target, remote_cmd);
        let future = self.command(target, remote_cmd).output();
        match tokio::time::timeout(timeout, future).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutput {
                    success: output.status.success(),
                    output: combined,
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                CommandOutput::failed("SSH client not found")
            }
            Ok(Err(e)) => CommandOutput::failed(format!("Failed to run ssh: {}", e)),
            Err(_) => CommandOutput::failed("Command timed out"),
        }
    }

    /// Execute a command on the target, piping `input` to its stdin.
    ///
    /// Used to transmit generated script content, which avoids command-line
    /// length limits and shell quoting of the payload.
    pub async fn run_with_stdin(
        &self,
        target: &SshTarget,
        remote_cmd: &str,
        input: &str,
        timeout: Duration,
    ) -> CommandOutput {
        debug!("ssh {} (stdin {} bytes) -> {}", target, input.len(), remote_cmd);
        let mut cmd = self.command(target, remote_cmd);
        cmd.stdin(Stdio::piped());

        let payload = input.to_string();
        let future = async move {
            let mut child = cmd.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(timeout, future).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutput {
                    success: output.status.success(),
                    output: combined,
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                CommandOutput::failed("SSH client not found")
            }
            Ok(Err(e)) => CommandOutput::failed(format!("Failed to run ssh: {}", e)),
            Err(_) => CommandOutput::failed("Command timed out"),
        }
    }
}
