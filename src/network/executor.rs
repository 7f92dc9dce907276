// file: src/network/executor.rs
// version: 1.1.0
// guid: e1f3a5b7-2c4d-4e6f-b8a0-1c3d5e7f9a1b

//! Remote execution trait, the seam between the provisioning state machine
//! and the SSH transport

use crate::network::{CommandOutput, SshRunner, SshTarget};
use std::time::Duration;

/// Trait for executing commands on remote hosts
#[async_trait::async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Execute a command, bounded by a timeout
    async fn run(&self, target: &SshTarget, command: &str, timeout: Duration) -> CommandOutput;

    /// Execute a command with content piped to its stdin
    async fn run_with_stdin(
        &self,
        target: &SshTarget,
        command: &str,
        input: &str,
        timeout: Duration,
    ) -> CommandOutput;
}

#[async_trait::async_trait]
impl RemoteRunner for SshRunner {
    async fn run(&self, target: &SshTarget, command: &str, timeout: Duration) -> CommandOutput {
        SshRunner::run(self, target, command, timeout).await
    }

    async fn run_with_stdin(
        &self,
        target: &SshTarget,
        command: &str,
        input: &str,
        timeout: Duration,
    ) -> CommandOutput {
        SshRunner::run_with_stdin(self, target, command, input, timeout).await
    }
}
