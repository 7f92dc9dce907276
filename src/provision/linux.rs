// file: src/provision/linux.rs
// version: 1.2.0
// guid: c7d9e1f3-6a8b-4c0d-92e4-f6a8b0c2d4e6

//! Linux provisioning branch: idempotent Tailscale install and mesh join

use crate::network::{RemoteRunner, SshTarget};
use crate::provision::{BranchOutcome, StepRecord};
use std::time::Duration;
use tracing::{info, warn};

const CHECK_TIMEOUT: Duration = Duration::from_secs(120);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(180);
const JOIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Drive a Linux host into the mesh.
///
/// Install is skipped when the binary is already on PATH; a failed join is
/// re-checked against `tailscale status` so a host already connected to the
/// same server counts as success.
pub(crate) async fn provision(
    runner: &dyn RemoteRunner,
    target: &SshTarget,
    server_url: &str,
    auth_key: &str,
    steps: &mut Vec<StepRecord>,
) -> BranchOutcome {
    info!("Installing Tailscale on Linux...");

    let check = runner.run(target, "which tailscale", CHECK_TIMEOUT).await;
    if check.success {
        info!("✓ Tailscale already installed");
        steps.push(StepRecord::ok("install", "already installed"));
    } else {
        info!("Downloading and running Tailscale installer...");
        let install = runner
            .run(
                target,
                "curl -fsSL https://tailscale.com/install.sh | sudo sh",
                INSTALL_TIMEOUT,
            )
            .await;
        if !install.success {
            let lower = install.output.to_lowercase();
            let reason = if lower.contains("password") || lower.contains("terminal") {
                format!(
                    "sudo requires password - run 'meshctl remote prepare {}' first",
                    target.host
                )
            } else {
                format!("Failed to install Tailscale: {}", install.output.trim())
            };
            steps.push(StepRecord::failed("install", &reason));
            return BranchOutcome::Failed { reason };
        }
        info!("✓ Tailscale installed");
        steps.push(StepRecord::ok("install", "installed via official script"));
    }

    info!("Connecting to mesh network...");
    let up_cmd = format!(
        "sudo tailscale up --login-server={} --authkey={} --accept-routes --accept-dns=false",
        server_url, auth_key
    );
    let up = runner.run(target, &up_cmd, JOIN_TIMEOUT).await;
    if !up.success {
        // The join may have failed only because the host is already a
        // member; check status against the expected server host.
        let status = runner.run(target, "tailscale status", CHECK_TIMEOUT).await;
        let server = crate::headscale::server_host(server_url).unwrap_or_default();
        if status.success && !server.is_empty() && status.output.contains(&server) {
            info!("✓ Already connected to mesh");
            steps.push(StepRecord::ok("join", "already connected"));
        } else {
            let reason = format!("Failed to connect: {}", up.output.trim());
            steps.push(StepRecord::failed("join", &reason));
            return BranchOutcome::Failed { reason };
        }
    } else {
        info!("✓ Connected to mesh network");
        steps.push(StepRecord::ok("join", "joined mesh"));
    }

    let ip = runner.run(target, "tailscale ip -4", CHECK_TIMEOUT).await;
    let overlay_ip = if ip.success {
        let addr = ip.output.trim().lines().next().unwrap_or("").to_string();
        if addr.is_empty() {
            None
        } else {
            info!("Tailscale IP: {}", addr);
            Some(addr)
        }
    } else {
        warn!("Could not query assigned overlay address");
        None
    };
    steps.push(StepRecord::ok(
        "verify",
        overlay_ip.as_deref().unwrap_or("no address reported"),
    ));

    BranchOutcome::Completed { overlay_ip }
}

/// Install Syncthing via apt. Advisory: a failure is logged but never fatal
/// to the provisioning run.
pub(crate) async fn install_syncthing(
    runner: &dyn RemoteRunner,
    target: &SshTarget,
    steps: &mut Vec<StepRecord>,
) {
    info!("Installing Syncthing...");
    let check = runner.run(target, "which syncthing", CHECK_TIMEOUT).await;
    if check.success {
        info!("✓ Syncthing already installed");
        steps.push(StepRecord::ok("syncthing", "already installed"));
        return;
    }

    let install = runner
        .run(
            target,
            "sudo apt-get update && sudo apt-get install -y syncthing",
            INSTALL_TIMEOUT,
        )
        .await;
    if install.success {
        info!("✓ Syncthing installed");
        steps.push(StepRecord::ok("syncthing", "installed via apt"));
    } else {
        warn!("Could not install Syncthing: {}", install.output.trim());
        steps.push(StepRecord::advisory(
            "syncthing",
            &format!("install failed: {}", install.output.trim()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::testing::MockRunner;

    fn target() -> SshTarget {
        SshTarget::new("ubuntu@192.168.50.10", 22)
    }

    #[tokio::test]
    async fn test_skips_install_when_binary_present() {
        let runner = MockRunner::new()
            .respond("which tailscale", true, "/usr/bin/tailscale")
            .respond("tailscale up", true, "")
            .respond("tailscale ip -4", true, "100.64.0.7\n");
        let mut steps = Vec::new();

        let outcome = provision(&runner, &target(), "http://10.0.0.1:8080", "key", &mut steps).await;
        assert!(matches!(
            outcome,
            BranchOutcome::Completed { overlay_ip: Some(ref ip) } if ip == "100.64.0.7"
        ));
        assert!(!runner
            .commands()
            .iter()
            .any(|c| c.contains("install.sh")));
    }

    #[tokio::test]
    async fn test_install_failure_with_sudo_hint() {
        let runner = MockRunner::new()
            .respond("which tailscale", false, "")
            .respond("install.sh", false, "sudo: a password is required");
        let mut steps = Vec::new();

        let outcome = provision(&runner, &target(), "http://10.0.0.1:8080", "key", &mut steps).await;
        match outcome {
            BranchOutcome::Failed { reason } => {
                assert!(reason.contains("meshctl remote prepare"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_join_recovers_when_already_connected() {
        let runner = MockRunner::new()
            .respond("which tailscale", true, "/usr/bin/tailscale")
            .respond("tailscale up", false, "backend already running")
            .respond("tailscale status", true, "100.64.0.7 host 10.0.0.1:8080")
            .respond("tailscale ip -4", true, "100.64.0.7");
        let mut steps = Vec::new();

        let outcome = provision(&runner, &target(), "http://10.0.0.1:8080", "key", &mut steps).await;
        assert!(matches!(outcome, BranchOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_failed_join_without_membership_is_fatal() {
        let runner = MockRunner::new()
            .respond("which tailscale", true, "/usr/bin/tailscale")
            .respond("tailscale up", false, "connection refused")
            .respond("tailscale status", false, "Logged out");
        let mut steps = Vec::new();

        let outcome = provision(&runner, &target(), "http://10.0.0.1:8080", "key", &mut steps).await;
        match outcome {
            BranchOutcome::Failed { reason } => assert!(reason.contains("connection refused")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_syncthing_failure_is_advisory() {
        let runner = MockRunner::new()
            .respond("which syncthing", false, "")
            .respond("apt-get", false, "E: Unable to locate package");
        let mut steps = Vec::new();

        install_syncthing(&runner, &target(), &mut steps).await;
        let record = steps.last().unwrap();
        assert_eq!(record.step, "syncthing");
        assert!(record.advisory);
    }
}
