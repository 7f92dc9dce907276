// file: src/provision/mod.rs
// version: 1.5.0
// guid: e5f7a9b1-8c0d-4e2f-b4a6-c8d0e2f4a6b8

//! Provisioning state machine
//!
//! Drives one remote host from unknown state to mesh membership through a
//! fixed linear sequence: idempotency check, connectivity, OS detection,
//! credential issuance, OS-specific configure, verify. Partial prior state
//! (already installed, already joined) is tolerated without side effects;
//! the Windows branch ends in a distinct manual-step-pending outcome rather
//! than a failure.

pub mod detect;
pub mod linux;
pub mod script;
pub mod windows;

pub use detect::{detect_os, OsFamily};

use crate::headscale::Coordinator;
use crate::network::{RemoteRunner, SshTarget};
use crate::registry::{HostEntry, HostRegistry};
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One provisioning target: the SSH destination plus the identity key used
/// for the idempotency check against the coordination server
#[derive(Debug, Clone)]
pub struct Target {
    /// Idempotency key: the registry alias when resolved from the registry,
    /// otherwise the hostname extracted from the raw input
    pub label: String,
    pub ssh: SshTarget,
}

/// Options for one provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Coordination-server URL embedded into join commands
    pub server_url: String,
    /// Headscale namespace (user) the credential is issued for
    pub namespace: String,
    pub skip_syncthing: bool,
    /// Bypass the already-provisioned shortcut (install checks stay idempotent)
    pub force: bool,
}

/// Outcome of one host's provisioning session
#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    /// Pre-check found the host already registered; nothing was executed
    AlreadyProvisioned,
    /// Host joined the mesh (Unix path)
    Joined { overlay_ip: Option<String> },
    /// Automated steps done; an interactive step remains (Windows path)
    ManualStepPending {
        script_path: String,
        log_path: String,
    },
    /// Terminal failure for this host
    Failed { reason: String },
}

impl ProvisionOutcome {
    /// Whether the outcome is a hard failure. Manual-step-pending counts as
    /// success for process exit purposes.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, ProvisionOutcome::Failed { .. })
    }

    /// Short status word for summaries
    pub fn status_word(&self) -> &'static str {
        match self {
            ProvisionOutcome::AlreadyProvisioned => "already provisioned",
            ProvisionOutcome::Joined { .. } => "provisioned",
            ProvisionOutcome::ManualStepPending { .. } => "manual step pending",
            ProvisionOutcome::Failed { .. } => "failed",
        }
    }
}

/// Internal result of an OS-specific configure branch
#[derive(Debug)]
pub(crate) enum BranchOutcome {
    Completed { overlay_ip: Option<String> },
    ManualStep { script_path: String, log_path: String },
    Failed { reason: String },
}

/// One recorded step of a provisioning session
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: &'static str,
    pub ok: bool,
    /// Non-fatal problem: logged, never propagated
    pub advisory: bool,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl StepRecord {
    pub fn ok(step: &'static str, detail: &str) -> Self {
        Self {
            step,
            ok: true,
            advisory: false,
            detail: detail.to_string(),
            at: Utc::now(),
        }
    }

    pub fn failed(step: &'static str, detail: &str) -> Self {
        Self {
            step,
            ok: false,
            advisory: false,
            detail: detail.to_string(),
            at: Utc::now(),
        }
    }

    pub fn advisory(step: &'static str, detail: &str) -> Self {
        Self {
            step,
            ok: false,
            advisory: true,
            detail: detail.to_string(),
            at: Utc::now(),
        }
    }
}

/// Full report of one host's session
#[derive(Debug)]
pub struct SessionReport {
    pub label: String,
    pub os: Option<OsFamily>,
    pub outcome: ProvisionOutcome,
    pub steps: Vec<StepRecord>,
}

impl SessionReport {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            os: None,
            outcome: ProvisionOutcome::Failed {
                reason: "not started".to_string(),
            },
            steps: Vec::new(),
        }
    }
}

/// Extract the idempotency key from a `user@host.domain` style input:
/// strip the user prefix and domain suffix, lowercase.
pub fn extract_hostname(host: &str) -> String {
    let host = host.rsplit('@').next().unwrap_or(host);
    host.split('.').next().unwrap_or(host).to_lowercase()
}

/// Resolve a CLI host argument to a provisioning target.
///
/// A bare alias found in the registry resolves to `user@ip` with the
/// registered port, keeping the alias as the idempotency key. Anything else
/// is used verbatim with the supplied port.
pub fn resolve_target(input: &str, port: u16, registry: &HostRegistry) -> Result<Target> {
    if !input.contains('@') {
        if let Some(entry) = registry.get(input)? {
            info!("Using registered host: {}:{}", entry.address, entry.port);
            return Ok(Target {
                label: input.to_string(),
                ssh: SshTarget::new(entry.ssh_target(), entry.port),
            });
        }
    }
    Ok(Target {
        label: extract_hostname(input),
        ssh: SshTarget::new(input, port),
    })
}

/// Build a target directly from a registry entry (batch mode)
pub fn target_from_entry(entry: &HostEntry) -> Target {
    Target {
        label: entry.name.clone(),
        ssh: SshTarget::new(entry.ssh_target(), entry.port),
    }
}

/// The provisioning state machine
pub struct Provisioner<'a> {
    runner: &'a dyn RemoteRunner,
    coordinator: &'a dyn Coordinator,
}

impl<'a> Provisioner<'a> {
    pub fn new(runner: &'a dyn RemoteRunner, coordinator: &'a dyn Coordinator) -> Self {
        Self {
            runner,
            coordinator,
        }
    }

    /// Case-insensitive membership check against the coordination server.
    /// Lookup errors count as "not provisioned" so a down server never
    /// blocks a forced re-run path.
    async fn already_provisioned(&self, label: &str, namespace: &str) -> bool {
        match self.coordinator.list_members(namespace).await {
            Ok(members) => members
                .iter()
                .any(|m| m.display_name.eq_ignore_ascii_case(label)),
            Err(_) => false,
        }
    }

    /// Run the full state machine for one target
    pub async fn provision(&self, target: &Target, opts: &ProvisionOptions) -> SessionReport {
        let mut report = SessionReport::new(&target.label);

        // Idempotency shortcut, keyed by the original alias
        if !opts.force && self.already_provisioned(&target.label, &opts.namespace).await {
            info!("✓ {} is already provisioned in the mesh", target.label);
            info!("Use --force to re-provision anyway");
            report
                .steps
                .push(StepRecord::ok("idempotency", "already in member list"));
            report.outcome = ProvisionOutcome::AlreadyProvisioned;
            return report;
        }

        // Connectivity: a trivial remote command within a bounded timeout
        info!("Testing SSH connectivity...");
        let out = self
            .runner
            .run(&target.ssh, "echo connected", CONNECT_TIMEOUT)
            .await;
        if !out.success {
            let reason = format!(
                "Cannot connect to {}: {}",
                target.ssh,
                out.output.trim()
            );
            report.steps.push(StepRecord::failed("connectivity", &reason));
            report.outcome = ProvisionOutcome::Failed { reason };
            return report;
        }
        info!("✓ SSH connection successful");
        report.steps.push(StepRecord::ok("connectivity", "connected"));

        // Server health is advisory, not a precondition
        if !self.coordinator.health(&opts.server_url).await {
            warn!(
                "Headscale health probe failed for {} (continuing)",
                opts.server_url
            );
            report
                .steps
                .push(StepRecord::advisory("health", "health endpoint unreachable"));
        }

        info!("Detecting remote OS...");
        let os = detect_os(self.runner, &target.ssh).await;
        report.os = Some(os);
        if os == OsFamily::Unknown {
            let reason = format!("Could not detect remote OS for {}", target.ssh);
            report.steps.push(StepRecord::failed("detect-os", &reason));
            report.outcome = ProvisionOutcome::Failed { reason };
            return report;
        }
        info!("✓ Detected OS: {}", os);
        report.steps.push(StepRecord::ok("detect-os", os.as_str()));

        info!("Generating Headscale auth key...");
        let auth_key = match self
            .coordinator
            .issue_preauth_key(&opts.namespace, true, false)
            .await
        {
            Ok(Some(key)) => key,
            Ok(None) | Err(_) => {
                let reason =
                    "Failed to generate auth key. Ensure Headscale is running: sudo systemctl status headscale"
                        .to_string();
                report.steps.push(StepRecord::failed("credential", &reason));
                report.outcome = ProvisionOutcome::Failed { reason };
                return report;
            }
        };
        info!("✓ Auth key generated");
        report.steps.push(StepRecord::ok("credential", "preauth key issued"));

        let branch = match os {
            OsFamily::Linux => {
                linux::provision(
                    self.runner,
                    &target.ssh,
                    &opts.server_url,
                    &auth_key,
                    &mut report.steps,
                )
                .await
            }
            OsFamily::Windows => {
                windows::provision(
                    self.runner,
                    &target.ssh,
                    &opts.server_url,
                    &auth_key,
                    &mut report.steps,
                )
                .await
            }
            OsFamily::Macos => BranchOutcome::Failed {
                reason: "Unsupported OS: macos".to_string(),
            },
            OsFamily::Unknown => unreachable!("unknown OS handled above"),
        };

        report.outcome = match branch {
            BranchOutcome::Completed { overlay_ip } => {
                if os == OsFamily::Linux && !opts.skip_syncthing {
                    linux::install_syncthing(self.runner, &target.ssh, &mut report.steps).await;
                }
                ProvisionOutcome::Joined { overlay_ip }
            }
            BranchOutcome::ManualStep {
                script_path,
                log_path,
            } => ProvisionOutcome::ManualStepPending {
                script_path,
                log_path,
            },
            BranchOutcome::Failed { reason } => ProvisionOutcome::Failed { reason },
        };
        report
    }

    /// Provision every registry host sequentially.
    ///
    /// Failures are isolated per host: the returned summary always has one
    /// report per entry, in registry order.
    pub async fn provision_all(
        &self,
        entries: &[HostEntry],
        opts: &ProvisionOptions,
    ) -> Vec<SessionReport> {
        let mut reports = Vec::with_capacity(entries.len());
        for entry in entries {
            let target = target_from_entry(entry);
            info!("--- {} ({}) ---", entry.name, target.ssh);
            let report = self.provision(&target, opts).await;
            reports.push(report);
        }
        reports
    }
}
