// file: src/provision/windows.rs
// version: 1.3.0
// guid: d6e8f0a2-7b9c-4d1e-a3f5-b7c9d1e3f5a7

//! Windows provisioning branch
//!
//! Session 0 isolation keeps the SSH session from reaching the Tailscale
//! IPN backend; running `tailscale up` over SSH actually disconnects the
//! service. The automated part therefore stops at installing the client,
//! writing registry configuration, and placing a join script on the target
//! for the operator to run interactively.

use crate::network::{RemoteRunner, SshTarget};
use crate::provision::script::{JoinScript, LOG_PATH, SCRIPT_PATH, TAILSCALE_EXE};
use crate::provision::{BranchOutcome, StepRecord};
use std::time::Duration;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIG_TIMEOUT: Duration = Duration::from_secs(15);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(180);
const TRANSMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Detect VPN software known to conflict with Tailscale on Windows
pub(crate) async fn vpn_conflicts(runner: &dyn RemoteRunner, target: &SshTarget) -> Vec<String> {
    let mut conflicts = Vec::new();

    // NordVPN runs WireGuard on the same port Tailscale wants (41641)
    let out = runner
        .run(
            target,
            "powershell -Command \"Get-Service NordVPN* 2>$null | Select-Object -ExpandProperty Status\"",
            PROBE_TIMEOUT,
        )
        .await;
    if out.success && out.output.contains("Running") {
        conflicts.push("NordVPN".to_string());
    }

    let out = runner
        .run(
            target,
            "powershell -Command \"Get-NetAdapter -Name NordLynx 2>$null | Select-Object -ExpandProperty Status\"",
            PROBE_TIMEOUT,
        )
        .await;
    if out.success && out.output.contains("Up") {
        conflicts.push("NordLynx (NordVPN WireGuard)".to_string());
    }

    let services = [
        ("ExpressVPN", "ExpressVPN*"),
        ("Surfshark", "Surfshark*"),
        ("CyberGhost", "CyberGhost*"),
        ("Private Internet Access", "pia*"),
    ];
    for (name, pattern) in services {
        let cmd = format!(
            "powershell -Command \"Get-Service {} 2>$null | Where-Object Status -eq Running\"",
            pattern
        );
        let out = runner.run(target, &cmd, PROBE_TIMEOUT).await;
        if out.success && !out.output.trim().is_empty() {
            conflicts.push(name.to_string());
        }
    }

    conflicts
}

/// Check whether the VPN is blocking LAN access to the coordination server.
///
/// A direct curl to the health endpoint through the remote shell is the
/// definitive test; returns true when there is a routing problem.
pub(crate) async fn vpn_blocks_lan(
    runner: &dyn RemoteRunner,
    target: &SshTarget,
    server_host: &str,
) -> bool {
    let cmd = format!(
        "powershell -Command \"curl.exe -s -o NUL -w '%{{http_code}}' -m 5 http://{}:{}/health\"",
        server_host,
        crate::config::HEADSCALE_PORT
    );
    let out = runner.run(target, &cmd, PROBE_TIMEOUT).await;
    !out.success || !out.output.contains("200")
}

/// Drive the automated part of Windows provisioning and leave the join
/// script behind for the interactive step.
pub(crate) async fn provision(
    runner: &dyn RemoteRunner,
    target: &SshTarget,
    server_url: &str,
    auth_key: &str,
    steps: &mut Vec<StepRecord>,
) -> BranchOutcome {
    info!("Configuring Tailscale on Windows...");

    info!("Checking for VPN conflicts...");
    let conflicts = vpn_conflicts(runner, target).await;
    if !conflicts.is_empty() {
        warn!("Detected conflicting VPN(s): {}", conflicts.join(", "));
        warn!("These VPNs may block Tailscale port 41641 or interfere with WireGuard.");
        steps.push(StepRecord::advisory(
            "vpn-conflicts",
            &conflicts.join(", "),
        ));

        if let Some(server) = crate::headscale::server_host(server_url) {
            if vpn_blocks_lan(runner, target, &server).await {
                let reason = format!(
                    "VPN is blocking access to Headscale server: the Tailscale service cannot reach {}:{} via the VPN tunnel. \
                     Enable 'Allow LAN access' in the VPN settings, or temporarily disconnect the VPN.",
                    server,
                    crate::config::HEADSCALE_PORT
                );
                steps.push(StepRecord::failed("lan-probe", &reason));
                return BranchOutcome::Failed { reason };
            }
        }
        info!("Consider disconnecting them before joining the mesh network.");
    }

    // Idempotent install: probe for the executable first
    let check_cmd = format!("powershell -Command \"Test-Path '{}'\"", TAILSCALE_EXE);
    let check = runner.run(target, &check_cmd, PROBE_TIMEOUT).await;
    if !check.success || check.output.contains("False") {
        info!("Tailscale not found, attempting winget install...");
        let install_cmd = "powershell -Command \"winget install --id Tailscale.Tailscale \
                           --source winget --accept-source-agreements --accept-package-agreements --silent\"";
        let install = runner.run(target, install_cmd, INSTALL_TIMEOUT).await;
        if !install.success && !install.output.to_lowercase().contains("already installed") {
            let reason = format!(
                "Failed to install Tailscale via winget: {}. Install manually from https://tailscale.com/download/windows",
                install.output.trim()
            );
            steps.push(StepRecord::failed("install", &reason));
            return BranchOutcome::Failed { reason };
        }
        info!("✓ Tailscale installed via winget");
        steps.push(StepRecord::ok("install", "installed via winget"));
        // Fresh installs need a moment before the service responds
        info!("Waiting for Tailscale service to initialize...");
        runner
            .run(target, "powershell -Command \"Start-Sleep 5\"", CONFIG_TIMEOUT)
            .await;
    } else {
        info!("✓ Tailscale is installed");
        steps.push(StepRecord::ok("install", "already installed"));
    }

    // Persistent configuration so the service knows where to connect on the
    // next interactive login
    info!("Configuring Tailscale registry settings...");
    let registry_cmds = [
        r"$regPath = 'HKLM:\SOFTWARE\Tailscale IPN'".to_string(),
        "if (!(Test-Path $regPath)) { New-Item -Path $regPath -Force | Out-Null }".to_string(),
        format!(
            "Set-ItemProperty -Path $regPath -Name 'LoginURL' -Value '{}'",
            server_url
        ),
        format!(
            "Set-ItemProperty -Path $regPath -Name 'AuthKey' -Value '{}'",
            auth_key
        ),
        "Set-ItemProperty -Path $regPath -Name 'UnattendedMode' -Value 'always'".to_string(),
    ];
    let reg_cmd = format!("powershell -Command \"{}\"", registry_cmds.join("; "));
    let reg = runner.run(target, &reg_cmd, CONFIG_TIMEOUT).await;
    if reg.success {
        info!("✓ Registry configured for mesh connection");
        steps.push(StepRecord::ok("registry", "LoginURL and UnattendedMode set"));
    } else {
        warn!("Registry configuration may have issues: {}", reg.output.trim());
        steps.push(StepRecord::advisory("registry", reg.output.trim()));
    }

    info!("Creating connection script for manual execution...");
    let script = JoinScript::new(server_url, auth_key, &conflicts);

    runner
        .run(
            target,
            "powershell -Command \"New-Item -Path 'C:\\temp' -ItemType Directory -Force | Out-Null\"",
            CONFIG_TIMEOUT,
        )
        .await;

    let write_cmd = format!(
        "powershell -Command \"$input | Set-Content -Path '{}'\"",
        SCRIPT_PATH
    );
    let transmit = runner
        .run_with_stdin(target, &write_cmd, &script.render(), TRANSMIT_TIMEOUT)
        .await;

    if transmit.success {
        info!("✓ Script created on Windows");
        info!("MANUAL STEP REQUIRED - Run in PowerShell on Windows:");
        info!("  powershell -ExecutionPolicy Bypass -File {}", SCRIPT_PATH);
        info!("Or right-click the file and select 'Run with PowerShell'");
        info!("Log will be saved to: {}", LOG_PATH);
        if !conflicts.is_empty() {
            warn!("VPN conflict detected: {}", conflicts.join(", "));
            info!("The script may fail if the VPN is using WireGuard port 41641.");
        }
        steps.push(StepRecord::ok("script", SCRIPT_PATH));
    } else {
        // Script transmission failed; fall back to printing the raw command
        warn!("Could not create script on Windows");
        info!("MANUAL STEP: Run in PowerShell on Windows:");
        info!(
            "  & \"{}\" up --login-server={} --authkey=<key shown once above> --accept-routes --unattended",
            TAILSCALE_EXE, server_url
        );
        steps.push(StepRecord::advisory("script", "transmission failed, manual command printed"));
    }

    info!("Why: Windows Session 0 isolation prevents SSH from reaching the Tailscale service.");
    info!("After running the script, re-run 'meshctl remote status' to verify.");

    BranchOutcome::ManualStep {
        script_path: SCRIPT_PATH.to_string(),
        log_path: LOG_PATH.to_string(),
    }
}
