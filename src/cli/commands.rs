// file: src/cli/commands.rs
// version: 1.4.0
// guid: a3b5c7d9-4e6f-4081-92b3-d5e7f9a1b3c5

//! Command implementations for the CLI

use crate::{
    config::{self, Environment},
    headscale::{Coordinator, HeadscaleCli},
    network::{SshRunner, SshTarget},
    provision::{
        detect_os, resolve_target, OsFamily, ProvisionOptions, ProvisionOutcome, Provisioner,
        SessionReport,
    },
    registry::HostRegistry,
    sshconf::SshConfig,
    MeshError, Result,
};
use colored::Colorize;
use std::process::Stdio;
use std::time::Duration;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the Headscale server URL: explicit flag wins and is persisted,
/// then the saved URL, then the local machine's address.
fn resolve_server_url(flag: Option<String>) -> Result<String> {
    if let Some(url) = flag {
        config::save_server(&url)?;
        return Ok(url);
    }
    if let Some(saved) = config::load_saved_server()? {
        return Ok(saved);
    }
    Ok(crate::headscale::default_server_url())
}

fn open_registry() -> Result<HostRegistry> {
    let env = Environment::capture();
    HostRegistry::open(&env.default_user)
}

/// Render the local environment snapshot as display lines
fn local_status_lines(env: &Environment) -> Vec<String> {
    vec![
        format!("  Hostname:       {}", env.hostname),
        format!("  OS:             {}", env.os_type.as_str()),
        format!("  Role:           {}", env.role.as_str()),
        format!("  Default user:   {}", env.default_user),
        format!(
            "  Syncthing GUI:  http://127.0.0.1:{}",
            config::syncthing_gui_port(env.role)
        ),
        format!(
            "  Syncthing sync: port {}",
            config::syncthing_sync_port(env.role)
        ),
    ]
}

/// Show the local machine's environment, role, and mesh services
pub async fn status_command() -> Result<()> {
    let env = Environment::capture();
    println!("{}", "Local machine".bold());
    for line in local_status_lines(&env) {
        println!("{}", line);
    }

    println!("{}", "Headscale".bold());
    if HeadscaleCli::is_installed() {
        let server_url = match config::load_saved_server()? {
            Some(url) => url,
            None => crate::headscale::default_server_url(),
        };
        println!("  Server:         {}", server_url);
        let coordinator = HeadscaleCli::new();
        if coordinator.health(&server_url).await {
            println!("  Health:         {}", "ok".green());
        } else {
            println!("  Health:         {}", "unreachable".red());
        }
    } else {
        println!("  Binary:         {}", "not installed".yellow());
    }
    Ok(())
}

/// Register a host and add the matching managed SSH config block
pub async fn host_add_command(
    name: &str,
    ip: &str,
    port: u16,
    user: Option<String>,
    no_ssh: bool,
) -> Result<()> {
    let env = Environment::capture();
    let user = user.unwrap_or_else(|| env.default_user.clone());

    let registry = open_registry()?;
    let entry = registry.upsert(name, ip, port, &user)?;
    info!("✓ Registered host '{}' -> {}@{}:{}", name, user, ip, port);

    if no_ssh {
        return Ok(());
    }

    let ssh = SshConfig::open()?;
    if ssh.block_exists(name)? {
        warn!("⚠ SSH config already has an entry for '{}', replacing managed block", name);
    }
    ssh.upsert(name, &entry.address, entry.port, &entry.user)?;
    info!("✓ SSH config block written, 'ssh {}' now works", name);
    Ok(())
}

/// Remove a host from the registry and drop its managed SSH block
pub async fn host_remove_command(name: &str, keep_ssh: bool) -> Result<()> {
    let registry = open_registry()?;
    if !registry.remove(name)? {
        return Err(MeshError::HostNotFound(name.to_string()));
    }
    info!("✓ Removed '{}' from the registry", name);

    if !keep_ssh {
        let ssh = SshConfig::open()?;
        if ssh.remove(name)? {
            info!("✓ Removed SSH config block for '{}'", name);
        }
    }
    Ok(())
}

/// List registered hosts with SSH-config and mesh-membership state
pub async fn host_list_command() -> Result<()> {
    let registry = open_registry()?;
    let hosts = registry.list()?;
    if hosts.is_empty() {
        println!("No hosts registered. Add one with: meshctl host add <name> --ip <addr>");
        return Ok(());
    }

    let ssh = SshConfig::open()?;
    let coordinator = HeadscaleCli::new();
    let members = coordinator.list_members("mesh").await.unwrap_or_default();

    println!(
        "{:<16} {:<22} {:>5}  {:<10} {}",
        "NAME", "ADDRESS", "PORT", "SSH", "MESH"
    );
    for (name, entry) in &hosts {
        let ssh_state = if ssh.block_exists(name).unwrap_or(false) {
            "configured".green()
        } else {
            "missing".yellow()
        };
        let member = members
            .iter()
            .find(|m| m.display_name.eq_ignore_ascii_case(name));
        let mesh_state = match member {
            Some(m) if m.online => "online".green(),
            Some(_) => "registered".normal(),
            None => "not joined".yellow(),
        };
        println!(
            "{:<16} {:<22} {:>5}  {:<10} {}",
            name,
            format!("{}@{}", entry.user, entry.address),
            entry.port,
            ssh_state,
            mesh_state
        );
    }
    Ok(())
}

/// Detailed state for one registered host
pub async fn host_status_command(name: &str) -> Result<()> {
    let registry = open_registry()?;
    let entry = registry
        .get(name)?
        .ok_or_else(|| MeshError::HostNotFound(name.to_string()))?;

    println!("{}", format!("Host: {}", name).bold());
    println!("  Address:  {}@{}:{}", entry.user, entry.address, entry.port);

    let ssh = SshConfig::open()?;
    if ssh.block_exists(name)? {
        println!("  SSH:      {}", "config block present".green());
    } else {
        println!("  SSH:      {}", "no config block".yellow());
    }

    let runner = SshRunner::new();
    let target = SshTarget::new(entry.ssh_target(), entry.port);
    let out = runner.run(&target, "echo connected", PROBE_TIMEOUT).await;
    if out.success {
        println!("  Reach:    {}", "connected".green());
    } else {
        println!("  Reach:    {} ({})", "unreachable".red(), out.output.trim());
    }

    let coordinator = HeadscaleCli::new();
    match coordinator.list_members("mesh").await {
        Ok(members) => {
            match members
                .iter()
                .find(|m| m.display_name.eq_ignore_ascii_case(name))
            {
                Some(m) => {
                    let state = if m.online { "online".green() } else { "offline".yellow() };
                    println!("  Mesh:     {} ({})", state, m.addresses.join(", "));
                }
                None => println!("  Mesh:     {}", "not joined".yellow()),
            }
        }
        Err(e) => println!("  Mesh:     {} ({})", "unknown".yellow(), e),
    }
    Ok(())
}

fn print_report(report: &SessionReport) {
    let status = match &report.outcome {
        ProvisionOutcome::AlreadyProvisioned => report.outcome.status_word().normal(),
        ProvisionOutcome::Joined { .. } => report.outcome.status_word().green(),
        ProvisionOutcome::ManualStepPending { .. } => report.outcome.status_word().yellow(),
        ProvisionOutcome::Failed { .. } => report.outcome.status_word().red(),
    };
    let os = report.os.map(|os| os.as_str()).unwrap_or("-");
    println!("{:<16} {:<8} {}", report.label, os, status);
    if let ProvisionOutcome::Failed { reason } = &report.outcome {
        println!("    {}", reason.red());
    }
    if let ProvisionOutcome::ManualStepPending { script_path, .. } = &report.outcome {
        println!("    run on the host: powershell -ExecutionPolicy Bypass -File {}", script_path);
    }
}

/// Provision one host into the mesh
pub async fn remote_provision_command(
    host: &str,
    port: u16,
    server: Option<String>,
    namespace: &str,
    skip_syncthing: bool,
    force: bool,
) -> Result<()> {
    let server_url = resolve_server_url(server)?;
    info!("Using Headscale server: {}", server_url);

    let registry = open_registry()?;
    let target = resolve_target(host, port, &registry)?;

    let runner = SshRunner::new();
    let coordinator = HeadscaleCli::new();
    coordinator.create_user(namespace).await?;

    let opts = ProvisionOptions {
        server_url,
        namespace: namespace.to_string(),
        skip_syncthing,
        force,
    };
    let provisioner = Provisioner::new(&runner, &coordinator);
    let report = provisioner.provision(&target, &opts).await;
    print_report(&report);

    match report.outcome {
        ProvisionOutcome::Failed { reason } => Err(MeshError::provision(reason)),
        _ => Ok(()),
    }
}

/// Provision every registered host, isolating per-host failures
pub async fn remote_provision_all_command(
    server: Option<String>,
    namespace: &str,
    skip_syncthing: bool,
    force: bool,
) -> Result<()> {
    let server_url = resolve_server_url(server)?;
    info!("Using Headscale server: {}", server_url);

    let registry = open_registry()?;
    let entries: Vec<_> = registry.list()?.into_values().collect();
    if entries.is_empty() {
        println!("No hosts registered. Add one with: meshctl host add <name> --ip <addr>");
        return Ok(());
    }

    let runner = SshRunner::new();
    let coordinator = HeadscaleCli::new();
    coordinator.create_user(namespace).await?;

    let opts = ProvisionOptions {
        server_url,
        namespace: namespace.to_string(),
        skip_syncthing,
        force,
    };
    let provisioner = Provisioner::new(&runner, &coordinator);
    let reports = provisioner.provision_all(&entries, &opts).await;

    println!("\n{}", "Summary".bold());
    for report in &reports {
        print_report(report);
    }

    let failed = reports
        .iter()
        .filter(|r| r.outcome.is_hard_failure())
        .count();
    if failed > 0 {
        return Err(MeshError::provision(format!(
            "{} of {} hosts failed",
            failed,
            reports.len()
        )));
    }
    Ok(())
}

/// Inspect a remote host without changing anything
pub async fn remote_status_command(host: &str, port: u16) -> Result<()> {
    let registry = open_registry()?;
    let target = resolve_target(host, port, &registry)?;
    let runner = SshRunner::new();

    println!("{}", format!("Remote: {}", target.ssh).bold());
    let out = runner.run(&target.ssh, "echo connected", PROBE_TIMEOUT).await;
    if !out.success {
        println!("  Reach:     {} ({})", "unreachable".red(), out.output.trim());
        return Err(MeshError::ssh(format!("cannot connect to {}", target.ssh)));
    }
    println!("  Reach:     {}", "connected".green());

    let os = detect_os(&runner, &target.ssh).await;
    println!("  OS:        {}", os);

    match os {
        OsFamily::Linux | OsFamily::Macos => {
            let status = runner.run(&target.ssh, "tailscale status", PROBE_TIMEOUT).await;
            if status.success {
                println!("  Tailscale: {}", "connected".green());
                if let Some(first) = status.output.lines().next() {
                    println!("             {}", first.trim());
                }
            } else {
                println!("  Tailscale: {}", "not connected".yellow());
            }
            let syncthing = runner.run(&target.ssh, "which syncthing", PROBE_TIMEOUT).await;
            let state = if syncthing.success { "installed".green() } else { "not installed".yellow() };
            println!("  Syncthing: {}", state);
        }
        OsFamily::Windows => {
            let check = runner
                .run(
                    &target.ssh,
                    "powershell -Command \"Test-Path 'C:\\Program Files\\Tailscale\\tailscale.exe'\"",
                    PROBE_TIMEOUT,
                )
                .await;
            let state = if check.success && check.output.contains("True") {
                "installed".green()
            } else {
                "not installed".yellow()
            };
            println!("  Tailscale: {}", state);

            let conflicts = crate::provision::windows::vpn_conflicts(&runner, &target.ssh).await;
            if conflicts.is_empty() {
                println!("  VPN:       {}", "no conflicts".green());
            } else {
                println!("  VPN:       {}", conflicts.join(", ").yellow());
            }
        }
        OsFamily::Unknown => {
            return Err(MeshError::Detection(target.ssh.to_string()));
        }
    }
    Ok(())
}

/// One-time interactive sudoers setup so later provisioning runs need no
/// password. Allocates a TTY so sudo can prompt.
pub async fn remote_prepare_command(host: &str, port: u16) -> Result<()> {
    let registry = open_registry()?;
    let target = resolve_target(host, port, &registry)?;

    info!("Setting up passwordless sudo on {} (you will be prompted once)", target.ssh);
    let remote_cmd = "echo \"$USER ALL=(ALL) NOPASSWD:ALL\" | sudo tee /etc/sudoers.d/99-mesh-provision >/dev/null \
                      && sudo chmod 0440 /etc/sudoers.d/99-mesh-provision";

    let status = tokio::process::Command::new("ssh")
        .arg("-t")
        .arg("-o")
        .arg("StrictHostKeyChecking=accept-new")
        .arg("-p")
        .arg(target.ssh.port.to_string())
        .arg(&target.ssh.host)
        .arg(remote_cmd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(MeshError::ssh(format!(
            "sudoers setup failed on {}",
            target.ssh
        )));
    }
    info!("✓ Passwordless sudo configured, provisioning will not prompt again");
    Ok(())
}
