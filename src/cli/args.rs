// file: src/cli/args.rs
// version: 1.2.0
// guid: f2a4c6e8-3b5d-4f70-81a2-c4d6e8f0a2b4

//! Command line argument definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "meshctl")]
#[command(about = "Provision a private Headscale + Syncthing mesh over SSH")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the local machine's environment and mesh services
    Status,

    /// Manage the local host registry and SSH config blocks
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },

    /// Provision remote machines into the mesh
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand)]
pub enum HostCommands {
    /// Register a host and add a managed SSH config block
    Add {
        /// Host alias (alphanumeric with hyphens/underscores)
        name: String,

        #[arg(long, help = "IP address or DNS name")]
        ip: String,

        #[arg(long, default_value = "22")]
        port: u16,

        #[arg(short, long, help = "SSH user (defaults to the local user)")]
        user: Option<String>,

        #[arg(long, help = "Skip the SSH config block")]
        no_ssh: bool,
    },

    /// Remove a host from the registry and SSH config
    Remove {
        name: String,

        #[arg(long, help = "Leave the SSH config block in place")]
        keep_ssh: bool,
    },

    /// List registered hosts
    List,

    /// Show registry, SSH, and mesh state for one host
    Status { name: String },
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Provision one host into the mesh
    Provision {
        /// Registry alias or user@host
        host: String,

        #[arg(short, long, default_value = "22")]
        port: u16,

        #[arg(short, long, help = "Headscale server URL (defaults to the saved or local server)")]
        server: Option<String>,

        #[arg(short, long, default_value = "mesh", help = "Headscale namespace")]
        user: String,

        #[arg(long)]
        skip_syncthing: bool,

        #[arg(short, long, help = "Re-provision even if already registered")]
        force: bool,
    },

    /// Provision every registered host
    ProvisionAll {
        #[arg(short, long)]
        server: Option<String>,

        #[arg(short, long, default_value = "mesh")]
        user: String,

        #[arg(long)]
        skip_syncthing: bool,

        #[arg(short, long)]
        force: bool,
    },

    /// Inspect a remote host without changing it
    Status {
        host: String,

        #[arg(short, long, default_value = "22")]
        port: u16,
    },

    /// One-time interactive sudoers setup for passwordless provisioning
    Prepare {
        host: String,

        #[arg(short, long, default_value = "22")]
        port: u16,
    },
}
