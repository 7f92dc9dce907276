// file: src/lib.rs
// version: 1.1.0
// guid: 3f7b9c24-51ae-4d08-8e6b-97c0d2a418f5

//! # meshctl
//!
//! Overlay network provisioning CLI. Drives a self-hosted Headscale
//! coordination server plus Syncthing across heterogeneous hosts (Linux,
//! WSL2, Windows): registers hosts, keeps the SSH client config in sync
//! with the registry, and provisions remote machines into the mesh over SSH.

pub mod cli;
pub mod config;
pub mod error;
pub mod headscale;
pub mod logging;
pub mod network;
pub mod provision;
pub mod registry;
pub mod sshconf;

pub use error::{MeshError, Result};

/// Version information for the utility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
