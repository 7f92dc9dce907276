// file: src/error.rs
// version: 1.2.0
// guid: 8a41c7d2-9f13-4e5a-b06c-2d7e913fa45b

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, MeshError>;

/// Error types for meshctl
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid hostname '{name}': must be alphanumeric with hyphens/underscores, start with letter/number, max 63 chars")]
    InvalidHostname { name: String },

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("Could not detect remote OS: {0}")]
    Detection(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MeshError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new SSH error
    pub fn ssh(msg: impl Into<String>) -> Self {
        Self::Ssh(msg.into())
    }

    /// Create a new credential error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Create a new provisioning error
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }
}
