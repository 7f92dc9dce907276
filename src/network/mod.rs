// file: src/network/mod.rs
// version: 1.2.0
// guid: b3c5d7e9-0f1a-4b2c-93d5-e7f9a1b3c5d7

//! Network operations module

pub mod executor;
pub mod runner;

pub use executor::RemoteRunner;
pub use runner::{CommandOutput, SshRunner, SshTarget};
