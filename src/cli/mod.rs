// file: src/cli/mod.rs
// version: 1.0.0
// guid: b4c6d8e0-5f7a-4192-a3c5-e6f8a0b2c4d6

//! Command line interface for meshctl

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::*;
