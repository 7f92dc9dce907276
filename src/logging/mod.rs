// file: src/logging/mod.rs
// version: 1.0.0
// guid: c5d8e1f0-2a3b-4c5d-9e7f-8091a2b3c4d5

//! Logging module

pub mod logger;
