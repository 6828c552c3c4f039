// file: src/lib.rs
// version: 3.0.0
// guid: d82472d1-7f0f-4eb4-b0a3-6e1547103eb4

//! # server-setup
//!
//! Provisions a fresh Ubuntu server through an ordered list of steps chosen by
//! an installation mode. Risky steps are preceded by a checkpoint of the
//! tracked configuration files, which is restored when the step fails.
//!
//! Every external command goes through a [`utils::command::CommandRunner`],
//! and every live path is resolved under a configurable system root, so whole
//! runs can be dry-run or exercised against a temporary directory.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod logging;
pub mod security;
pub mod steps;
pub mod utils;

pub use error::{Result, SetupError};

/// Version information for the tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
