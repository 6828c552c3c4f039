// file: src/cli/args.rs
// version: 2.0.0
// guid: f6g7h8i9-j0k1-2345-6789-012345fghijk

//! Command line argument definitions

use crate::config::InstallMode;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "server-setup")]
#[command(about = "Provision a fresh Ubuntu server with checkpoints and rollback")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable coloured output
    #[arg(long, global = true, env = "SETUP_NO_COLOR", value_parser = BoolishValueParser::new())]
    pub no_color: bool,

    /// YAML configuration profile
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show what would be done without changing the system
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the provisioning steps of an installation mode
    Run {
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<InstallMode>,

        /// Primary (non-root) user to provision
        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        skip_updates: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Keep changes of failed steps instead of restoring their checkpoint
        #[arg(long)]
        no_rollback: bool,
    },

    /// Create or list checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Restore the most recent checkpoint with the given name
    Rollback {
        #[arg(required_unless_present = "checkpoint")]
        name: Option<String>,

        /// Restore a specific checkpoint directory instead
        #[arg(long, value_name = "DIR", conflicts_with = "name")]
        checkpoint: Option<PathBuf>,
    },

    /// Generate a random password
    GenPassword {
        #[arg(short, long, default_value_t = 16)]
        length: usize,

        /// Characters to draw from
        #[arg(long)]
        charset: Option<String>,
    },

    /// Show the steps each installation mode runs
    Steps {
        #[arg(short, long, value_parser = parse_mode)]
        mode: Option<InstallMode>,
    },

    /// Remove old log files and, optionally, old checkpoints
    Cleanup {
        #[arg(long, value_name = "DAYS")]
        older_than_days: Option<u32>,

        #[arg(long)]
        checkpoints: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// Snapshot the tracked configuration files
    Create { name: String },

    /// List checkpoints, newest first
    List {
        name: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

fn parse_mode(value: &str) -> Result<InstallMode, String> {
    value.parse().map_err(|e: crate::error::SetupError| e.to_string())
}
