// file: src/main.rs
// version: 2.1.0
// guid: h8i9j0k1-l2m3-4567-8901-234567hijklm

//! server-setup - Main entry point

use clap::Parser;
use server_setup::{
    cli::{commands::*, CheckpointAction, Cli, Commands},
    config::Settings,
    logging::{init_logger, LogOptions},
    Result, SetupError,
};
use std::process::ExitCode;
use tokio::signal;
use tracing::warn;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.dry_run);

    // Only provisioning runs get a log file
    let log_dir = match (&cli.command, &settings) {
        (Commands::Run { .. }, Ok(s)) if !s.dry_run => Some(s.paths.log_dir.clone()),
        _ => None,
    };
    let options = LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        no_color: cli.no_color,
        level: std::env::var("SETUP_LOG_LEVEL").ok(),
        log_dir,
    };
    if let Err(e) = init_logger(&options) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => return fail(&e),
    };

    // The prompt blocks on stdin, so it runs before the signal handlers exist
    let settings = match prepare(&cli.command, settings) {
        Ok(Some(settings)) => settings,
        Ok(None) => return ExitCode::from(1),
        Err(e) => return fail(&e),
    };

    tokio::select! {
        result = execute(cli.command, settings) => match result {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::from(1),
            Err(e) => fail(&e),
        },
        _ = shutdown_signal() => {
            warn!("Interrupted; partially applied changes are not rolled back automatically");
            ExitCode::from(130)
        }
    }
}

/// Report `e` and pick the exit code: 2 for usage errors, 1 otherwise
fn fail(e: &SetupError) -> ExitCode {
    report_error(e);
    if e.is_usage_error() {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

/// Preflight and confirmation for `run`; `None` when the operator declined
fn prepare(command: &Commands, settings: Settings) -> Result<Option<Settings>> {
    let Commands::Run {
        mode,
        user,
        skip_updates,
        yes,
        no_rollback,
    } = command
    else {
        return Ok(Some(settings));
    };

    let options = RunOptions {
        mode: *mode,
        user: user.clone(),
        skip_updates: *skip_updates,
        yes: *yes,
        no_rollback: *no_rollback,
    };
    let settings = prepare_run(settings, options)?;
    if confirm_run(&settings, std::io::stdin().lock())? {
        Ok(Some(settings))
    } else {
        Ok(None)
    }
}

/// Run a subcommand; `Ok(false)` means it finished but reported failures
async fn execute(command: Commands, settings: Settings) -> Result<bool> {
    match command {
        Commands::Run { .. } => run_command(settings).await,
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Create { name } => {
                let runner = runner_for(&settings);
                checkpoint_create_command(&settings, runner.as_ref(), &name).await?;
                Ok(true)
            }
            CheckpointAction::List { name, json } => {
                checkpoint_list_command(&settings, name.as_deref(), json).await?;
                Ok(true)
            }
        },
        Commands::Rollback { name, checkpoint } => {
            let runner = runner_for(&settings);
            rollback_command(
                &settings,
                runner.as_ref(),
                name.as_deref(),
                checkpoint.as_deref(),
            )
            .await?;
            Ok(true)
        }
        Commands::GenPassword { length, charset } => {
            gen_password_command(&settings, length, charset.as_deref())?;
            Ok(true)
        }
        Commands::Steps { mode } => {
            steps_command(mode)?;
            Ok(true)
        }
        Commands::Cleanup {
            older_than_days,
            checkpoints,
        } => {
            cleanup_command(&settings, older_than_days, checkpoints)?;
            Ok(true)
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
