// file: src/cli/commands.rs
// version: 2.1.0
// guid: g7h8i9j0-k1l2-3456-7890-123456ghijkl

//! Command implementations for the CLI

use crate::{
    checkpoint::CheckpointStore,
    config::{ConfigLoader, InstallMode, Settings},
    error::SetupError,
    installer::Provisioner,
    security::{generate_password, ValidationUtils},
    steps::{all_steps, step_names},
    utils::command::{CommandRunner, RecordingRunner, SystemRunner},
    utils::system::SystemUtils,
    Result,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Options of the `run` subcommand
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Option<InstallMode>,
    pub user: Option<String>,
    pub skip_updates: bool,
    pub yes: bool,
    pub no_rollback: bool,
}

/// Load settings from the profile and environment, then apply global flags
pub fn load_settings(config: Option<&Path>, dry_run: bool) -> Result<Settings> {
    let mut settings = ConfigLoader::new().load(config)?;
    settings.dry_run |= dry_run;
    Ok(settings)
}

/// Command runner for the settings: recording in dry-run, real otherwise
pub fn runner_for(settings: &Settings) -> Box<dyn CommandRunner> {
    if settings.dry_run {
        Box::new(RecordingRunner::new())
    } else {
        Box::new(SystemRunner::new(Duration::from_secs(
            settings.command_timeout_secs,
        )))
    }
}

/// Apply `run` options to the settings and check the host can be provisioned.
///
/// Nothing on the host is touched here.
pub fn prepare_run(mut settings: Settings, options: RunOptions) -> Result<Settings> {
    if let Some(mode) = options.mode {
        settings.mode = mode;
    }
    if let Some(user) = options.user {
        settings.primary_user = user;
    }
    settings.skip_updates |= options.skip_updates;
    settings.assume_yes |= options.yes;
    if options.no_rollback {
        settings.auto_rollback = false;
    }

    settings.validate()?;

    if !settings.dry_run && !SystemUtils::is_root() {
        return Err(SetupError::validation(
            "Provisioning must run as root (try sudo, or use --dry-run)",
        ));
    }
    if !settings.dry_run {
        for required in ["apt-get", "dpkg-query", "systemctl"] {
            if !SystemUtils::command_exists(required) {
                return Err(SetupError::system(format!(
                    "Required command missing: {}",
                    required
                )));
            }
        }
    }
    Ok(settings)
}

/// Ask the operator to confirm the run on `input`.
///
/// Not asked with `--yes` or in dry-run. Must be called before signal
/// handlers are installed so Ctrl+C at the prompt ends the process.
pub fn confirm_run(settings: &Settings, mut input: impl BufRead) -> Result<bool> {
    if settings.assume_yes || settings.dry_run {
        return Ok(true);
    }

    println!("The following steps will run as root on this host:");
    for name in step_names(settings.mode) {
        println!("  {}", name);
    }
    print!("Continue? [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let confirmed = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
    if !confirmed {
        warn!("Aborted by user");
    }
    Ok(confirmed)
}

/// Provision the host with prepared settings. Returns `false` when any step failed.
pub async fn run_command(settings: Settings) -> Result<bool> {
    let mode = settings.mode;
    info!(
        "Provisioning in {} mode for user {}{}",
        mode,
        settings.primary_user,
        if settings.dry_run { " (dry run)" } else { "" }
    );

    let runner = runner_for(&settings);
    let provisioner = Provisioner::new(&settings, runner.as_ref());
    let report = provisioner.run(mode).await;

    if !settings.dry_run {
        match report.save(&settings.paths.log_dir) {
            Ok(path) => info!("Run report saved to {}", path.display()),
            Err(e) => warn!("Could not save run report: {}", e),
        }
    }
    report.print_summary();

    Ok(report.is_success())
}

/// Create a checkpoint of the tracked configuration files
pub async fn checkpoint_create_command(
    settings: &Settings,
    runner: &dyn CommandRunner,
    name: &str,
) -> Result<()> {
    ValidationUtils::validate_checkpoint_name(name)?;
    let store = CheckpointStore::from_settings(settings);

    if settings.dry_run {
        info!(
            "DRY RUN: would create checkpoint {} in {}",
            name,
            store.backup_root().display()
        );
        return Ok(());
    }

    let path = store.create(name, runner).await?;
    println!("{}", path.display());
    info!("Checkpoint {} created", name);
    Ok(())
}

/// List checkpoints, newest first
pub async fn checkpoint_list_command(
    settings: &Settings,
    name: Option<&str>,
    json_output: bool,
) -> Result<()> {
    if let Some(name) = name {
        ValidationUtils::validate_checkpoint_name(name)?;
    }
    let store = CheckpointStore::from_settings(settings);
    let checkpoints = store.list(name)?;

    if json_output {
        let entries: Vec<serde_json::Value> = checkpoints
            .iter()
            .map(|c| {
                serde_json::json!({
                    "path": c.path,
                    "name": c.manifest.name,
                    "stamp": c.manifest.stamp,
                    "created_at": c.manifest.created_at,
                    "files": c.manifest.files.iter().map(|f| &f.source).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        info!("No checkpoints found in {}", store.backup_root().display());
        return Ok(());
    }

    println!(
        "{:<24} {:<22} {:<20} {:>5}",
        "Name", "Stamp", "Created", "Files"
    );
    println!("{:-<74}", "");
    for checkpoint in &checkpoints {
        println!(
            "{:<24} {:<22} {:<20} {:>5}",
            checkpoint.manifest.name,
            checkpoint.manifest.stamp,
            checkpoint.manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.manifest.files.len()
        );
    }
    info!("Found {} checkpoints", checkpoints.len());
    Ok(())
}

/// Restore a checkpoint by name (most recent) or by directory
pub async fn rollback_command(
    settings: &Settings,
    runner: &dyn CommandRunner,
    name: Option<&str>,
    dir: Option<&Path>,
) -> Result<()> {
    let store = CheckpointStore::from_settings(settings);

    let (path, manifest) = match (name, dir) {
        (_, Some(dir)) => {
            let checkpoint = store.open(dir)?;
            (checkpoint.path, checkpoint.manifest)
        }
        (Some(name), None) => {
            let latest = store.latest(name)?;
            (latest.path, latest.manifest)
        }
        (None, None) => {
            return Err(SetupError::invalid_argument(
                "Either a checkpoint name or --checkpoint DIR is required",
            ))
        }
    };

    if settings.dry_run {
        info!("DRY RUN: would restore checkpoint {}", path.display());
        for file in &manifest.files {
            println!("  {}", file.source.display());
        }
        return Ok(());
    }

    let report = store.rollback_dir(&path, runner).await?;
    for restored in &report.restored {
        println!("restored {}", restored.display());
    }
    if !report.daemon_reloaded {
        warn!("systemctl daemon-reload failed; reload services manually");
    }
    info!(
        "Rolled back {} files from {}",
        report.restored.len(),
        report.checkpoint.display()
    );
    Ok(())
}

/// Print a random password
pub fn gen_password_command(settings: &Settings, length: usize, charset: Option<&str>) -> Result<()> {
    let charset = charset.unwrap_or(&settings.password_charset);
    let password = generate_password(length, charset)?;
    println!("{}", password);
    Ok(())
}

/// Print the steps of one or all modes
pub fn steps_command(mode: Option<InstallMode>) -> Result<()> {
    let steps = all_steps();
    let modes: Vec<InstallMode> = match mode {
        Some(mode) => vec![mode],
        None => InstallMode::ALL.to_vec(),
    };

    for mode in modes {
        println!("{}:", mode);
        for name in step_names(mode) {
            let Some(step) = steps.iter().find(|s| s.name() == *name) else {
                continue;
            };
            let mut flags = Vec::new();
            if step.critical() {
                flags.push("critical");
            }
            if step.checkpoint() {
                flags.push("checkpoint");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!("  {:<18} {}{}", step.name(), step.description(), flags);
        }
    }
    Ok(())
}

/// Remove logs (and optionally checkpoints) older than the retention period
pub fn cleanup_command(
    settings: &Settings,
    older_than_days: Option<u32>,
    checkpoints: bool,
) -> Result<Vec<PathBuf>> {
    let days = older_than_days.unwrap_or(settings.log_retention_days);
    let mut removed =
        SystemUtils::sweep_older_than(&settings.paths.log_dir, days, false, settings.dry_run)?;
    if checkpoints {
        removed.extend(SystemUtils::sweep_older_than(
            &settings.paths.backup_root,
            days,
            true,
            settings.dry_run,
        )?);
    }

    let verb = if settings.dry_run { "would remove" } else { "removed" };
    for path in &removed {
        println!("{} {}", verb, path.display());
    }
    info!("Cleanup {} {} entries older than {} days", verb, removed.len(), days);
    Ok(removed)
}

/// Log a fatal error in the format used for every subcommand
pub fn report_error(err: &SetupError) {
    error!("{}", err);
}
