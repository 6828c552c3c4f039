// file: src/utils/system.rs
// version: 2.0.0
// guid: w3x4y5z6-a7b8-9012-3456-789012wxyzab

//! System utility functions

use super::command::{Cmd, CommandRunner};
use crate::config::Settings;
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// System utility functions
pub struct SystemUtils;

impl SystemUtils {
    /// Check if a command exists in PATH
    pub fn command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }

    /// Check if running as root
    pub fn is_root() -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }

    /// Whether the package manager asked for a reboot
    pub fn reboot_required(settings: &Settings) -> bool {
        settings
            .live_path(Path::new("/var/run/reboot-required"))
            .exists()
    }

    /// Check whether a local account exists
    pub async fn user_exists(runner: &dyn CommandRunner, user: &str) -> Result<bool> {
        let output = runner.run(&Cmd::new("id").args(["-u", user])).await?;
        Ok(output.success())
    }

    /// Check whether a Debian package is installed
    pub async fn package_installed(runner: &dyn CommandRunner, package: &str) -> Result<bool> {
        let output = runner
            .run(&Cmd::new("dpkg-query").args(["-W", "-f", "${Status}", package]))
            .await?;
        Ok(output.success() && output.stdout.contains("install ok installed"))
    }

    /// Remove files (and optionally directories) under `dir` older than `days`.
    ///
    /// Returns the removed paths. With `dry_run` nothing is deleted.
    pub fn sweep_older_than(
        dir: &Path,
        days: u32,
        include_dirs: bool,
        dry_run: bool,
    ) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            debug!("Nothing to sweep, {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let metadata = entry.metadata().map_err(std::io::Error::from)?;
            if metadata.is_dir() && !include_dirs {
                continue;
            }
            if metadata.modified()? >= cutoff {
                continue;
            }

            let path = entry.path().to_path_buf();
            if dry_run {
                info!("DRY RUN: would remove {}", path.display());
            } else if metadata.is_dir() {
                std::fs::remove_dir_all(&path)?;
                info!("Removed {}", path.display());
            } else {
                std::fs::remove_file(&path)?;
                info!("Removed {}", path.display());
            }
            removed.push(path);
        }

        Ok(removed)
    }
}
