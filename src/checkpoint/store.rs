// file: src/checkpoint/store.rs
// version: 1.1.0
// guid: 94c8e1f7-3b2a-4d6e-8f50-a7d1c3e9b024

//! Checkpoint creation, lookup and rollback

use super::manifest::{
    parse_dir_name, sha256_file, BackedUpFile, CheckpointManifest, FILES_DIR,
    PACKAGE_SNAPSHOT_FILE, SERVICE_SNAPSHOT_FILE, STAMP_FORMAT,
};
use crate::config::settings::resolve_under;
use crate::config::Settings;
use crate::error::SetupError;
use crate::security::ValidationUtils;
use crate::utils::command::{Cmd, CommandRunner};
use crate::Result;
use chrono::Utc;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_STAMP_ATTEMPTS: u32 = 10;

/// A checkpoint found on disk
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub manifest: CheckpointManifest,
}

/// Outcome of a rollback
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub checkpoint: PathBuf,
    pub name: String,
    pub stamp: String,
    /// System paths that were restored
    pub restored: Vec<PathBuf>,
    /// Whether `systemctl daemon-reload` succeeded afterwards
    pub daemon_reloaded: bool,
}

/// Checkpoints of system configuration files under one backup root
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    backup_root: PathBuf,
    system_root: PathBuf,
    candidates: Vec<PathBuf>,
}

/// Removes a checkpoint directory that was never completed
struct PartialCheckpoint {
    path: PathBuf,
    committed: bool,
}

impl PartialCheckpoint {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialCheckpoint {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        warn!("Removing incomplete checkpoint {}", self.path.display());
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

impl CheckpointStore {
    pub fn new(
        backup_root: impl Into<PathBuf>,
        system_root: impl Into<PathBuf>,
        candidates: Vec<PathBuf>,
    ) -> Self {
        Self {
            backup_root: backup_root.into(),
            system_root: system_root.into(),
            candidates,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.paths.backup_root.clone(),
            settings.paths.system_root.clone(),
            settings.checkpoint_files.clone(),
        )
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Capture the candidate files and package/service snapshots under `name`.
    ///
    /// Returns the absolute path of the new checkpoint directory.
    pub async fn create(&self, name: &str, runner: &dyn CommandRunner) -> Result<PathBuf> {
        ValidationUtils::validate_checkpoint_name(name)?;
        self.ensure_backup_root()?;

        let (dir, manifest) = self.reserve_dir(name).await?;
        let guard = PartialCheckpoint::new(dir.clone());
        let mut manifest = manifest;

        for candidate in &self.candidates {
            if let Some(entry) = self.capture_file(&dir, candidate, &manifest.stamp)? {
                manifest.files.push(entry);
            }
        }

        write_snapshot(
            runner,
            &Cmd::new("dpkg-query").args(["-W", "-f", "${Package}\t${Version}\n"]),
            &dir.join(PACKAGE_SNAPSHOT_FILE),
        )
        .await?;
        write_snapshot(
            runner,
            &Cmd::systemctl([
                "list-unit-files",
                "--type=service",
                "--state=enabled",
                "--no-legend",
                "--no-pager",
            ]),
            &dir.join(SERVICE_SNAPSHOT_FILE),
        )
        .await?;

        manifest.write_atomic(&dir)?;
        let dir = guard.commit();
        let dir = fs::canonicalize(&dir).unwrap_or(dir);

        info!(
            "Created checkpoint {} ({} files) at {}",
            name,
            manifest.files.len(),
            dir.display()
        );
        Ok(dir)
    }

    /// Checkpoints sorted newest first, optionally only those named `name`
    pub fn list(&self, name: Option<&str>) -> Result<Vec<CheckpointInfo>> {
        let entries = match fs::read_dir(&self.backup_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            let Some((dir_checkpoint_name, stamp)) = parse_dir_name(dir_name) else {
                continue;
            };
            if name.is_some_and(|n| n != dir_checkpoint_name) {
                continue;
            }

            let path = entry.path();
            match CheckpointManifest::load(&path) {
                Ok(manifest) if manifest.name == dir_checkpoint_name && manifest.stamp == stamp => {
                    found.push(CheckpointInfo { path, manifest });
                }
                Ok(_) => warn!("Manifest does not match directory {}", path.display()),
                Err(e) => debug!("Ignoring {}: {}", path.display(), e),
            }
        }

        found.sort_by(|a, b| {
            b.manifest
                .stamp
                .cmp(&a.manifest.stamp)
                .then_with(|| a.manifest.name.cmp(&b.manifest.name))
        });
        Ok(found)
    }

    /// The most recent checkpoint named `name`
    pub fn latest(&self, name: &str) -> Result<CheckpointInfo> {
        ValidationUtils::validate_checkpoint_name(name)?;
        self.list(Some(name))?
            .into_iter()
            .next()
            .ok_or_else(|| SetupError::checkpoint_not_found(name))
    }

    /// Restore the files of the most recent checkpoint named `name`
    pub async fn rollback(&self, name: &str, runner: &dyn CommandRunner) -> Result<RollbackReport> {
        let checkpoint = self.latest(name)?;
        info!(
            "Rolling back to checkpoint {} from {}",
            name, checkpoint.manifest.created_at
        );
        self.restore(&checkpoint.path, &checkpoint.manifest, runner).await
    }

    /// The checkpoint stored in `dir`.
    ///
    /// `dir` must sit directly under the backup root and its manifest must
    /// match the directory name, the same rule `list` applies.
    pub fn open(&self, dir: &Path) -> Result<CheckpointInfo> {
        let not_found = || SetupError::checkpoint_not_found(dir.display().to_string());
        if !dir.is_dir() {
            return Err(not_found());
        }
        let root = fs::canonicalize(&self.backup_root).map_err(|_| not_found())?;
        let path = fs::canonicalize(dir)?;
        if path.parent() != Some(root.as_path()) {
            return Err(SetupError::security(format!(
                "{} is not a checkpoint under {}",
                path.display(),
                root.display()
            )));
        }

        let (name, stamp) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_dir_name)
            .ok_or_else(not_found)?;
        let manifest = CheckpointManifest::load(&path)?;
        if manifest.name != name || manifest.stamp != stamp {
            return Err(SetupError::security(format!(
                "Manifest does not match directory {}",
                path.display()
            )));
        }
        Ok(CheckpointInfo { path, manifest })
    }

    /// Restore the files of a specific checkpoint directory
    pub async fn rollback_dir(&self, dir: &Path, runner: &dyn CommandRunner) -> Result<RollbackReport> {
        let checkpoint = self.open(dir)?;
        self.restore(&checkpoint.path, &checkpoint.manifest, runner).await
    }

    async fn restore(
        &self,
        dir: &Path,
        manifest: &CheckpointManifest,
        runner: &dyn CommandRunner,
    ) -> Result<RollbackReport> {
        // Every copy is checked before any live file is touched
        for entry in &manifest.files {
            let backup = dir.join(&entry.backup);
            let actual = sha256_file(&backup).map_err(|e| {
                SetupError::security(format!(
                    "Backup copy {} is unreadable: {}",
                    backup.display(),
                    e
                ))
            })?;
            if actual != entry.sha256 {
                return Err(SetupError::security(format!(
                    "Backup copy {} does not match its recorded checksum",
                    backup.display()
                )));
            }
        }

        let mut restored = Vec::with_capacity(manifest.files.len());
        for entry in &manifest.files {
            self.restore_file(dir, entry)?;
            restored.push(entry.source.clone());
        }

        let daemon_reloaded = match runner.run(&Cmd::systemctl(["daemon-reload"])).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!("systemctl daemon-reload failed: {}", output.stderr.trim());
                false
            }
            Err(e) => {
                warn!("systemctl daemon-reload failed: {}", e);
                false
            }
        };

        info!(
            "Restored {} files from checkpoint {}",
            restored.len(),
            dir.display()
        );
        Ok(RollbackReport {
            checkpoint: dir.to_path_buf(),
            name: manifest.name.clone(),
            stamp: manifest.stamp.clone(),
            restored,
            daemon_reloaded,
        })
    }

    fn restore_file(&self, dir: &Path, entry: &BackedUpFile) -> Result<()> {
        let backup = dir.join(&entry.backup);
        let live = resolve_under(&self.system_root, &entry.source);

        if let Some(parent) = live.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&backup, &live)?;
        fs::set_permissions(&live, fs::Permissions::from_mode(entry.mode))?;

        let metadata = fs::metadata(&live)?;
        if metadata.uid() != entry.uid || metadata.gid() != entry.gid {
            if let Err(e) = std::os::unix::fs::chown(&live, Some(entry.uid), Some(entry.gid)) {
                debug!("Could not restore ownership of {}: {}", live.display(), e);
            }
        }

        debug!("Restored {}", entry.source.display());
        Ok(())
    }

    fn ensure_backup_root(&self) -> Result<()> {
        if self.backup_root.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.backup_root).map_err(|e| {
            SetupError::system(format!(
                "Cannot create backup root {}: {}",
                self.backup_root.display(),
                e
            ))
        })?;
        fs::set_permissions(&self.backup_root, fs::Permissions::from_mode(0o700))?;
        Ok(())
    }

    /// Create a fresh `<name>-<stamp>` directory
    async fn reserve_dir(&self, name: &str) -> Result<(PathBuf, CheckpointManifest)> {
        for _ in 0..MAX_STAMP_ATTEMPTS {
            let now = Utc::now();
            let manifest = CheckpointManifest::new(name, &now.format(STAMP_FORMAT).to_string(), now);
            let dir = self.backup_root.join(manifest.dir_name());

            match fs::create_dir(&dir) {
                Ok(()) => return Ok((dir, manifest)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => {
                    return Err(SetupError::system(format!(
                        "Cannot create checkpoint directory {}: {}",
                        dir.display(),
                        e
                    )))
                }
            }
        }

        Err(SetupError::system(format!(
            "Could not allocate a unique checkpoint directory for {}",
            name
        )))
    }

    fn capture_file(&self, dir: &Path, source: &Path, stamp: &str) -> Result<Option<BackedUpFile>> {
        let live = resolve_under(&self.system_root, source);
        let metadata = match fs::metadata(&live) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Skipping {}: not present", source.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            warn!("Skipping {}: not a regular file", source.display());
            return Ok(None);
        }

        let relative = resolve_under(Path::new(FILES_DIR), source);
        let mut file_name: OsString = relative
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        file_name.push(format!(".{}", stamp));
        let relative = relative.with_file_name(file_name);
        let backup = dir.join(&relative);

        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&live, &backup)?;
        let mode = metadata.permissions().mode() & 0o7777;
        fs::set_permissions(&backup, fs::Permissions::from_mode(mode))?;

        debug!("Captured {}", source.display());
        Ok(Some(BackedUpFile {
            source: source.to_path_buf(),
            backup: relative,
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.len(),
            sha256: sha256_file(&backup)?,
        }))
    }
}

async fn write_snapshot(runner: &dyn CommandRunner, cmd: &Cmd, path: &Path) -> Result<()> {
    let content = match runner.run(cmd).await {
        Ok(output) if output.success() => output.stdout,
        Ok(output) => {
            warn!("Snapshot `{}` failed: {}", cmd, output.stderr.trim());
            String::new()
        }
        Err(e) => {
            warn!("Snapshot `{}` failed: {}", cmd, e);
            String::new()
        }
    };
    fs::write(path, content)?;
    Ok(())
}
