// file: src/checkpoint/manifest.rs
// version: 1.0.0
// guid: 0d7a3b5e-62f1-4c8d-9a04-b8e1f6c2d937

//! On-disk manifest describing one checkpoint

use crate::error::SetupError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PACKAGE_SNAPSHOT_FILE: &str = "packages.txt";
pub const SERVICE_SNAPSHOT_FILE: &str = "services.txt";
/// Subdirectory holding the file copies
pub const FILES_DIR: &str = "files";

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// `chrono` format of the directory stamp: 20 digits, sorts lexicographically
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";
pub const STAMP_LEN: usize = 20;

/// Manifest of a checkpoint directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub format_version: u32,
    pub name: String,
    pub stamp: String,
    pub created_at: DateTime<Utc>,
    /// Captured files in capture order
    pub files: Vec<BackedUpFile>,
    pub package_snapshot: String,
    pub service_snapshot: String,
}

/// One captured configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackedUpFile {
    /// Absolute system path the file was captured from
    pub source: PathBuf,
    /// Location of the copy, relative to the checkpoint directory
    pub backup: PathBuf,
    /// Permission bits (`st_mode & 0o7777`)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Hex SHA-256 of the copy
    pub sha256: String,
}

impl CheckpointManifest {
    pub fn new(name: &str, stamp: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            name: name.to_string(),
            stamp: stamp.to_string(),
            created_at,
            files: Vec::new(),
            package_snapshot: PACKAGE_SNAPSHOT_FILE.to_string(),
            service_snapshot: SERVICE_SNAPSHOT_FILE.to_string(),
        }
    }

    /// Directory name of this checkpoint: `<name>-<stamp>`
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.name, self.stamp)
    }

    /// Read and check the manifest of a checkpoint directory
    pub fn load(dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: CheckpointManifest = serde_json::from_str(&content)?;

        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(SetupError::validation(format!(
                "Unsupported checkpoint manifest version {} in {}",
                manifest.format_version,
                dir.display()
            )));
        }
        for entry in &manifest.files {
            if !entry.source.is_absolute() || !is_plain_relative(&entry.backup) {
                return Err(SetupError::security(format!(
                    "Manifest entry {} in {} has an unsafe path",
                    entry.source.display(),
                    dir.display()
                )));
            }
        }

        Ok(manifest)
    }

    /// Write the manifest into `dir` via a temp file and rename
    pub fn write_atomic(&self, dir: &Path) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(MANIFEST_FILE))
            .map_err(|e| SetupError::Io(e.error))?;
        Ok(())
    }
}

/// Split a checkpoint directory name into `(name, stamp)`
pub fn parse_dir_name(dir_name: &str) -> Option<(&str, &str)> {
    let (name, stamp) = dir_name.rsplit_once('-')?;
    if name.is_empty() || !is_stamp(stamp) {
        return None;
    }
    Some((name, stamp))
}

pub fn is_stamp(s: &str) -> bool {
    s.len() == STAMP_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
