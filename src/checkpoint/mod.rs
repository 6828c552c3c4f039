// file: src/checkpoint/mod.rs
// version: 1.0.0
// guid: 5c9e0a28-7d14-4f3b-b6a1-e83f2d7c4905

//! Restore points for system configuration files.
//!
//! A checkpoint is a directory `<backup_root>/<name>-<stamp>/` holding a copy
//! of each configured file that existed at capture time, informational
//! package and service snapshots, and a versioned `manifest.json`. Checkpoints
//! are written once and only read afterwards; rollback restores the files of
//! the most recent checkpoint of a name.

pub mod manifest;
pub mod store;

pub use manifest::{BackedUpFile, CheckpointManifest};
pub use store::{CheckpointInfo, CheckpointStore, RollbackReport};
