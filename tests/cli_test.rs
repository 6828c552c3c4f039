// file: tests/cli_test.rs
// version: 1.0.0
// guid: 4e8b1d6a-92c3-4f57-b0a8-3c7e5f2d9164

//! Command line tests for the server-setup binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// The binary with a clean environment and a profile rooted in `root`
fn server_setup(root: &Path) -> Command {
    let profile = root.join("profile.yaml");
    std::fs::write(
        &profile,
        format!(
            "paths:\n  system_root: {0}/sys\n  backup_root: {0}/backups\n  log_dir: {0}/logs\n",
            root.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("server-setup").unwrap();
    cmd.env_clear()
        .env("HOME", root)
        .arg("--no-color")
        .arg("--config")
        .arg(profile);
    cmd
}

#[test]
fn test_gen_password_length() {
    let root = TempDir::new().unwrap();
    let output = server_setup(root.path())
        .args(["gen-password", "--length", "24"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let password = String::from_utf8(output).unwrap();
    assert_eq!(password.trim_end().chars().count(), 24);
}

#[test]
fn test_gen_password_custom_charset() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["gen-password", "--length", "32", "--charset", "ab"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[ab]{32}\n$").unwrap());
}

#[test]
fn test_gen_password_zero_length_is_usage_error() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["gen-password", "--length", "0"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_user_is_usage_error() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["--dry-run", "run", "--user", "Bad User", "--yes"])
        .assert()
        .code(2);

    assert!(!root.path().join("sys").exists());
}

#[test]
fn test_steps_for_mode() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["steps", "--mode", "nginx-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("06-nginx"))
        .stdout(predicate::str::contains("[checkpoint]"))
        .stdout(predicate::str::contains("[critical]"))
        .stdout(predicate::str::contains("02-users").not());
}

#[test]
fn test_unknown_mode_is_usage_error() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["run", "--mode", "everything"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown installation mode"));
}

#[test]
fn test_checkpoint_list_empty_json() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["checkpoint", "list", "--json"])
        .assert()
        .success()
        .stdout("[]\n");
}

#[test]
fn test_checkpoint_round_trip() {
    let root = TempDir::new().unwrap();
    let sys = root.path().join("sys/etc");
    std::fs::create_dir_all(&sys).unwrap();
    std::fs::write(sys.join("hosts"), "127.0.0.1 localhost\n").unwrap();

    // Snapshot commands may be missing on the test host; their failure is recorded, not fatal
    server_setup(root.path())
        .args(["checkpoint", "create", "manual"])
        .assert()
        .success();

    server_setup(root.path())
        .args(["checkpoint", "list", "manual", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"manual\""))
        .stdout(predicate::str::contains("/etc/hosts"));
}

#[test]
fn test_rollback_unknown_checkpoint_fails() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["rollback", "07-security"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Checkpoint not found: 07-security"));
}

#[test]
fn test_dry_run_minimal_succeeds_without_changes() {
    let root = TempDir::new().unwrap();
    server_setup(root.path())
        .args(["--dry-run", "run", "--mode", "minimal", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Provisioning completed successfully"));

    assert!(!root.path().join("sys").exists());
    assert!(!root.path().join("backups").exists());
}
