// file: src/installer/report.rs
// version: 1.0.0
// guid: d3f8b2a6-71c4-4e95-8a0b-c6e1d9f45a72

//! Run summary: per-step outcomes, checkpoints and rollbacks

use crate::config::InstallMode;
use crate::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    /// Not attempted because an earlier critical step failed
    Skipped,
}

/// What happened when a failed step's checkpoint was restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RollbackStatus {
    RolledBack { restored: usize },
    Failed { error: String },
}

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Checkpoint taken before the step ran
    pub checkpoint: Option<PathBuf>,
    pub rollback: Option<RollbackStatus>,
}

impl StepRecord {
    pub fn skipped(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            status: StepStatus::Skipped,
            duration_ms: 0,
            error: None,
            checkpoint: None,
            rollback: None,
        }
    }
}

/// Summary of a whole provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: Uuid,
    pub mode: InstallMode,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    /// A critical step failed and the remaining steps were skipped
    pub aborted: bool,
    pub reboot_required: bool,
}

impl RunReport {
    pub fn new(session_id: Uuid, mode: InstallMode, dry_run: bool) -> Self {
        Self {
            session_id,
            mode,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            aborted: false,
            reboot_required: false,
        }
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(StepStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    /// True when no step failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.aborted
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Checkpoints created during the run
    pub fn checkpoints(&self) -> Vec<&Path> {
        self.steps
            .iter()
            .filter_map(|s| s.checkpoint.as_deref())
            .collect()
    }

    /// Write the report as `report-<session>.json` in `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("report-{}.json", self.session_id));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved run report to {}", path.display());
        Ok(path)
    }

    /// Print a human readable summary to stdout
    pub fn print_summary(&self) {
        println!();
        println!("{}", "Provisioning summary".bold());
        println!(
            "  Session: {}  Mode: {}{}",
            self.session_id,
            self.mode,
            if self.dry_run { "  (dry run)" } else { "" }
        );
        println!();

        for step in &self.steps {
            let status = match step.status {
                StepStatus::Completed => "ok".green(),
                StepStatus::Failed => "FAILED".red().bold(),
                StepStatus::Skipped => "skipped".yellow(),
            };
            println!(
                "  {:<18} {:<8} {:>7.1}s",
                step.name,
                status,
                step.duration_ms as f64 / 1000.0
            );
            if let Some(error) = &step.error {
                println!("      {}", error.red());
            }
            if let Some(checkpoint) = &step.checkpoint {
                println!("      checkpoint: {}", checkpoint.display());
            }
            match &step.rollback {
                Some(RollbackStatus::RolledBack { restored }) => {
                    println!("      {}", format!("rolled back ({} files restored)", restored).yellow());
                }
                Some(RollbackStatus::Failed { error }) => {
                    println!("      {}", format!("rollback failed: {}", error).red());
                }
                None => {}
            }
        }

        println!();
        println!(
            "  {} completed, {} failed, {} skipped",
            self.completed().to_string().green(),
            self.failed().to_string().red(),
            self.skipped().to_string().yellow()
        );
        if self.reboot_required {
            println!("  {}", "A reboot is required to finish applying updates".yellow());
        }
        if self.is_success() {
            println!("  {}", "Provisioning completed successfully".green().bold());
        } else {
            println!("  {}", "Provisioning finished with failures".red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: StepStatus) -> StepRecord {
        StepRecord {
            status,
            ..StepRecord::skipped(name, "test step")
        }
    }

    #[test]
    fn test_counts_and_success() {
        let mut report = RunReport::new(Uuid::new_v4(), InstallMode::Minimal, false);
        report.steps.push(record("01-prerequisites", StepStatus::Completed));
        report.steps.push(record("02-users", StepStatus::Completed));
        assert!(report.is_success());

        report.steps.push(record("07-security", StepStatus::Failed));
        report.steps.push(record("10-validation", StepStatus::Skipped));
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_success());
        assert_eq!(report.step("07-security").unwrap().status, StepStatus::Failed);
    }

    #[test]
    fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = RunReport::new(Uuid::new_v4(), InstallMode::NginxOnly, true);
        let mut step = record("06-nginx", StepStatus::Failed);
        step.rollback = Some(RollbackStatus::RolledBack { restored: 2 });
        report.steps.push(step);

        let path = report.save(dir.path()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("report-{}.json", report.session_id)
        );

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["mode"], "nginx-only");
        assert_eq!(json["steps"][0]["status"], "failed");
        assert_eq!(json["steps"][0]["rollback"]["result"], "rolled_back");
        assert_eq!(json["steps"][0]["rollback"]["restored"], 2);
    }
}
