// file: src/installer/mod.rs
// version: 2.0.0
// guid: g7h8i9j0-k1l2-3456-7890-abcdef123456

//! Provisioning orchestrator
//!
//! Runs the steps of an installation mode in order. Steps flagged for a
//! checkpoint get a restore point first and are rolled back when they fail.
//! A failing critical step aborts the run; any other failure is recorded and
//! the run continues.

pub mod report;

pub use report::{RollbackStatus, RunReport, StepRecord, StepStatus};

use crate::checkpoint::CheckpointStore;
use crate::config::{InstallMode, Settings};
use crate::logging::with_async_operation_span;
use crate::steps::{steps_for, ProvisionStep, StepContext};
use crate::utils::command::CommandRunner;
use crate::utils::system::SystemUtils;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Main provisioning orchestrator
pub struct Provisioner<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    store: CheckpointStore,
    session_id: Uuid,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        let session_id = Uuid::new_v4();
        info!("Creating provisioning session: {}", session_id);
        Self {
            settings,
            runner,
            store: CheckpointStore::from_settings(settings),
            session_id,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Execute every step of `mode`
    pub async fn run(&self, mode: InstallMode) -> RunReport {
        self.run_steps(mode, steps_for(mode)).await
    }

    /// Execute the given steps in order, reporting under `mode`
    pub async fn run_steps(&self, mode: InstallMode, steps: Vec<Box<dyn ProvisionStep>>) -> RunReport {
        let mut report = RunReport::new(self.session_id, mode, self.settings.dry_run);
        let selected: Vec<&'static str> = steps.iter().map(|s| s.name()).collect();
        let total = steps.len();

        info!("Running {} steps in {} mode", total, mode);

        for (index, step) in steps.iter().enumerate() {
            if report.aborted {
                report
                    .steps
                    .push(StepRecord::skipped(step.name(), step.description()));
                continue;
            }

            info!(
                "Executing step {}/{}: {} - {}",
                index + 1,
                total,
                step.name(),
                step.description()
            );

            let ctx = StepContext {
                session_id: self.session_id,
                settings: self.settings,
                runner: self.runner,
                step_number: index + 1,
                total_steps: total,
                selected: &selected,
            };

            let record = with_async_operation_span(step.name(), || {
                self.execute_step(step.as_ref(), &ctx)
            })
            .await;

            if record.status == StepStatus::Failed && step.critical() {
                error!("Critical step {} failed, aborting run", step.name());
                report.aborted = true;
            }
            report.steps.push(record);
        }

        report.reboot_required = SystemUtils::reboot_required(self.settings);
        report.finished_at = Some(chrono::Utc::now());

        if report.is_success() {
            info!("All {} steps completed", total);
        } else {
            warn!(
                "{} of {} steps failed",
                report.failed(),
                total
            );
        }
        report
    }

    /// Run one step with its checkpoint and rollback handling
    async fn execute_step(&self, step: &dyn ProvisionStep, ctx: &StepContext<'_>) -> StepRecord {
        let started = Instant::now();
        let mut record = StepRecord {
            name: step.name().to_string(),
            description: step.description().to_string(),
            status: StepStatus::Completed,
            duration_ms: 0,
            error: None,
            checkpoint: None,
            rollback: None,
        };

        if step.checkpoint() {
            match self.take_checkpoint(step.name()).await {
                Ok(checkpoint) => record.checkpoint = checkpoint,
                Err(e) => {
                    error!("Not running {} without a checkpoint: {}", step.name(), e);
                    record.status = StepStatus::Failed;
                    record.error = Some(format!("checkpoint failed: {}", e));
                    record.duration_ms = started.elapsed().as_millis() as u64;
                    return record;
                }
            }
        }

        if let Err(e) = step.run(ctx).await {
            let message = format!("{:#}", e);
            error!("Step {} failed: {}", step.name(), message);
            record.status = StepStatus::Failed;
            record.error = Some(message);

            if let Some(checkpoint) = &record.checkpoint {
                if self.settings.auto_rollback {
                    record.rollback = Some(self.roll_back(checkpoint).await);
                } else {
                    warn!(
                        "Automatic rollback disabled; restore manually with `server-setup rollback {}`",
                        step.name()
                    );
                }
            }
        } else {
            info!("Step completed: {}", step.name());
        }

        record.duration_ms = started.elapsed().as_millis() as u64;
        record
    }

    async fn take_checkpoint(&self, name: &str) -> crate::Result<Option<PathBuf>> {
        if self.settings.dry_run {
            info!("DRY RUN: would create checkpoint {}", name);
            return Ok(None);
        }
        self.store.create(name, self.runner).await.map(Some)
    }

    async fn roll_back(&self, checkpoint: &std::path::Path) -> RollbackStatus {
        warn!("Rolling back {}", checkpoint.display());
        match self.store.rollback_dir(checkpoint, self.runner).await {
            Ok(outcome) => {
                info!("Restored {} files", outcome.restored.len());
                RollbackStatus::RolledBack {
                    restored: outcome.restored.len(),
                }
            }
            Err(e) => {
                error!("Rollback of {} failed: {}", checkpoint.display(), e);
                RollbackStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::RecordingRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeStep {
        name: &'static str,
        critical: bool,
        checkpoint: bool,
        fail: bool,
        runs: Arc<AtomicUsize>,
    }

    impl FakeStep {
        fn boxed(name: &'static str, fail: bool, runs: &Arc<AtomicUsize>) -> Box<dyn ProvisionStep> {
            Box::new(Self {
                name,
                critical: false,
                checkpoint: false,
                fail,
                runs: Arc::clone(runs),
            })
        }
    }

    #[async_trait::async_trait]
    impl ProvisionStep for FakeStep {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "fake"
        }

        fn critical(&self) -> bool {
            self.critical
        }

        fn checkpoint(&self) -> bool {
            self.checkpoint
        }

        async fn run(&self, ctx: &StepContext<'_>) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.write_file("/etc/ssh/sshd_config", "PermitRootLogin no\n", 0o644)
                .await?;
            if self.fail {
                anyhow::bail!("{} broke", self.name);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_non_critical_failure_continues() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let steps = vec![
            FakeStep::boxed("a", false, &runs),
            FakeStep::boxed("b", true, &runs),
            FakeStep::boxed("c", false, &runs),
        ];
        let report = Provisioner::new(&settings, &runner)
            .run_steps(InstallMode::Full, steps)
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.step("b").unwrap().error.as_deref(), Some("b broke"));
        assert!(!report.aborted);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_critical_failure_skips_rest() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Box<dyn ProvisionStep>> = vec![
            Box::new(FakeStep {
                name: "first",
                critical: true,
                checkpoint: false,
                fail: true,
                runs: Arc::clone(&runs),
            }),
            FakeStep::boxed("second", false, &runs),
        ];
        let report = Provisioner::new(&settings, &runner)
            .run_steps(InstallMode::Minimal, steps)
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(report.aborted);
        assert_eq!(report.step("second").unwrap().status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failed_checkpoint_step_is_rolled_back() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let sshd = root.path().join("etc/ssh/sshd_config");
        std::fs::create_dir_all(sshd.parent().unwrap()).unwrap();
        std::fs::write(&sshd, "PermitRootLogin yes\n").unwrap();
        let runner = RecordingRunner::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Box<dyn ProvisionStep>> = vec![Box::new(FakeStep {
            name: "07-security",
            critical: false,
            checkpoint: true,
            fail: true,
            runs: Arc::clone(&runs),
        })];
        let report = Provisioner::new(&settings, &runner)
            .run_steps(InstallMode::Minimal, steps)
            .await;

        let record = report.step("07-security").unwrap();
        assert!(record.checkpoint.is_some());
        assert_eq!(
            record.rollback,
            Some(RollbackStatus::RolledBack { restored: 1 })
        );
        assert_eq!(std::fs::read_to_string(&sshd).unwrap(), "PermitRootLogin yes\n");
    }

    #[tokio::test]
    async fn test_auto_rollback_disabled_keeps_changes() {
        let root = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_system_root(root.path());
        settings.auto_rollback = false;
        let sshd = root.path().join("etc/ssh/sshd_config");
        std::fs::create_dir_all(sshd.parent().unwrap()).unwrap();
        std::fs::write(&sshd, "PermitRootLogin yes\n").unwrap();
        let runner = RecordingRunner::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Box<dyn ProvisionStep>> = vec![Box::new(FakeStep {
            name: "07-security",
            critical: false,
            checkpoint: true,
            fail: true,
            runs: Arc::clone(&runs),
        })];
        let report = Provisioner::new(&settings, &runner)
            .run_steps(InstallMode::Minimal, steps)
            .await;

        assert!(report.step("07-security").unwrap().rollback.is_none());
        assert_eq!(std::fs::read_to_string(&sshd).unwrap(), "PermitRootLogin no\n");
    }

    #[tokio::test]
    async fn test_dry_run_takes_no_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_system_root(root.path());
        settings.dry_run = true;
        let runner = RecordingRunner::new();

        let report = Provisioner::new(&settings, &runner)
            .run(InstallMode::NginxOnly)
            .await;

        assert!(report.is_success(), "{:?}", report.steps);
        assert!(report.checkpoints().is_empty());
        assert!(!settings.paths.backup_root.exists());
        assert!(!root.path().join("etc/nginx/sites-available/default").exists());
        assert!(runner.count_matching("nginx -t") >= 1);
    }
}
