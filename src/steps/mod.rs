// file: src/steps/mod.rs
// version: 2.0.0
// guid: h8i9j0k1-l2m3-4567-8901-bcdef234567

//! Provisioning steps and the mode → step registry

use crate::config::{InstallMode, Settings};
use crate::utils::command::{Cmd, CommandRunner};
use crate::utils::retry::execute_with_retry;
use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub mod monitoring;
pub mod nginx;
pub mod nodejs;
pub mod optimization;
pub mod prerequisites;
pub mod python;
pub mod security;
pub mod shell;
pub mod users;
pub mod validation;

/// Context passed to each provisioning step
pub struct StepContext<'a> {
    /// Current run session ID
    pub session_id: Uuid,

    /// Run settings
    pub settings: &'a Settings,

    /// Executes external commands
    pub runner: &'a dyn CommandRunner,

    /// Current step number (1-based)
    pub step_number: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Names of all steps selected for this run, in order
    pub selected: &'a [&'static str],
}

/// A named provisioning step
#[async_trait::async_trait]
pub trait ProvisionStep: Send + Sync {
    /// Stable step name, e.g. `07-security`
    fn name(&self) -> &'static str;

    /// Get a description of what this step does
    fn description(&self) -> &'static str;

    /// Execute the step
    async fn run(&self, ctx: &StepContext<'_>) -> Result<()>;

    /// A failing critical step aborts the run
    fn critical(&self) -> bool {
        false
    }

    /// Take a checkpoint before running
    fn checkpoint(&self) -> bool {
        false
    }

    /// Commands the step makes available to the primary user
    fn provided_commands(&self) -> &'static [&'static str] {
        &[]
    }

    /// Services the step leaves running
    fn services(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Every step, in execution order
pub fn all_steps() -> Vec<Box<dyn ProvisionStep>> {
    vec![
        Box::new(prerequisites::PrerequisitesStep),
        Box::new(users::UsersStep),
        Box::new(shell::ShellStep),
        Box::new(nodejs::NodejsStep),
        Box::new(python::PythonStep),
        Box::new(nginx::NginxStep),
        Box::new(security::SecurityStep),
        Box::new(monitoring::MonitoringStep),
        Box::new(optimization::OptimizationStep),
        Box::new(validation::ValidationStep),
    ]
}

/// Step names selected by a mode
pub fn step_names(mode: InstallMode) -> &'static [&'static str] {
    match mode {
        InstallMode::Full => &[
            "01-prerequisites",
            "02-users",
            "03-shell",
            "04-nodejs",
            "05-python",
            "06-nginx",
            "07-security",
            "08-monitoring",
            "09-optimization",
            "10-validation",
        ],
        InstallMode::NginxOnly => &["01-prerequisites", "06-nginx", "07-security", "10-validation"],
        InstallMode::DevOnly => &[
            "01-prerequisites",
            "02-users",
            "03-shell",
            "04-nodejs",
            "05-python",
            "10-validation",
        ],
        InstallMode::Minimal => &["01-prerequisites", "02-users", "07-security", "10-validation"],
    }
}

/// Steps selected by a mode, in execution order
pub fn steps_for(mode: InstallMode) -> Vec<Box<dyn ProvisionStep>> {
    let names = step_names(mode);
    all_steps()
        .into_iter()
        .filter(|step| names.contains(&step.name()))
        .collect()
}

/// Look up a step by name
pub fn step_by_name(name: &str) -> Option<Box<dyn ProvisionStep>> {
    all_steps().into_iter().find(|step| step.name() == name)
}

/// Reject values that would need quoting inside a generated shell script
pub(crate) fn ensure_shell_safe(value: &str, what: &str) -> Result<()> {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@/._-*:=+".contains(c));
    if !safe {
        anyhow::bail!("Refusing unsafe {} '{}' in shell command", what, value);
    }
    Ok(())
}

impl<'a> StepContext<'a> {
    /// Whether file writes are suppressed
    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Map a system path onto the configured root
    pub fn live_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.settings.live_path(path.as_ref())
    }

    /// Home directory of the primary user, as a system path
    pub fn home(&self) -> PathBuf {
        self.settings.home_dir()
    }

    pub fn user(&self) -> &str {
        &self.settings.primary_user
    }

    /// Run a command, failing on a non-zero exit
    pub async fn run(&self, cmd: Cmd, context: &str) -> Result<String> {
        debug!("{}: {}", context, cmd);
        self.runner
            .run_checked(&cmd)
            .await
            .with_context(|| format!("Failed to {}", context))
    }

    /// Run a command under the configured retry policy
    pub async fn run_with_retry(&self, cmd: Cmd, context: &str) -> Result<String> {
        let retry = &self.settings.retry;
        let output = execute_with_retry(
            self.runner,
            &cmd,
            retry.max_attempts,
            Duration::from_secs(retry.delay_secs),
            context,
        )
        .await
        .with_context(|| format!("Failed to {}", context))?;
        Ok(output.stdout)
    }

    /// Install packages with `apt-get`, retrying transient failures
    pub async fn apt_install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Installing packages: {}", packages.join(" "));
        let cmd = Cmd::apt_get(["install", "-y", "--no-install-recommends"])
            .args(packages.iter().cloned());
        self.run_with_retry(cmd, "install packages").await?;
        Ok(())
    }

    /// Write a file under the system root with the given mode
    pub async fn write_file(&self, path: &str, content: &str, mode: u32) -> Result<()> {
        let live = self.live_path(path);
        if self.dry_run() {
            info!(
                "DRY RUN: would write {} ({} bytes, mode {:o})",
                path,
                content.len(),
                mode
            );
            return Ok(());
        }

        if let Some(parent) = live.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for {}", path))?;
        }
        tokio::fs::write(&live, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path))?;
        tokio::fs::set_permissions(&live, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("Failed to set permissions on {}", path))?;
        debug!("Wrote {}", path);
        Ok(())
    }

    /// Write a file and hand it to the primary user
    pub async fn write_user_file(&self, path: &Path, content: &str, mode: u32) -> Result<()> {
        let display = path.display().to_string();
        self.write_file(&display, content, mode).await?;
        self.chown_to_user(path).await
    }

    /// Read a file under the system root; `None` when it does not exist
    pub async fn read_file(&self, path: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.live_path(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read file: {}", path)),
        }
    }

    /// Create a directory under the system root
    pub async fn ensure_dir(&self, path: &str, mode: u32) -> Result<()> {
        if self.dry_run() {
            info!("DRY RUN: would create directory {}", path);
            return Ok(());
        }
        let live = self.live_path(path);
        tokio::fs::create_dir_all(&live)
            .await
            .with_context(|| format!("Failed to create directory: {}", path))?;
        tokio::fs::set_permissions(&live, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("Failed to set permissions on {}", path))?;
        Ok(())
    }

    /// `chown user:user` a path under the system root
    pub async fn chown_to_user(&self, path: &Path) -> Result<()> {
        let owner = format!("{0}:{0}", self.user());
        let live = self.live_path(path);
        self.run(
            Cmd::new("chown").arg(owner).arg(live.display().to_string()),
            &format!("change owner of {}", path.display()),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::utils::command::RecordingRunner;

    /// Build a context over a temp system root with a recording runner
    pub fn context<'a>(
        settings: &'a Settings,
        runner: &'a RecordingRunner,
        selected: &'a [&'static str],
    ) -> StepContext<'a> {
        StepContext {
            session_id: Uuid::new_v4(),
            settings,
            runner,
            step_number: 1,
            total_steps: selected.len().max(1),
            selected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;
    use crate::utils::command::RecordingRunner;

    #[test]
    fn test_full_mode_runs_every_step_in_order() {
        let names: Vec<&str> = steps_for(InstallMode::Full).iter().map(|s| s.name()).collect();
        assert_eq!(names, step_names(InstallMode::Full));
        assert_eq!(names.len(), 10);
        assert_eq!(names.first(), Some(&"01-prerequisites"));
        assert_eq!(names.last(), Some(&"10-validation"));
    }

    #[test]
    fn test_mode_tables_reference_known_steps() {
        for mode in InstallMode::ALL {
            let steps = steps_for(mode);
            assert_eq!(steps.len(), step_names(mode).len(), "mode {}", mode);
            assert_eq!(steps.last().map(|s| s.name()), Some("10-validation"));
        }
    }

    #[test]
    fn test_risky_steps_take_checkpoints() {
        let flagged: Vec<&str> = all_steps()
            .iter()
            .filter(|s| s.checkpoint())
            .map(|s| s.name())
            .collect();
        assert_eq!(flagged, vec!["06-nginx", "07-security", "09-optimization"]);
    }

    #[test]
    fn test_step_by_name() {
        assert_eq!(step_by_name("05-python").unwrap().name(), "05-python");
        assert!(step_by_name("11-extra").is_none());
    }

    #[tokio::test]
    async fn test_write_file_under_root() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();
        let ctx = context(&settings, &runner, &[]);

        ctx.write_file("/etc/example.conf", "key=value\n", 0o640)
            .await
            .unwrap();

        let live = root.path().join("etc/example.conf");
        assert_eq!(std::fs::read_to_string(&live).unwrap(), "key=value\n");
        assert_eq!(
            std::fs::metadata(&live).unwrap().permissions().mode() & 0o777,
            0o640
        );
        assert_eq!(
            ctx.read_file("/etc/example.conf").await.unwrap().as_deref(),
            Some("key=value\n")
        );
        assert!(ctx.read_file("/etc/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_system_root(root.path());
        settings.dry_run = true;
        let runner = RecordingRunner::new();
        let ctx = context(&settings, &runner, &[]);

        ctx.write_file("/etc/example.conf", "x", 0o644).await.unwrap();
        ctx.ensure_dir("/opt/app", 0o755).await.unwrap();

        assert!(!root.path().join("etc/example.conf").exists());
        assert!(!root.path().join("opt/app").exists());
    }

    #[tokio::test]
    async fn test_apt_install_skips_empty_list() {
        let settings = Settings::default();
        let runner = RecordingRunner::new();
        let ctx = context(&settings, &runner, &[]);

        ctx.apt_install(&[]).await.unwrap();
        ctx.apt_install(&["nginx".to_string()]).await.unwrap();

        assert_eq!(
            runner.recorded_lines(),
            vec!["DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends nginx"]
        );
    }
}
