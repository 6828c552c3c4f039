// file: src/steps/python.rs
// version: 1.0.0
// guid: 9f4a2e67-c3b1-4d85-a7f9-0b6e3c1d5a28

//! 05-python: Python toolchain and a default virtualenv for the primary user

use super::{ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use anyhow::Result;
use tracing::debug;

pub struct PythonStep;

#[async_trait::async_trait]
impl ProvisionStep for PythonStep {
    fn name(&self) -> &'static str {
        "05-python"
    }

    fn description(&self) -> &'static str {
        "Install Python, pip and a default virtualenv"
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["python3", "pip3"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.apt_install(&ctx.settings.packages.python).await?;

        let user = ctx.user();
        let venv = ctx.home().join(".venvs").join("default");
        let venv_str = venv.display().to_string();
        let pip = venv.join("bin").join("pip").display().to_string();

        if ctx.live_path(venv.join("bin").join("python")).exists() {
            debug!("Virtualenv {} already exists", venv_str);
        } else {
            ctx.run(
                Cmd::new("sudo").args(["-u", user, "-H", "python3", "-m", "venv", venv_str.as_str()]),
                "create virtualenv",
            )
            .await?;
        }

        ctx.run_with_retry(
            Cmd::new("sudo").args(["-u", user, "-H", pip.as_str(), "install", "--upgrade", "pip"]),
            "upgrade pip",
        )
        .await?;

        let packages = &ctx.settings.packages.pip;
        if !packages.is_empty() {
            ctx.run_with_retry(
                Cmd::new("sudo")
                    .args(["-u", user, "-H", pip.as_str(), "install"])
                    .args(packages.iter().cloned()),
                "install pip packages",
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::steps::test_support::context;
    use crate::utils::command::RecordingRunner;

    #[tokio::test]
    async fn test_creates_venv_and_installs_packages() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();

        PythonStep
            .run(&context(&settings, &runner, &[]))
            .await
            .unwrap();

        assert_eq!(
            runner.count_matching("python3 -m venv /home/ubuntu/.venvs/default"),
            1
        );
        assert_eq!(
            runner.count_matching("/home/ubuntu/.venvs/default/bin/pip install wheel black"),
            1
        );
    }

    #[tokio::test]
    async fn test_existing_venv_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let bin = root.path().join("home/ubuntu/.venvs/default/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("python"), "").unwrap();
        let runner = RecordingRunner::new();

        PythonStep
            .run(&context(&settings, &runner, &[]))
            .await
            .unwrap();

        assert_eq!(runner.count_matching("-m venv"), 0);
        assert_eq!(runner.count_matching("install --upgrade pip"), 1);
    }
}
