// file: src/steps/nodejs.rs
// version: 1.0.0
// guid: 3d6f0b82-a15e-4c97-b8d3-1e7c9a4f2b60

//! 04-nodejs: NVM, a pinned Node.js release and global npm packages

use super::{ensure_shell_safe, ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use anyhow::Result;
use tracing::{debug, info};

pub struct NodejsStep;

const NVM_INSTALL_URL: &str = "https://raw.githubusercontent.com/nvm-sh/nvm";
const LOAD_NVM: &str = r#"export NVM_DIR="$HOME/.nvm"; . "$NVM_DIR/nvm.sh""#;

#[async_trait::async_trait]
impl ProvisionStep for NodejsStep {
    fn name(&self) -> &'static str {
        "04-nodejs"
    }

    fn description(&self) -> &'static str {
        "Install NVM, Node.js and global npm packages"
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["node", "npm"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let versions = &ctx.settings.versions;
        ensure_shell_safe(&versions.nvm, "NVM version")?;
        ensure_shell_safe(&versions.node, "Node.js version")?;
        for package in &ctx.settings.packages.npm_global {
            ensure_shell_safe(package, "npm package")?;
        }

        let nvm_present = ctx
            .runner
            .run(&Cmd::as_user(ctx.user(), r#"test -s "$HOME/.nvm/nvm.sh""#))
            .await?
            .success();

        if nvm_present {
            debug!("NVM already installed for {}", ctx.user());
        } else {
            info!("Installing NVM {}", versions.nvm);
            ctx.run_with_retry(
                Cmd::as_user(
                    ctx.user(),
                    format!(
                        "curl -fsSL {}/{}/install.sh | bash",
                        NVM_INSTALL_URL, versions.nvm
                    ),
                ),
                "install NVM",
            )
            .await?;
        }

        ctx.run_with_retry(
            Cmd::as_user(
                ctx.user(),
                format!(
                    "{} && nvm install '{node}' && nvm alias default '{node}'",
                    LOAD_NVM,
                    node = versions.node
                ),
            ),
            "install Node.js",
        )
        .await?;

        let packages = &ctx.settings.packages.npm_global;
        if !packages.is_empty() {
            ctx.run_with_retry(
                Cmd::as_user(
                    ctx.user(),
                    format!("{} && npm install -g {}", LOAD_NVM, packages.join(" ")),
                ),
                "install global npm packages",
            )
            .await?;
        }

        Ok(())
    }
}
