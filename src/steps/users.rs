// file: src/steps/users.rs
// version: 1.0.0
// guid: 7b3e9d21-4f6a-4c58-a0e2-c5d8f1b3a794

//! 02-users: primary account, sudo, SSH key and git identity

use super::{ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use crate::utils::system::SystemUtils;
use anyhow::Result;
use tracing::{debug, info};

pub struct UsersStep;

#[async_trait::async_trait]
impl ProvisionStep for UsersStep {
    fn name(&self) -> &'static str {
        "02-users"
    }

    fn description(&self) -> &'static str {
        "Create the primary user with sudo, SSH key and git identity"
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["sudo", "git"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let user = ctx.user();

        if SystemUtils::user_exists(ctx.runner, user).await? {
            debug!("User {} already exists", user);
        } else {
            info!("Creating user {}", user);
            ctx.run(
                Cmd::new("useradd").args(["-m", "-s", "/bin/bash", user]),
                &format!("create user {}", user),
            )
            .await?;
        }

        ctx.run(
            Cmd::new("usermod").args(["-aG", "sudo", user]),
            "add user to sudo group",
        )
        .await?;

        let sudoers = format!("/etc/sudoers.d/90-{}", user);
        ctx.write_file(&sudoers, &format!("{} ALL=(ALL) NOPASSWD:ALL\n", user), 0o440)
            .await?;
        ctx.run(
            Cmd::new("visudo").args(["-cf"]).arg(ctx.live_path(&sudoers).display().to_string()),
            "validate sudoers entry",
        )
        .await?;

        if let Some(key) = &ctx.settings.ssh_public_key {
            self.install_ssh_key(ctx, key.trim()).await?;
        }

        let mut git_config = vec![("init.defaultBranch", "main".to_string())];
        if let Some(name) = &ctx.settings.git_name {
            git_config.push(("user.name", name.clone()));
        }
        if let Some(email) = &ctx.settings.git_email {
            git_config.push(("user.email", email.clone()));
        }
        for (key, value) in git_config {
            ctx.run(
                Cmd::new("sudo")
                    .args(["-u", user, "-H", "git", "config", "--global", key])
                    .arg(value),
                &format!("set git {}", key),
            )
            .await?;
        }

        Ok(())
    }
}

impl UsersStep {
    async fn install_ssh_key(&self, ctx: &StepContext<'_>, key: &str) -> Result<()> {
        let ssh_dir = ctx.home().join(".ssh");
        let authorized = ssh_dir.join("authorized_keys");

        ctx.ensure_dir(&ssh_dir.display().to_string(), 0o700).await?;
        ctx.chown_to_user(&ssh_dir).await?;

        let existing = ctx
            .read_file(&authorized.display().to_string())
            .await?
            .unwrap_or_default();
        match merge_authorized_key(&existing, key) {
            Some(updated) => {
                ctx.write_user_file(&authorized, &updated, 0o600).await?;
                info!("Installed SSH public key for {}", ctx.user());
            }
            None => debug!("SSH public key already authorized"),
        }
        Ok(())
    }
}

/// Append `key` unless an identical key body is already present
fn merge_authorized_key(existing: &str, key: &str) -> Option<String> {
    let body = key.split_whitespace().nth(1)?;
    let present = existing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(body));
    if present {
        return None;
    }

    let mut updated = existing.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(key);
    updated.push('\n');
    Some(updated)
}
