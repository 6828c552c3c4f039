// file: src/steps/prerequisites.rs
// version: 1.0.0
// guid: 2a8f5c13-9e6d-4b07-8c41-d3f7a0b9e652

//! 01-prerequisites: package index, base packages, hostname and timezone

use super::{ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use anyhow::Result;
use tracing::info;

pub struct PrerequisitesStep;

#[async_trait::async_trait]
impl ProvisionStep for PrerequisitesStep {
    fn name(&self) -> &'static str {
        "01-prerequisites"
    }

    fn description(&self) -> &'static str {
        "Update the system and install base packages"
    }

    fn critical(&self) -> bool {
        true
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["curl", "git", "jq"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let settings = ctx.settings;

        if settings.skip_updates {
            info!("Skipping package updates");
        } else {
            ctx.run_with_retry(Cmd::apt_get(["update"]), "update package lists")
                .await?;
            ctx.run_with_retry(
                Cmd::apt_get(["-o", "Dpkg::Options::=--force-confold", "upgrade", "-y"]),
                "upgrade packages",
            )
            .await?;
        }

        ctx.apt_install(&settings.packages.base).await?;

        if let Some(hostname) = &settings.hostname {
            ctx.run(
                Cmd::new("hostnamectl").args(["set-hostname", hostname.as_str()]),
                "set hostname",
            )
            .await?;

            let hosts = ctx.read_file("/etc/hosts").await?.unwrap_or_default();
            if let Some(updated) = hosts_with_hostname(&hosts, hostname) {
                ctx.write_file("/etc/hosts", &updated, 0o644).await?;
            }
        }

        if let Some(timezone) = &settings.timezone {
            ctx.run(
                Cmd::new("timedatectl").args(["set-timezone", timezone.as_str()]),
                "set timezone",
            )
            .await?;
        }

        Ok(())
    }
}

/// Point `127.0.1.1` at `hostname`; `None` when the file already does
fn hosts_with_hostname(hosts: &str, hostname: &str) -> Option<String> {
    let wanted = format!("127.0.1.1\t{}", hostname);
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();

    for line in hosts.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() == Some("127.0.1.1") {
            if fields.any(|f| f == hostname) {
                return None;
            }
            if !replaced {
                lines.push(wanted.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }

    if !replaced {
        lines.push(wanted);
    }
    Some(lines.join("\n") + "\n")
}
