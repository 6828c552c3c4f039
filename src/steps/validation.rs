// file: src/steps/validation.rs
// version: 1.0.0
// guid: f2a7c5e9-0b14-4d83-9c6a-71e3d8b4a0f5

//! 10-validation: verify what the selected steps promised

use super::{step_by_name, ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use crate::utils::retry::{wait_for_port, wait_for_service};
use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

pub struct ValidationStep;

const SERVICE_TIMEOUT: Duration = Duration::from_secs(30);
const PORT_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait::async_trait]
impl ProvisionStep for ValidationStep {
    fn name(&self) -> &'static str {
        "10-validation"
    }

    fn description(&self) -> &'static str {
        "Verify installed commands, services and listening ports"
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let mut commands: Vec<&'static str> = Vec::new();
        let mut services: Vec<&'static str> = Vec::new();
        for name in ctx.selected.iter().filter(|n| **n != self.name()) {
            if let Some(step) = step_by_name(name) {
                commands.extend(step.provided_commands());
                services.extend(step.services());
            }
        }
        let web = ctx.selected.contains(&"06-nginx");

        let script = render_verify_script(&commands, &services, web);
        let path = ctx
            .settings
            .paths
            .scripts_dir
            .join("verify-setup.sh")
            .display()
            .to_string();
        ctx.write_file(&path, &script, 0o755).await?;

        let mut failures: Vec<String> = Vec::new();

        for command in &commands {
            let found = ctx
                .runner
                .run(&Cmd::as_user(ctx.user(), format!("command -v {}", command)))
                .await
                .map(|o| o.success())
                .unwrap_or(false);
            if !found {
                warn!("Command not available: {}", command);
                failures.push(format!("command {} not found", command));
            }
        }

        for service in &services {
            if let Err(e) = wait_for_service(ctx.runner, service, SERVICE_TIMEOUT, POLL_INTERVAL).await {
                warn!("{}", e);
                failures.push(format!("service {} not active", service));
            }
        }

        if web && !ctx.runner.is_dry_run() {
            if let Err(e) = wait_for_port("127.0.0.1", 80, PORT_TIMEOUT, POLL_INTERVAL).await {
                warn!("{}", e);
                failures.push("port 80 not reachable".to_string());
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("Validation failed: {}", failures.join("; "));
        }

        info!(
            "Validated {} commands and {} services",
            commands.len(),
            services.len()
        );
        Ok(())
    }
}

fn render_verify_script(commands: &[&str], services: &[&str], web: bool) -> String {
    let mut script = String::from(
        "#!/usr/bin/env bash\n\
         # Managed by server-setup\n\
         # Re-runs the post-install checks; exits non-zero on any failure.\n\
         set -u\n\
         failed=0\n\
         check() { if eval \"$2\" >/dev/null 2>&1; then echo \"ok    $1\"; else echo \"FAIL  $1\"; failed=1; fi; }\n\n",
    );
    for command in commands {
        script.push_str(&format!("check 'command {0}' 'command -v {0}'\n", command));
    }
    for service in services {
        script.push_str(&format!(
            "check 'service {0}' 'systemctl is-active --quiet {0}'\n",
            service
        ));
    }
    if web {
        script.push_str("check 'http /health' 'curl -fsS http://127.0.0.1/health'\n");
    }
    script.push_str("exit \"$failed\"\n");
    script
}
