// file: src/steps/optimization.rs
// version: 1.0.0
// guid: 5c9d1e38-a2b7-4f60-8e14-d3a6b0c7f291

//! 09-optimization: kernel and resource limit tuning

use super::{ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use anyhow::Result;

pub struct OptimizationStep;

const SYSCTL_CONF: &str = "/etc/sysctl.d/99-server-setup.conf";
const LIMITS_CONF: &str = "/etc/security/limits.d/99-server-setup.conf";

const SYSCTL_TUNING: &[(&str, &str)] = &[
    ("fs.file-max", "2097152"),
    ("fs.inotify.max_user_watches", "524288"),
    ("vm.swappiness", "10"),
    ("vm.dirty_ratio", "15"),
    ("vm.dirty_background_ratio", "5"),
    ("net.core.somaxconn", "65535"),
    ("net.core.netdev_max_backlog", "16384"),
    ("net.ipv4.tcp_max_syn_backlog", "8192"),
    ("net.ipv4.tcp_fin_timeout", "15"),
    ("net.ipv4.tcp_tw_reuse", "1"),
    ("net.ipv4.ip_local_port_range", "1024 65535"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.all.accept_redirects", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
];

#[async_trait::async_trait]
impl ProvisionStep for OptimizationStep {
    fn name(&self) -> &'static str {
        "09-optimization"
    }

    fn description(&self) -> &'static str {
        "Tune kernel parameters and open file limits"
    }

    fn checkpoint(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.write_file(SYSCTL_CONF, &render_sysctl(), 0o644).await?;
        ctx.write_file(LIMITS_CONF, &render_limits(ctx.user()), 0o644)
            .await?;
        ctx.run(Cmd::new("sysctl").arg("--system"), "apply kernel parameters")
            .await?;
        Ok(())
    }
}

fn render_sysctl() -> String {
    let mut out = String::from("# Managed by server-setup\n");
    for (key, value) in SYSCTL_TUNING {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    out
}

fn render_limits(user: &str) -> String {
    format!(
        "# Managed by server-setup\n\
         *       soft    nofile  65535\n\
         *       hard    nofile  65535\n\
         {user}  soft    nproc   65535\n\
         {user}  hard    nproc   65535\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::steps::test_support::context;
    use crate::utils::command::RecordingRunner;

    #[test]
    fn test_render_sysctl() {
        let conf = render_sysctl();
        assert!(conf.contains("vm.swappiness = 10\n"));
        assert!(conf.contains("net.ipv4.ip_local_port_range = 1024 65535\n"));
    }

    #[tokio::test]
    async fn test_writes_tuning_and_applies() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();

        OptimizationStep
            .run(&context(&settings, &runner, &[]))
            .await
            .unwrap();

        assert!(root.path().join("etc/sysctl.d/99-server-setup.conf").exists());
        let limits = std::fs::read_to_string(root.path().join("etc/security/limits.d/99-server-setup.conf")).unwrap();
        assert!(limits.contains("ubuntu  soft    nproc   65535"));
        assert_eq!(runner.recorded_lines(), vec!["sysctl --system"]);
    }
}
