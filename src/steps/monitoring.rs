// file: src/steps/monitoring.rs
// version: 1.0.0
// guid: 0e6a4c92-d7f1-4b38-95c6-8a2f1b3d7e04

//! 08-monitoring: status scripts, a cron schedule and log rotation

use super::{ProvisionStep, StepContext};
use anyhow::Result;

pub struct MonitoringStep;

const SYSTEM_STATUS: &str = r#"#!/usr/bin/env bash
# Managed by server-setup
set -euo pipefail

echo "=== $(hostname) @ $(date -Is) ==="
echo
echo "--- uptime ---"
uptime
echo
echo "--- memory ---"
free -h
echo
echo "--- disk ---"
df -h -x tmpfs -x devtmpfs
echo
echo "--- services ---"
for unit in nginx ssh fail2ban; do
    printf '%-10s %s\n' "$unit" "$(systemctl is-active "$unit" 2>/dev/null || true)"
done
echo
echo "--- listening ports ---"
ss -tuln | tail -n +2
"#;

const PERFORMANCE_REPORT: &str = r#"#!/usr/bin/env bash
# Managed by server-setup
set -euo pipefail

REPORT_DIR="${REPORT_DIR:-/var/log/setup}"
mkdir -p "$REPORT_DIR"
REPORT="$REPORT_DIR/performance-$(date +%Y%m%d).log"

{
    echo "=== performance report $(date -Is) ==="
    echo "--- load ---"
    cat /proc/loadavg
    echo "--- cpu ---"
    mpstat 1 3 2>/dev/null || top -bn1 | head -15
    echo "--- io ---"
    iostat -x 1 2 2>/dev/null || true
    echo "--- top memory ---"
    ps aux --sort=-%mem | head -10
} >> "$REPORT"
"#;

const HEALTH_CHECK_API: &str = r#"#!/usr/bin/env bash
# Managed by server-setup
# Prints a JSON health summary; exits non-zero when a service is down.
set -uo pipefail

status=0
services=""
for unit in nginx ssh fail2ban; do
    if systemctl list-unit-files "$unit.service" --no-legend 2>/dev/null | grep -q .; then
        state="$(systemctl is-active "$unit" 2>/dev/null || true)"
        [ "$state" = "active" ] || status=1
        services="$services\"$unit\":\"$state\","
    fi
done

disk="$(df --output=pcent / | tail -1 | tr -dc '0-9')"
load="$(cut -d' ' -f1 /proc/loadavg)"

printf '{"host":"%s","services":{%s},"disk_used_percent":%s,"load":%s}\n' \
    "$(hostname)" "${services%,}" "${disk:-0}" "${load:-0}"
exit "$status"
"#;

const LOGROTATE: &str = r#"# Managed by server-setup
/var/log/setup/*.log {
    weekly
    rotate 8
    compress
    delaycompress
    missingok
    notifempty
    create 0640 root adm
}
"#;

#[async_trait::async_trait]
impl ProvisionStep for MonitoringStep {
    fn name(&self) -> &'static str {
        "08-monitoring"
    }

    fn description(&self) -> &'static str {
        "Install monitoring tools, status scripts and log rotation"
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["iostat", "system-status.sh", "health-check-api.sh"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.apt_install(&ctx.settings.packages.monitoring).await?;

        let scripts = &ctx.settings.paths.scripts_dir;
        for (name, body) in [
            ("system-status.sh", SYSTEM_STATUS),
            ("performance-report.sh", PERFORMANCE_REPORT),
            ("health-check-api.sh", HEALTH_CHECK_API),
        ] {
            let path = scripts.join(name).display().to_string();
            ctx.write_file(&path, body, 0o755).await?;
        }

        ctx.write_file(
            "/etc/cron.d/server-setup-monitoring",
            &render_cron(&scripts.display().to_string()),
            0o644,
        )
        .await?;
        ctx.write_file("/etc/logrotate.d/server-setup", LOGROTATE, 0o644)
            .await?;
        Ok(())
    }
}

fn render_cron(scripts_dir: &str) -> String {
    format!(
        "# Managed by server-setup\n\
         SHELL=/bin/bash\n\
         PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin\n\
         0 * * * * root {dir}/performance-report.sh >/dev/null 2>&1\n\
         */5 * * * * root {dir}/health-check-api.sh >/var/log/setup/health.json 2>&1\n",
        dir = scripts_dir.trim_end_matches('/')
    )
}
