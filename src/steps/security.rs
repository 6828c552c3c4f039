// file: src/steps/security.rs
// version: 1.1.0
// guid: 7b3e9d15-48a2-4f6c-a0d1-c2e8f5b96a37

//! 07-security: SSH hardening, UFW firewall and fail2ban

use super::{ProvisionStep, StepContext};
use crate::config::settings::{Fail2banSettings, FirewallSettings};
use crate::utils::command::Cmd;
use anyhow::Result;
use tracing::{info, warn};

pub struct SecurityStep;

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

#[async_trait::async_trait]
impl ProvisionStep for SecurityStep {
    fn name(&self) -> &'static str {
        "07-security"
    }

    fn description(&self) -> &'static str {
        "Harden SSH, enable the firewall and configure fail2ban"
    }

    fn checkpoint(&self) -> bool {
        true
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["ufw", "fail2ban-client"]
    }

    fn services(&self) -> &'static [&'static str] {
        &["ssh", "fail2ban"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let settings = ctx.settings;
        ctx.apt_install(&settings.packages.security).await?;

        let key_configured = settings.ssh_public_key.is_some();
        if !key_configured {
            warn!("No SSH public key configured; leaving password authentication enabled");
        }

        let current = ctx.read_file(SSHD_CONFIG).await?.unwrap_or_default();
        let hardened = harden_sshd_config(&current, key_configured, settings.firewall.ssh_port);
        if hardened != current {
            ctx.write_file(SSHD_CONFIG, &hardened, 0o644).await?;
        }
        let live_config = ctx.live_path(SSHD_CONFIG).display().to_string();
        ctx.run(
            Cmd::new("sshd").args(["-t".to_string(), "-f".to_string(), live_config]),
            "validate sshd configuration",
        )
        .await?;

        for rule in ufw_rules(&settings.firewall) {
            ctx.run(Cmd::new("ufw").args(rule), "configure firewall").await?;
        }
        ctx.run(Cmd::new("ufw").args(["--force", "enable"]), "enable firewall")
            .await?;

        let nginx_selected = ctx.selected.contains(&"06-nginx");
        ctx.write_file(
            "/etc/fail2ban/jail.local",
            &render_jail_local(&settings.fail2ban, settings.firewall.ssh_port, nginx_selected),
            0o644,
        )
        .await?;
        ctx.run(Cmd::systemctl(["enable", "fail2ban"]), "enable fail2ban")
            .await?;
        ctx.run(Cmd::systemctl(["restart", "fail2ban"]), "restart fail2ban")
            .await?;

        ctx.run(Cmd::systemctl(["restart", "ssh"]), "restart ssh").await?;
        info!("SSH hardened and firewall enabled");
        Ok(())
    }
}

/// Apply hardening directives to an `sshd_config`.
///
/// sshd keeps the first value it reads for a keyword, and Ubuntu's stock file
/// pulls in `sshd_config.d/*.conf` on its first line. The directives go in as
/// one block before the first active `Include` or `Match` (or at the end);
/// other active settings of the same keywords in the global section are
/// commented out.
fn harden_sshd_config(content: &str, disable_password_auth: bool, port: u16) -> String {
    let mut wanted: Vec<(&str, String)> = vec![
        ("PermitRootLogin", "no".to_string()),
        ("X11Forwarding", "no".to_string()),
        ("MaxAuthTries", "3".to_string()),
    ];
    if disable_password_auth {
        wanted.push(("PasswordAuthentication", "no".to_string()));
    }
    if port != 22 {
        wanted.push(("Port", port.to_string()));
    }
    let block: Vec<String> = wanted
        .iter()
        .map(|(key, value)| format!("{} {}", key, value))
        .collect();

    let mut lines: Vec<String> = Vec::new();
    let mut anchor: Option<usize> = None;
    let mut in_match = false;

    for line in content.lines() {
        let trimmed = line.trim();
        let keyword = trimmed.split_whitespace().next().unwrap_or("");
        if in_match || keyword.is_empty() || trimmed.starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        if keyword.eq_ignore_ascii_case("Match") {
            in_match = true;
            anchor.get_or_insert(lines.len());
        } else if keyword.eq_ignore_ascii_case("Include") {
            anchor.get_or_insert(lines.len());
        } else if wanted.iter().any(|(key, _)| key.eq_ignore_ascii_case(keyword)) {
            // Our own block from an earlier run is re-added below
            if !block.iter().any(|b| b == trimmed) {
                lines.push(format!("#{}", trimmed));
            }
            continue;
        }
        lines.push(line.to_string());
    }

    let at = anchor.unwrap_or(lines.len());
    lines.splice(at..at, block);
    lines.join("\n") + "\n"
}

fn ufw_rules(firewall: &FirewallSettings) -> Vec<Vec<String>> {
    let mut rules: Vec<Vec<String>> = vec![
        vec!["default".into(), "deny".into(), "incoming".into()],
        vec!["default".into(), "allow".into(), "outgoing".into()],
        vec!["allow".into(), format!("{}/tcp", firewall.ssh_port)],
    ];
    if firewall.allow_http {
        rules.push(vec!["allow".into(), "80/tcp".into()]);
    }
    if firewall.allow_https {
        rules.push(vec!["allow".into(), "443/tcp".into()]);
    }
    for port in &firewall.extra_ports {
        rules.push(vec!["allow".into(), format!("{}/tcp", port)]);
    }
    rules
}

fn render_jail_local(fail2ban: &Fail2banSettings, ssh_port: u16, nginx: bool) -> String {
    let mut jail = format!(
        "# Managed by server-setup\n\
         [DEFAULT]\n\
         bantime = {}\n\
         findtime = {}\n\
         maxretry = {}\n\
         backend = systemd\n\
         \n\
         [sshd]\n\
         enabled = true\n\
         port = {}\n",
        fail2ban.bantime_secs, fail2ban.findtime_secs, fail2ban.maxretry, ssh_port
    );
    if nginx {
        jail.push_str(
            "\n[nginx-http-auth]\n\
             enabled = true\n\
             port = http,https\n\
             logpath = /var/log/nginx/error.log\n",
        );
    }
    jail
}
