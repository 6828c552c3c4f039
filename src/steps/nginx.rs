// file: src/steps/nginx.rs
// version: 1.0.0
// guid: c8e2b4a1-6f93-4d07-b5a2-9d1f3e7c0b46

//! 06-nginx: web server with a default site and health endpoint

use super::{ProvisionStep, StepContext};
use crate::utils::command::Cmd;
use crate::utils::system::SystemUtils;
use anyhow::Result;
use tracing::debug;

pub struct NginxStep;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Server ready</title></head>
<body><h1>Server provisioned</h1></body>
</html>
"#;

#[async_trait::async_trait]
impl ProvisionStep for NginxStep {
    fn name(&self) -> &'static str {
        "06-nginx"
    }

    fn description(&self) -> &'static str {
        "Install Nginx and configure the default site"
    }

    fn checkpoint(&self) -> bool {
        true
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["nginx"]
    }

    fn services(&self) -> &'static [&'static str] {
        &["nginx"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        if SystemUtils::package_installed(ctx.runner, "nginx").await? {
            debug!("Nginx already installed");
        } else {
            ctx.apt_install(&["nginx".to_string()]).await?;
        }

        let server_name = ctx.settings.hostname.as_deref().unwrap_or("_");
        ctx.write_file(
            "/etc/nginx/sites-available/default",
            &render_default_site(server_name),
            0o644,
        )
        .await?;

        if ctx.read_file("/var/www/html/index.html").await?.is_some() {
            debug!("Keeping existing index.html");
        } else {
            ctx.write_file("/var/www/html/index.html", INDEX_HTML, 0o644)
                .await?;
        }

        let enabled = ctx.live_path("/etc/nginx/sites-enabled/default");
        let available = ctx.live_path("/etc/nginx/sites-available/default");
        ctx.run(
            Cmd::new("ln").args([
                "-sfn".to_string(),
                available.display().to_string(),
                enabled.display().to_string(),
            ]),
            "enable default site",
        )
        .await?;

        ctx.run(Cmd::new("nginx").arg("-t"), "validate Nginx configuration")
            .await?;
        ctx.run(Cmd::systemctl(["enable", "--now", "nginx"]), "enable Nginx")
            .await?;
        ctx.run(Cmd::systemctl(["reload", "nginx"]), "reload Nginx")
            .await?;
        Ok(())
    }
}

fn render_default_site(server_name: &str) -> String {
    format!(
        r#"# Managed by server-setup
server {{
    listen 80 default_server;
    listen [::]:80 default_server;

    server_name {server_name};
    root /var/www/html;
    index index.html;

    server_tokens off;
    add_header X-Frame-Options SAMEORIGIN always;
    add_header X-Content-Type-Options nosniff always;
    add_header Referrer-Policy strict-origin-when-cross-origin always;

    location = /health {{
        access_log off;
        default_type text/plain;
        return 200 "ok\n";
    }}

    location / {{
        try_files $uri $uri/ =404;
    }}

    location ~ /\. {{
        deny all;
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::steps::test_support::context;
    use crate::utils::command::RecordingRunner;

    #[test]
    fn test_render_default_site() {
        let site = render_default_site("web01.example.com");
        assert!(site.contains("server_name web01.example.com;"));
        assert!(site.contains("location = /health {"));
        assert!(site.contains("try_files $uri $uri/ =404;"));
    }

    #[tokio::test]
    async fn test_validates_before_reload() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();

        NginxStep
            .run(&context(&settings, &runner, &[]))
            .await
            .unwrap();

        let lines = runner.recorded_lines();
        let test_at = lines.iter().position(|l| l == "nginx -t").unwrap();
        let reload_at = lines
            .iter()
            .position(|l| l == "systemctl reload nginx")
            .unwrap();
        assert!(test_at < reload_at);

        let site = std::fs::read_to_string(root.path().join("etc/nginx/sites-available/default")).unwrap();
        assert!(site.contains("server_name _;"));
        assert!(root.path().join("var/www/html/index.html").exists());
    }
}
