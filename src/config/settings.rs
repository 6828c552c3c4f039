// file: src/config/settings.rs
// version: 1.0.0
// guid: 3f6c2a91-8d4e-4b7a-9e15-0c2d7f8a6b43

//! Run settings shared by every provisioning component

use super::InstallMode;
use crate::security::ValidationUtils;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Default character set for generated passwords
pub const DEFAULT_PASSWORD_CHARSET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#%^&*-_=+";

/// Configuration for a provisioning run.
///
/// Constructed once at startup from defaults, an optional YAML profile,
/// environment overrides and CLI flags, then passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Installation mode selecting the steps to run
    pub mode: InstallMode,
    /// Account that owns the development tooling
    pub primary_user: String,
    /// Git identity for the primary user
    pub git_name: Option<String>,
    pub git_email: Option<String>,
    /// SSH public key installed for the primary user
    pub ssh_public_key: Option<String>,
    /// Path to read the SSH public key from when no key is given inline
    pub ssh_public_key_file: Option<String>,
    pub hostname: Option<String>,
    pub timezone: Option<String>,
    /// Log commands instead of executing them
    pub dry_run: bool,
    /// Skip `apt-get update` / `upgrade`
    pub skip_updates: bool,
    /// Do not ask for confirmation
    pub assume_yes: bool,
    /// Roll a step's checkpoint back when the step fails
    pub auto_rollback: bool,
    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,
    pub paths: PathSettings,
    pub packages: PackageSettings,
    pub versions: VersionSettings,
    pub retry: RetrySettings,
    pub firewall: FirewallSettings,
    pub fail2ban: Fail2banSettings,
    /// Configuration files captured by every checkpoint
    pub checkpoint_files: Vec<PathBuf>,
    pub password_charset: String,
    /// Age in days after which logs are swept by `cleanup`
    pub log_retention_days: u32,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Prefix applied to every live system path
    pub system_root: PathBuf,
    /// Directory holding checkpoint directories
    pub backup_root: PathBuf,
    pub log_dir: PathBuf,
    /// Where helper scripts are installed
    pub scripts_dir: PathBuf,
}

/// Package lists per step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    pub base: Vec<String>,
    pub shell: Vec<String>,
    pub python: Vec<String>,
    pub pip: Vec<String>,
    pub npm_global: Vec<String>,
    pub security: Vec<String>,
    pub monitoring: Vec<String>,
}

/// Version pins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionSettings {
    pub nvm: String,
    pub node: String,
}

/// Retry policy for transient external failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

/// Firewall rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSettings {
    pub ssh_port: u16,
    pub allow_http: bool,
    pub allow_https: bool,
    pub extra_ports: Vec<u16>,
}

/// fail2ban jail parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fail2banSettings {
    pub bantime_secs: u64,
    pub findtime_secs: u64,
    pub maxretry: u32,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: InstallMode::Full,
            primary_user: "ubuntu".to_string(),
            git_name: None,
            git_email: None,
            ssh_public_key: None,
            ssh_public_key_file: None,
            hostname: None,
            timezone: None,
            dry_run: false,
            skip_updates: false,
            assume_yes: false,
            auto_rollback: true,
            command_timeout_secs: 1800,
            paths: PathSettings::default(),
            packages: PackageSettings::default(),
            versions: VersionSettings::default(),
            retry: RetrySettings::default(),
            firewall: FirewallSettings::default(),
            fail2ban: Fail2banSettings::default(),
            checkpoint_files: [
                "/etc/ssh/sshd_config",
                "/etc/fail2ban/jail.local",
                "/etc/default/ufw",
                "/etc/ufw/ufw.conf",
                "/etc/ufw/before.rules",
                "/etc/nginx/nginx.conf",
                "/etc/nginx/sites-available/default",
                "/etc/sysctl.conf",
                "/etc/sysctl.d/99-server-setup.conf",
                "/etc/security/limits.conf",
                "/etc/security/limits.d/99-server-setup.conf",
                "/etc/hosts",
                "/etc/hostname",
                "/etc/environment",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            password_charset: DEFAULT_PASSWORD_CHARSET.to_string(),
            log_retention_days: 30,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            system_root: PathBuf::from("/"),
            backup_root: PathBuf::from("/var/backups/server-setup/checkpoints"),
            log_dir: PathBuf::from("/var/log/setup"),
            scripts_dir: PathBuf::from("/usr/local/bin"),
        }
    }
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            base: strings(&[
                "build-essential",
                "curl",
                "wget",
                "git",
                "unzip",
                "ca-certificates",
                "gnupg",
                "lsb-release",
                "software-properties-common",
                "apt-transport-https",
                "jq",
            ]),
            shell: strings(&["zsh", "tmux", "htop", "tree", "ripgrep", "fzf", "bash-completion"]),
            python: strings(&["python3", "python3-pip", "python3-venv", "python3-dev", "pipx"]),
            pip: strings(&["wheel", "black", "ruff", "pytest", "ipython"]),
            npm_global: strings(&["yarn", "pnpm", "typescript", "pm2"]),
            security: strings(&["ufw", "fail2ban", "unattended-upgrades"]),
            monitoring: strings(&["sysstat", "iotop", "net-tools", "logrotate"]),
        }
    }
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            nvm: "v0.39.7".to_string(),
            node: "lts/*".to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_secs: 5,
        }
    }
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            ssh_port: 22,
            allow_http: true,
            allow_https: true,
            extra_ports: Vec::new(),
        }
    }
}

impl Default for Fail2banSettings {
    fn default() -> Self {
        Self {
            bantime_secs: 3600,
            findtime_secs: 600,
            maxretry: 5,
        }
    }
}

impl Settings {
    /// Settings rooted at an alternate system root, with backups and logs below it
    pub fn with_system_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut settings = Self::default();
        settings.paths.backup_root = root.join("var/backups/server-setup/checkpoints");
        settings.paths.log_dir = root.join("var/log/setup");
        settings.paths.system_root = root;
        settings
    }

    /// Map an absolute system path onto the configured system root
    pub fn live_path(&self, path: &Path) -> PathBuf {
        resolve_under(&self.paths.system_root, path)
    }

    /// Home directory of the primary user, as a system path
    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.primary_user)
    }

    /// Validate settings before any mutation happens
    pub fn validate(&self) -> Result<()> {
        ValidationUtils::validate_username(&self.primary_user)?;

        if let Some(hostname) = &self.hostname {
            ValidationUtils::validate_hostname(hostname)?;
        }
        if let Some(timezone) = &self.timezone {
            ValidationUtils::validate_timezone(timezone)?;
        }
        if let Some(key) = &self.ssh_public_key {
            ValidationUtils::validate_ssh_key(key)?;
        }
        if let Some(email) = &self.git_email {
            ValidationUtils::validate_email(email)?;
        }

        ValidationUtils::validate_port(self.firewall.ssh_port)?;
        for port in &self.firewall.extra_ports {
            ValidationUtils::validate_port(*port)?;
        }

        if self.packages.base.is_empty() {
            return Err(crate::error::SetupError::validation(
                "Base package list cannot be empty",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::error::SetupError::validation(
                "retry.max_attempts must be at least 1",
            ));
        }
        if self.checkpoint_files.iter().any(|p| !p.is_absolute()) {
            return Err(crate::error::SetupError::validation(
                "checkpoint_files must contain absolute paths",
            ));
        }

        Ok(())
    }
}

/// Join an absolute path onto a root, dropping the leading `/` and any `..`
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for component in path.components() {
        if let Component::Normal(part) = component {
            resolved.push(part);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.primary_user, "ubuntu");
        assert_eq!(settings.mode, InstallMode::Full);
        assert!(settings
            .checkpoint_files
            .contains(&PathBuf::from("/etc/ssh/sshd_config")));
    }

    #[test]
    fn test_live_path_under_root() {
        let settings = Settings::with_system_root("/tmp/root");
        assert_eq!(
            settings.live_path(Path::new("/etc/ssh/sshd_config")),
            PathBuf::from("/tmp/root/etc/ssh/sshd_config")
        );
        assert_eq!(
            settings.paths.backup_root,
            PathBuf::from("/tmp/root/var/backups/server-setup/checkpoints")
        );
    }

    #[test]
    fn test_resolve_under_ignores_parent_components() {
        let resolved = resolve_under(Path::new("/srv"), Path::new("/etc/../../passwd"));
        assert_eq!(resolved, PathBuf::from("/srv/etc/passwd"));
    }

    #[test]
    fn test_validate_rejects_bad_user() {
        let mut settings = Settings::default();
        settings.primary_user = "Bad User".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut settings = Settings::default();
        settings.retry.max_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_checkpoint_file() {
        let mut settings = Settings::default();
        settings.checkpoint_files.push(PathBuf::from("etc/hosts"));
        assert!(settings.validate().is_err());
    }
}
