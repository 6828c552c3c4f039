// file: src/config/loader.rs
// version: 2.0.0
// guid: d4e5f6g7-h8i9-0123-4567-890123defghi

//! Configuration file loading, environment variable substitution and overrides

use super::{InstallMode, Settings};
use crate::error::SetupError;
use crate::security::ValidationUtils;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Create a loader that sees only the given variables
    pub fn with_env(env_vars: HashMap<String, String>) -> Self {
        Self { env_vars }
    }

    /// Default profile location: `$XDG_CONFIG_HOME/server-setup/config.yaml`
    pub fn default_profile_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("server-setup").join("config.yaml"))
    }

    /// Load settings from an explicit profile, the default profile, or defaults
    pub fn load(&self, profile: Option<&Path>) -> Result<Settings> {
        let mut settings = match profile {
            Some(path) => self.load_profile(path)?,
            None => match Self::default_profile_path().filter(|p| p.exists()) {
                Some(path) => self.load_profile(&path)?,
                None => {
                    debug!("No configuration profile found, using defaults");
                    Settings::default()
                }
            },
        };

        self.apply_env_overrides(&mut settings)?;
        self.resolve_ssh_key_file(&mut settings)?;
        Ok(settings)
    }

    /// Load a YAML profile
    pub fn load_profile<P: AsRef<Path>>(&self, path: P) -> Result<Settings> {
        let content = fs::read_to_string(&path).map_err(|e| {
            SetupError::config(format!(
                "Failed to read configuration profile {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let settings: Settings = serde_yaml::from_str(&expanded)?;
        info!("Loaded configuration profile {}", path.as_ref().display());
        Ok(settings)
    }

    /// Apply `SETUP_*` environment overrides on top of loaded settings
    pub fn apply_env_overrides(&self, settings: &mut Settings) -> Result<()> {
        if let Some(user) = self.var("SETUP_PRIMARY_USER").or_else(|| self.var("PRIMARY_USER")) {
            settings.primary_user = user;
        }
        if let Some(name) = self.var("SETUP_GIT_NAME") {
            settings.git_name = Some(name);
        }
        if let Some(email) = self.var("SETUP_GIT_EMAIL") {
            settings.git_email = Some(email);
        }
        if let Some(key) = self.var("SETUP_SSH_PUBLIC_KEY") {
            settings.ssh_public_key = Some(key);
        }
        if let Some(hostname) = self.var("SETUP_HOSTNAME") {
            settings.hostname = Some(hostname);
        }
        if let Some(timezone) = self.var("SETUP_TIMEZONE") {
            settings.timezone = Some(timezone);
        }
        if let Some(mode) = self.var("SETUP_MODE") {
            settings.mode = mode.parse::<InstallMode>()?;
        }
        if let Some(port) = self.var("SETUP_SSH_PORT") {
            settings.firewall.ssh_port = ValidationUtils::parse_port(&port)?;
        }
        if let Some(yes) = self.var("SETUP_ASSUME_YES") {
            settings.assume_yes = parse_bool(&yes);
        }
        Ok(())
    }

    /// Read the SSH public key from `ssh_public_key_file` when no key is set inline
    fn resolve_ssh_key_file(&self, settings: &mut Settings) -> Result<()> {
        if settings.ssh_public_key.is_some() {
            return Ok(());
        }
        let Some(file) = &settings.ssh_public_key_file else {
            return Ok(());
        };

        let expanded = shellexpand::tilde(file).into_owned();
        let key = fs::read_to_string(&expanded).map_err(|e| {
            SetupError::config(format!("Failed to read SSH public key {}: {}", expanded, e))
        })?;
        settings.ssh_public_key = Some(key.trim().to_string());
        Ok(())
    }

    fn var(&self, key: &str) -> Option<String> {
        self.env_vars
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Expand environment variables in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| SetupError::config(format!("Invalid regex pattern: {}", e)))?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else if !missing_vars.iter().any(|v| v == var_name) {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(SetupError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn empty_loader() -> ConfigLoader {
        ConfigLoader::with_env(HashMap::new())
    }

    #[test]
    fn test_env_var_expansion() {
        let mut loader = empty_loader();
        loader.set_env_var("TEST_VAR".to_string(), "test_value".to_string());

        let content = "key: ${TEST_VAR}";
        let result = loader.expand_env_vars(content).unwrap();
        assert_eq!(result, "key: test_value");
    }

    #[test]
    fn test_missing_env_var() {
        let loader = empty_loader();
        let content = "key: ${MISSING_VAR}";

        let result = loader.expand_env_vars(content);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing environment variables"));
    }

    #[test]
    fn test_load_profile() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
mode: nginx-only
primary_user: deploy
git_email: ${{GIT_EMAIL}}
firewall:
  ssh_port: 2222
packages:
  pip:
    - httpie
"#
        )
        .unwrap();

        let mut loader = empty_loader();
        loader.set_env_var("GIT_EMAIL".to_string(), "ops@example.com".to_string());
        let settings = loader.load(Some(file.path()))?;

        assert_eq!(settings.mode, InstallMode::NginxOnly);
        assert_eq!(settings.primary_user, "deploy");
        assert_eq!(settings.git_email.as_deref(), Some("ops@example.com"));
        assert_eq!(settings.firewall.ssh_port, 2222);
        assert!(settings.firewall.allow_http);
        assert_eq!(settings.packages.pip, vec!["httpie"]);
        assert!(!settings.packages.base.is_empty());

        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let mut loader = empty_loader();
        loader.set_env_var("PRIMARY_USER".to_string(), "fallback".to_string());
        loader.set_env_var("SETUP_PRIMARY_USER".to_string(), "dev".to_string());
        loader.set_env_var("SETUP_MODE".to_string(), "minimal".to_string());
        loader.set_env_var("SETUP_ASSUME_YES".to_string(), "yes".to_string());
        loader.set_env_var("SETUP_TIMEZONE".to_string(), "Europe/Berlin".to_string());
        loader.set_env_var("SETUP_SSH_PORT".to_string(), "2222".to_string());

        let mut settings = Settings::default();
        loader.apply_env_overrides(&mut settings)?;

        assert_eq!(settings.firewall.ssh_port, 2222);

        assert_eq!(settings.primary_user, "dev");
        assert_eq!(settings.mode, InstallMode::Minimal);
        assert!(settings.assume_yes);
        assert_eq!(settings.timezone.as_deref(), Some("Europe/Berlin"));
        Ok(())
    }

    #[test]
    fn test_invalid_mode_override() {
        let mut loader = empty_loader();
        loader.set_env_var("SETUP_MODE".to_string(), "bogus".to_string());

        let mut settings = Settings::default();
        assert!(loader.apply_env_overrides(&mut settings).is_err());
    }

    #[test]
    fn test_ssh_key_from_file() -> Result<()> {
        let mut key_file = NamedTempFile::new().unwrap();
        writeln!(key_file, "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIG1vY2sga2V5 me@laptop").unwrap();

        let mut settings = Settings::default();
        settings.ssh_public_key_file = Some(key_file.path().display().to_string());
        empty_loader().resolve_ssh_key_file(&mut settings)?;

        assert!(settings
            .ssh_public_key
            .as_deref()
            .unwrap()
            .starts_with("ssh-ed25519 "));
        Ok(())
    }
}
