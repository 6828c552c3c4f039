// file: src/security/validation.rs
// version: 2.0.0
// guid: r8s9t0u1-v2w3-4567-8901-234567rstuvw

//! Input validation utilities

use crate::error::SetupError;
use crate::Result;
use base64::Engine;

/// Utility functions for input validation
pub struct ValidationUtils;

const SSH_KEY_TYPES: [&str; 8] = [
    "ssh-rsa",
    "ssh-dss",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

impl ValidationUtils {
    /// Validate hostname format
    pub fn validate_hostname(hostname: &str) -> Result<()> {
        if hostname.is_empty() {
            return Err(SetupError::validation("Hostname cannot be empty"));
        }

        if hostname.len() > 253 {
            return Err(SetupError::validation(
                "Hostname cannot exceed 253 characters",
            ));
        }

        if !hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(SetupError::validation(
                "Hostname contains invalid characters",
            ));
        }

        for label in hostname.split('.') {
            if label.is_empty() || label.len() > 63 {
                return Err(SetupError::validation(format!(
                    "Invalid hostname label in {}",
                    hostname
                )));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(SetupError::validation(
                    "Hostname labels cannot start or end with hyphen",
                ));
            }
        }

        Ok(())
    }

    /// Validate a TCP port
    pub fn validate_port(port: u16) -> Result<()> {
        if port == 0 {
            return Err(SetupError::validation("Port must be between 1 and 65535"));
        }
        Ok(())
    }

    /// Parse and validate a port given as text
    pub fn parse_port(value: &str) -> Result<u16> {
        let port = value
            .trim()
            .parse::<u16>()
            .map_err(|_| SetupError::validation(format!("Invalid port: {}", value)))?;
        Self::validate_port(port)?;
        Ok(port)
    }

    /// Validate SSH public key format: known type and base64 key body
    pub fn validate_ssh_key(key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SetupError::validation("SSH key cannot be empty"));
        }

        let parts: Vec<&str> = key.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(SetupError::validation("SSH key format is invalid"));
        }

        if !SSH_KEY_TYPES.contains(&parts[0]) {
            return Err(SetupError::validation(format!(
                "Unsupported SSH key type: {}",
                parts[0]
            )));
        }

        base64::engine::general_purpose::STANDARD
            .decode(parts[1])
            .map_err(|_| SetupError::validation("SSH key data is not valid base64"))?;

        Ok(())
    }

    /// Validate username format
    pub fn validate_username(username: &str) -> Result<()> {
        if username.is_empty() {
            return Err(SetupError::validation("Username cannot be empty"));
        }

        if username.len() > 32 {
            return Err(SetupError::validation(
                "Username cannot exceed 32 characters",
            ));
        }

        let first = username.chars().next().unwrap_or('-');
        if !first.is_ascii_lowercase() && first != '_' {
            return Err(SetupError::validation(
                "Username must start with lowercase letter or underscore",
            ));
        }

        if !username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(SetupError::validation(
                "Username contains invalid characters",
            ));
        }

        let reserved = [
            "root", "bin", "daemon", "sys", "sync", "games", "man", "lp", "mail", "news", "uucp",
            "proxy", "www-data", "backup", "list", "irc", "gnats", "nobody",
        ];
        if reserved.contains(&username) {
            return Err(SetupError::validation(format!(
                "Username '{}' is reserved",
                username
            )));
        }

        Ok(())
    }

    /// Validate timezone
    pub fn validate_timezone(timezone: &str) -> Result<()> {
        if timezone.is_empty() {
            return Err(SetupError::validation("Timezone cannot be empty"));
        }

        if matches!(timezone, "UTC" | "GMT" | "Etc/UTC") {
            return Ok(());
        }

        let areas = [
            "Africa/", "America/", "Antarctica/", "Arctic/", "Asia/", "Atlantic/", "Australia/",
            "Europe/", "Indian/", "Pacific/", "Etc/",
        ];
        let well_formed = timezone
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+'));

        if !well_formed || !areas.iter().any(|area| timezone.starts_with(area)) {
            return Err(SetupError::validation(format!(
                "Invalid timezone format: {}",
                timezone
            )));
        }

        Ok(())
    }

    /// Validate an email address (basic shape check)
    pub fn validate_email(email: &str) -> Result<()> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err(SetupError::validation(format!("Invalid email: {}", email)));
        };
        if local.is_empty() || !domain.contains('.') || email.contains(char::is_whitespace) {
            return Err(SetupError::validation(format!("Invalid email: {}", email)));
        }
        Ok(())
    }

    /// Validate a checkpoint name: `[A-Za-z0-9_-]+`
    pub fn validate_checkpoint_name(name: &str) -> Result<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SetupError::validation(format!(
                "Invalid checkpoint name '{}': use letters, digits, '-' and '_' only",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hostname() {
        assert!(ValidationUtils::validate_hostname("server01").is_ok());
        assert!(ValidationUtils::validate_hostname("web-server.example.com").is_ok());
        assert!(ValidationUtils::validate_hostname("").is_err());
        assert!(ValidationUtils::validate_hostname("-invalid").is_err());
        assert!(ValidationUtils::validate_hostname("invalid-").is_err());
        assert!(ValidationUtils::validate_hostname("double..dot").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(ValidationUtils::validate_port(22).is_ok());
        assert!(ValidationUtils::validate_port(0).is_err());
        assert_eq!(ValidationUtils::parse_port("8080").unwrap(), 8080);
        assert!(ValidationUtils::parse_port("70000").is_err());
        assert!(ValidationUtils::parse_port("ssh").is_err());
    }

    #[test]
    fn test_validate_ssh_key() {
        let valid_key = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIG1vY2sga2V5 user@example.com";
        assert!(ValidationUtils::validate_ssh_key(valid_key).is_ok());
        assert!(ValidationUtils::validate_ssh_key("").is_err());
        assert!(ValidationUtils::validate_ssh_key("invalid-key").is_err());
        assert!(ValidationUtils::validate_ssh_key("ssh-foo AAAA").is_err());
        assert!(ValidationUtils::validate_ssh_key("ssh-rsa not*base64!").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(ValidationUtils::validate_username("admin").is_ok());
        assert!(ValidationUtils::validate_username("user_01").is_ok());
        assert!(ValidationUtils::validate_username("test-user").is_ok());
        assert!(ValidationUtils::validate_username("").is_err());
        assert!(ValidationUtils::validate_username("Root").is_err());
        assert!(ValidationUtils::validate_username("1admin").is_err());
        assert!(ValidationUtils::validate_username("root").is_err());
    }

    #[test]
    fn test_validate_timezone() {
        assert!(ValidationUtils::validate_timezone("UTC").is_ok());
        assert!(ValidationUtils::validate_timezone("America/New_York").is_ok());
        assert!(ValidationUtils::validate_timezone("Europe/London").is_ok());
        assert!(ValidationUtils::validate_timezone("").is_err());
        assert!(ValidationUtils::validate_timezone("Invalid/Timezone").is_err());
        assert!(ValidationUtils::validate_timezone("Europe/Berlin; rm -rf /").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(ValidationUtils::validate_email("dev@example.com").is_ok());
        assert!(ValidationUtils::validate_email("dev.example.com").is_err());
        assert!(ValidationUtils::validate_email("@example.com").is_err());
    }

    #[test]
    fn test_validate_checkpoint_name() {
        assert!(ValidationUtils::validate_checkpoint_name("07-security").is_ok());
        assert!(ValidationUtils::validate_checkpoint_name("pre_upgrade").is_ok());
        assert!(ValidationUtils::validate_checkpoint_name("").is_err());
        assert!(ValidationUtils::validate_checkpoint_name("../etc").is_err());
        assert!(ValidationUtils::validate_checkpoint_name("a b").is_err());
    }
}
