// file: src/config/mod.rs
// version: 2.0.0
// guid: a1b2c3d4-e5f6-7a8b-9c0d-1e2f3a4b5c6d

//! Configuration module for server provisioning
//!
//! Handles loading, environment overrides and validation of the run settings.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    FirewallSettings, Fail2banSettings, PackageSettings, PathSettings, RetrySettings, Settings,
    VersionSettings,
};

use serde::{Deserialize, Serialize};

/// Named subset of provisioning steps to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstallMode {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "nginx-only")]
    NginxOnly,
    #[serde(rename = "dev-only")]
    DevOnly,
    #[serde(rename = "minimal")]
    Minimal,
}

impl InstallMode {
    /// All modes in display order
    pub const ALL: [InstallMode; 4] = [
        InstallMode::Full,
        InstallMode::NginxOnly,
        InstallMode::DevOnly,
        InstallMode::Minimal,
    ];

    /// Get the mode as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMode::Full => "full",
            InstallMode::NginxOnly => "nginx-only",
            InstallMode::DevOnly => "dev-only",
            InstallMode::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstallMode {
    type Err = crate::error::SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(InstallMode::Full),
            "nginx-only" | "nginx" => Ok(InstallMode::NginxOnly),
            "dev-only" | "dev" => Ok(InstallMode::DevOnly),
            "minimal" => Ok(InstallMode::Minimal),
            _ => Err(crate::error::SetupError::validation(format!(
                "Unknown installation mode: {} (expected full, nginx-only, dev-only or minimal)",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip_through_str() {
        for mode in InstallMode::ALL {
            assert_eq!(mode.as_str().parse::<InstallMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_aliases() {
        assert_eq!("NGINX".parse::<InstallMode>().unwrap(), InstallMode::NginxOnly);
        assert_eq!("dev".parse::<InstallMode>().unwrap(), InstallMode::DevOnly);
        assert!("everything".parse::<InstallMode>().is_err());
    }
}
