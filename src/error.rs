// file: src/error.rs
// version: 3.0.0
// guid: 57b83a63-07b6-4534-aa6c-51e8797254e0

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, SetupError>;

/// Error types for server provisioning
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command execution error: {0}")]
    Execution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Security violation: {0}")]
    Security(String),

    #[error("System error: {0}")]
    System(String),
}

impl SetupError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new checkpoint not found error
    pub fn checkpoint_not_found(name: impl Into<String>) -> Self {
        Self::CheckpointNotFound(name.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new security error
    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    /// Create a new system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// True for errors raised before anything on the host was touched
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidArgument(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = SetupError::checkpoint_not_found("07-security");
        assert_eq!(err.to_string(), "Checkpoint not found: 07-security");
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_usage_errors() {
        assert!(SetupError::validation("bad").is_usage_error());
        assert!(SetupError::invalid_argument("bad").is_usage_error());
        assert!(!SetupError::execution("apt-get failed").is_usage_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SetupError = io.into();
        assert!(matches!(err, SetupError::Io(_)));
    }
}
