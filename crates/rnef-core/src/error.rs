//! Error types for rnef

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using RnefError
pub type Result<T> = std::result::Result<T, RnefError>;

/// Main error type for rnef core operations
#[derive(Debug, Error)]
pub enum RnefError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid platform name
    #[error("Invalid platform '{0}'. Supported platforms: android, ios")]
    InvalidPlatform(String),

    /// Invalid build trait token
    #[error("Invalid trait '{0}': traits may not be empty or contain '-'")]
    InvalidTrait(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}
