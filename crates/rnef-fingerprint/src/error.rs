//! Error types for fingerprinting

use std::path::PathBuf;
use thiserror::Error;

/// Result type for fingerprint operations
pub type Result<T> = std::result::Result<T, FingerprintError>;

/// Fingerprint errors
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// Project root does not exist or is not a directory
    #[error("Project root not found at {0}")]
    ProjectNotFound(PathBuf),

    /// An exclude or ignore glob could not be compiled
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed package.json or source list
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
