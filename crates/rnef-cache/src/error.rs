//! Cache error types

use thiserror::Error;

/// Errors from the cache layer
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Remote provider error
    #[error(transparent)]
    Remote(#[from] RemoteCacheError),

    /// Fingerprint computation failed
    #[error(transparent)]
    Fingerprint(#[from] rnef_fingerprint::FingerprintError),
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors from remote cache providers
#[derive(Debug, Error)]
pub enum RemoteCacheError {
    /// Credentials were rejected
    #[error("{provider} rejected the credentials. {remediation}")]
    Unauthorized { provider: String, remediation: String },

    /// The provider cannot perform this operation at all
    #[error("{provider} does not support {operation}: {reason}")]
    Unsupported {
        provider: String,
        operation: String,
        reason: String,
    },

    /// Artifact not found
    #[error("Remote artifact not found: {0}")]
    NotFound(String),

    /// Non-success response from the provider API
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Rate limited by the provider
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Provider configuration is incomplete or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Repository owner/name could not be determined
    #[error("Could not detect repository: {0}")]
    RepoDetection(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl RemoteCacheError {
    /// Whether the error reflects a usage mistake rather than an unavailable
    /// remote. Fatal errors propagate; everything else degrades to a cache miss.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether retrying with fresh credentials could help
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Result type for remote provider operations
pub type RemoteResult<T> = std::result::Result<T, RemoteCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsupported_is_fatal() {
        let unsupported = RemoteCacheError::Unsupported {
            provider: "GitHub".into(),
            operation: "upload".into(),
            reason: "read only".into(),
        };
        assert!(unsupported.is_fatal());
        assert!(!RemoteCacheError::RateLimited { retry_after: None }.is_fatal());
        assert!(!RemoteCacheError::ApiError {
            status: 500,
            message: "boom".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_unauthorized_message() {
        let err = RemoteCacheError::Unauthorized {
            provider: "GitHub".into(),
            remediation: "Create a new token.".into(),
        };
        assert_eq!(err.to_string(), "GitHub rejected the credentials. Create a new token.");
        assert!(err.is_auth());
    }
}
