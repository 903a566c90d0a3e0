//! Exit codes for the CLI

use rnef_cache::{CacheError, RemoteCacheError};
use rnef_core::{ConfigError, RnefError};

use crate::cli::CliError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration or usage error
pub const CONFIG_ERROR: i32 = 2;

/// No cached build was found
pub const CACHE_MISS: i32 = 3;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for an error that ended a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return match cli {
            CliError::Cancelled => CANCELLED,
            CliError::Usage(_) | CliError::NoProvider => CONFIG_ERROR,
            CliError::NotFound(_) => CACHE_MISS,
        };
    }
    if err.downcast_ref::<RnefError>().is_some() || err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    let remote = err.downcast_ref::<RemoteCacheError>().or_else(|| {
        match err.downcast_ref::<CacheError>() {
            Some(CacheError::Remote(remote)) => Some(remote),
            _ => None,
        }
    });
    match remote {
        Some(RemoteCacheError::Configuration(_) | RemoteCacheError::Unsupported { .. }) => {
            CONFIG_ERROR
        }
        _ => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(for_error(&CliError::Cancelled.into()), CANCELLED);
        assert_eq!(for_error(&CliError::Usage("x".into()).into()), CONFIG_ERROR);
        assert_eq!(for_error(&CliError::NotFound("x".into()).into()), CACHE_MISS);
        assert_eq!(
            for_error(&RnefError::InvalidTrait("a-b".into()).into()),
            CONFIG_ERROR
        );
        assert_eq!(
            for_error(&CacheError::Remote(RemoteCacheError::Configuration("bucket".into())).into()),
            CONFIG_ERROR
        );
        assert_eq!(
            for_error(&RemoteCacheError::NotFound("x".into()).into()),
            ERROR
        );
        assert_eq!(for_error(&anyhow::anyhow!("boom")), ERROR);
        assert_ne!(SUCCESS, ERROR);
    }
}
