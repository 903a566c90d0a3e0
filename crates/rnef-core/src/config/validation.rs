//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, RemoteCacheSetting};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_remote_cache(config)?;
    validate_fingerprint(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_remote_cache(config: &Config) -> Result<()> {
    match &config.remote_cache {
        Some(RemoteCacheSetting::S3(s3)) => {
            if s3.bucket.trim().is_empty() {
                return Err(ConfigError::MissingField("remote_cache.bucket".to_string()).into());
            }
            if s3.region.trim().is_empty() {
                return Err(ConfigError::MissingField("remote_cache.region".to_string()).into());
            }
            if let Some(endpoint) = &s3.endpoint {
                validate_url("remote_cache.endpoint", endpoint)?;
            }
        }
        Some(RemoteCacheSetting::GitHubActions(gh)) => {
            validate_url("remote_cache.api_url", &gh.api_url)?;
        }
        Some(RemoteCacheSetting::Disabled) | None => {}
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("'{}' is not an http(s) URL", value),
        }
        .into()),
    }
}

fn validate_fingerprint(config: &Config) -> Result<()> {
    for pattern in config
        .fingerprint
        .extra_sources
        .iter()
        .chain(config.fingerprint.ignore_paths.iter())
    {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fingerprint".to_string(),
                message: "source and ignore patterns cannot be empty".to_string(),
            }
            .into());
        }
    }
    Ok(())
}
