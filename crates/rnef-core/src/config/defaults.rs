//! Default configuration values

use std::path::PathBuf;

/// Preferred configuration file name
pub const DEFAULT_CONFIG_TOML: &str = "rnef.config.toml";

/// Default GitHub REST API endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Key prefix for artifacts in S3 buckets
pub const DEFAULT_S3_DIRECTORY: &str = "rnef-artifacts";

/// Display name for the S3 backend
pub const DEFAULT_S3_NAME: &str = "S3";

/// Environment variable overriding the local cache root
pub const CACHE_DIR_ENV: &str = "RNEF_CACHE_DIR";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_TOML, "rnef.toml", "rnef.yaml", "rnef.yml"]
}

/// Default root of the local build cache (`<user cache dir>/rnef/builds`)
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rnef")
        .join("builds")
}

/// Directory for persisted rnef state such as credentials
pub fn state_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("rnef")
}
