//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults::{DEFAULT_GITHUB_API_URL, DEFAULT_S3_DIRECTORY, DEFAULT_S3_NAME};

/// Main configuration for rnef
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote build cache provider.
    ///
    /// `None` means the key is absent, which warns once per run. An explicit
    /// `provider = "none"` disables remote caching silently.
    pub remote_cache: Option<RemoteCacheSetting>,

    /// Fingerprint inputs beyond the native project
    pub fingerprint: FingerprintConfig,

    /// Local cache location
    pub cache: LocalCacheConfig,
}

/// Remote build cache backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum RemoteCacheSetting {
    /// Remote caching explicitly turned off
    #[serde(rename = "none")]
    Disabled,

    /// GitHub Actions artifacts
    #[serde(rename = "github-actions")]
    GitHubActions(GitHubConfig),

    /// S3 or an S3-compatible object store (R2, MinIO)
    #[serde(rename = "s3")]
    S3(S3Config),
}

impl RemoteCacheSetting {
    /// Identifier used in config files and log output
    pub fn id(&self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::GitHubActions(_) => "github-actions",
            Self::S3(_) => "s3",
        }
    }
}

/// GitHub Actions artifacts backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Repository owner; detected from the `origin` remote when unset
    pub owner: Option<String>,

    /// Repository name; detected from the `origin` remote when unset
    pub repository: Option<String>,

    /// REST API base URL (GitHub Enterprise installs override this)
    pub api_url: String,

    /// Personal access token. Prefer the credential store or `GITHUB_TOKEN`.
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: None,
            repository: None,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            token: None,
        }
    }
}

/// S3-compatible backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,

    /// Bucket region (`auto` for R2)
    pub region: String,

    /// Access key; falls back to `AWS_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,

    /// Secret key; falls back to `AWS_SECRET_ACCESS_KEY`
    pub secret_access_key: Option<String>,

    /// Endpoint override for S3-compatible stores
    pub endpoint: Option<String>,

    /// Key prefix artifacts are stored under
    pub directory: String,

    /// Display name used in messages
    pub name: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: String::new(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            directory: DEFAULT_S3_DIRECTORY.to_string(),
            name: DEFAULT_S3_NAME.to_string(),
        }
    }
}

/// Extra fingerprint inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Paths, directories or glob patterns hashed in addition to the native project
    pub extra_sources: Vec<String>,

    /// Glob patterns excluded from hashing
    pub ignore_paths: Vec<String>,
}

/// Local cache settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Cache root; defaults to the user cache directory
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_provider_from_toml() {
        let config: Config = toml::from_str(
            r#"
[remote_cache]
provider = "github-actions"
owner = "callstack"
repository = "app"
"#,
        )
        .unwrap();

        match config.remote_cache {
            Some(RemoteCacheSetting::GitHubActions(gh)) => {
                assert_eq!(gh.owner.as_deref(), Some("callstack"));
                assert_eq!(gh.api_url, DEFAULT_GITHUB_API_URL);
            }
            other => panic!("unexpected provider: {:?}", other),
        }
    }

    #[test]
    fn test_disabled_provider() {
        let config: Config = toml::from_str("[remote_cache]\nprovider = \"none\"\n").unwrap();
        assert_eq!(config.remote_cache, Some(RemoteCacheSetting::Disabled));
    }

    #[test]
    fn test_missing_provider_is_unset() {
        let config: Config = toml::from_str("[fingerprint]\nextra_sources = [\"patches\"]\n").unwrap();
        assert!(config.remote_cache.is_none());
        assert_eq!(config.fingerprint.extra_sources, vec!["patches"]);
    }

    #[test]
    fn test_s3_defaults() {
        let config: Config = serde_yaml::from_str(
            "remote_cache:\n  provider: s3\n  bucket: builds\n  region: us-east-1\n",
        )
        .unwrap();

        match config.remote_cache {
            Some(RemoteCacheSetting::S3(s3)) => {
                assert_eq!(s3.bucket, "builds");
                assert_eq!(s3.directory, DEFAULT_S3_DIRECTORY);
                assert_eq!(s3.name, DEFAULT_S3_NAME);
            }
            other => panic!("unexpected provider: {:?}", other),
        }
    }
}
