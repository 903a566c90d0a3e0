//! rnef Core - shared types and configuration
//!
//! This crate provides the platform and build-target types, error handling and
//! configuration loading shared by the fingerprint engine, the build cache and
//! the command-line interface.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    find_config, load_config, load_config_from_dir, load_config_or_default, project_root, Config,
    FingerprintConfig, GitHubConfig, LocalCacheConfig, RemoteCacheSetting, S3Config,
};
pub use error::{ConfigError, Result, RnefError};
pub use types::{BinaryKind, BuildTarget, Distribution, Platform};
