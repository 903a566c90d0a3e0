//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::{config_file_names, default_cache_dir, CACHE_DIR_ENV};
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks `<dir>/<name>` and then
/// `<dir>/.github/<name>`. The first match wins.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }

            let github_path = current.join(".github").join(name);
            if github_path.exists() {
                info!(path = %github_path.display(), "found config file in .github/");
                return Some(github_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Project directory a config file belongs to. A file found under
/// `<dir>/.github/` belongs to `<dir>`.
pub fn project_root(config_path: &Path) -> Option<PathBuf> {
    let parent = config_path.parent()?;
    match parent.file_name() {
        Some(name) if name == ".github" => parent.parent().map(Path::to_path_buf),
        _ => Some(parent.to_path_buf()),
    }
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults.
///
/// A missing file yields defaults; a file that exists but fails to parse or
/// validate is still an error.
pub fn load_config_or_default(dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    match find_config(dir) {
        Some(path) => {
            let config = load_config(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            debug!(dir = %dir.display(), "no config found, using defaults");
            Ok((Config::default(), None))
        }
    }
}

impl Config {
    /// Resolve the local cache root: `RNEF_CACHE_DIR`, then config, then the user cache dir
    pub fn cache_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteCacheSetting;
    use tempfile::TempDir;

    const DEFAULT_CONFIG_TEMPLATE: &str = r#"# rnef configuration

[remote_cache]
# "github-actions", "s3" or "none"
provider = "github-actions"

[fingerprint]
extra_sources = []
ignore_paths = []
"#;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("rnef.config.toml");
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE).unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("rnef.toml");
        std::fs::write(&config_path, "").unwrap();
        let nested = temp.path().join("packages").join("mobile");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_find_config_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("rnef.yaml");
        std::fs::write(&config_path, "fingerprint:\n  extra_sources: []\n").unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path.clone()));
        assert_eq!(project_root(&config_path), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_project_root() {
        assert_eq!(
            project_root(Path::new("/app/rnef.config.toml")),
            Some(PathBuf::from("/app"))
        );
        assert_eq!(
            project_root(Path::new("/app/.github/rnef.toml")),
            Some(PathBuf::from("/app"))
        );
    }

    #[test]
    fn test_load_template() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("rnef.config.toml");
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE).unwrap();

        let config = load_config(&config_path).unwrap();
        assert!(matches!(
            config.remote_cache,
            Some(RemoteCacheSetting::GitHubActions(_))
        ));
    }

    #[test]
    fn test_load_invalid_config_is_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("rnef.toml");
        std::fs::write(&config_path, "[remote_cache]\nprovider = \"s3\"\nregion = \"eu-west-1\"\n").unwrap();

        assert!(load_config_or_default(temp.path()).is_err());
    }

    #[test]
    fn test_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let (config, path) = load_config_or_default(temp.path()).unwrap();
        assert!(path.is_none());
        assert!(config.remote_cache.is_none());
    }
}
