//! Project context shared by commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rnef_cache::{
    CacheOrchestrator, FetchRequest, FileCredentialStore, LocalBuildCache, ProviderSource,
};
use rnef_core::{load_config_or_default, project_root, BuildTarget, Config, Platform};
use rnef_fingerprint::FingerprintOptions;
use tracing::debug;

use super::output::{SpinnerProgress, TerminalTokenPrompt};
use super::Cli;

/// The React Native project a command runs against
#[derive(Debug)]
pub struct Project {
    /// Directory the config file belongs to, or the working directory
    pub root: PathBuf,
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl Project {
    /// Load configuration from the working directory upwards
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&std::env::current_dir()?)
    }

    fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let (config, config_path) = load_config_or_default(dir)?;
        let root = config_path
            .as_deref()
            .and_then(project_root)
            .unwrap_or_else(|| dir.to_path_buf());
        debug!(root = %root.display(), config = ?config_path, "project loaded");

        Ok(Self {
            root,
            config,
            config_path,
        })
    }

    /// Fingerprint options from config, extended by command line values
    pub fn fingerprint_options(
        &self,
        platform: Platform,
        extra_sources: &[String],
        ignore_paths: &[String],
    ) -> FingerprintOptions {
        let mut sources = self.config.fingerprint.extra_sources.clone();
        sources.extend(extra_sources.iter().cloned());
        let mut ignores = self.config.fingerprint.ignore_paths.clone();
        ignores.extend(ignore_paths.iter().cloned());

        FingerprintOptions::new(platform)
            .with_extra_sources(sources)
            .with_ignore_paths(ignores)
    }

    /// Cache lookup request for a target
    pub fn fetch_request(&self, target: BuildTarget) -> FetchRequest {
        let options = self.fingerprint_options(target.platform, &[], &[]);
        FetchRequest::new(&self.root, target).with_fingerprint_options(options)
    }

    pub fn local_cache(&self) -> LocalBuildCache {
        LocalBuildCache::from_config(&self.config)
    }

    /// Orchestrator wired to the configured provider, the persisted
    /// credential store and terminal progress
    pub fn orchestrator(&self, cli: &Cli) -> CacheOrchestrator {
        let provider = ProviderSource::from_config(
            &self.config,
            &self.root,
            Arc::new(FileCredentialStore::default_location()),
            Some(Arc::new(TerminalTokenPrompt)),
        );
        CacheOrchestrator::new(self.local_cache(), provider)
            .with_progress(Arc::new(SpinnerProgress::new(cli.is_interactive_text())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnef_core::FingerprintConfig;
    use tempfile::TempDir;

    #[test]
    fn test_root_for_config_under_github_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".github")).unwrap();
        std::fs::write(temp.path().join(".github/rnef.toml"), "").unwrap();
        let nested = temp.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();

        let project = Project::load_from(&nested).unwrap();
        assert_eq!(project.root, temp.path());
        assert_eq!(project.config_path, Some(temp.path().join(".github/rnef.toml")));
    }

    #[test]
    fn test_root_without_config_is_working_dir() {
        let temp = TempDir::new().unwrap();
        let project = Project::load_from(temp.path()).unwrap();
        assert_eq!(project.root, temp.path());
        assert!(project.config_path.is_none());
    }

    #[test]
    fn test_fingerprint_options_merge_config_and_flags() {
        let project = Project {
            root: PathBuf::from("/project"),
            config: Config {
                fingerprint: FingerprintConfig {
                    extra_sources: vec!["patches/**".into()],
                    ignore_paths: vec!["**/*.md".into()],
                },
                ..Config::default()
            },
            config_path: None,
        };

        let options =
            project.fingerprint_options(Platform::Ios, &["Gemfile".into()], &["ios/tmp".into()]);
        assert_eq!(options.platform, Platform::Ios);
        assert_eq!(options.extra_sources, vec!["patches/**", "Gemfile"]);
        assert_eq!(options.ignore_paths, vec!["**/*.md", "ios/tmp"]);
    }
}
