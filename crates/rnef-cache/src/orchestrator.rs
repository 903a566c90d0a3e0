//! Local-then-remote build lookup
//!
//! ```text
//! START -> LOCAL_CHECK -> HIT: done
//!                      -> MISS: REMOTE_CHECK -> HIT: DOWNLOAD -> UNPACK -> done
//!                                            -> MISS: done (None)
//! ```
//!
//! The local check never touches the network. Remote problems other than
//! unsupported operations degrade to a miss so the caller falls back to a
//! real native build.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rnef_core::{BinaryKind, BuildTarget, Config, RemoteCacheSetting};
use rnef_fingerprint::{FingerprintOptions, Fingerprinter};
use tracing::{debug, info, instrument, warn};

use crate::credentials::{CredentialStore, TokenPrompt};
use crate::error::{CacheError, RemoteCacheError, RemoteResult, Result};
use crate::local::{find_binary, EntryOrigin, LocalBuild, LocalBuildCache};
use crate::naming::format_artifact_name;
use crate::progress::{ProgressReporter, TracingProgress};
use crate::remote::{create_provider, RemoteArtifact, RemoteBuildCache, RemoteCacheFactory};

/// Where the orchestrator gets its remote provider from
pub enum ProviderSource {
    /// Nothing configured; warns once and runs local-only
    Unset,
    /// Remote caching explicitly turned off
    Disabled,
    /// Built lazily, only after a local miss
    Factory(RemoteCacheFactory),
}

impl ProviderSource {
    /// Provider selected by the `remote_cache` configuration key
    pub fn from_config(
        config: &Config,
        project_root: &Path,
        credentials: Arc<dyn CredentialStore>,
        prompt: Option<Arc<dyn TokenPrompt>>,
    ) -> Self {
        let setting = match &config.remote_cache {
            None => return Self::Unset,
            Some(RemoteCacheSetting::Disabled) => return Self::Disabled,
            Some(setting) => setting.clone(),
        };
        let project_root = project_root.to_path_buf();

        Self::Factory(Box::new(move || {
            create_provider(&setting, &project_root, credentials.clone(), prompt.clone())?
                .ok_or_else(|| RemoteCacheError::Configuration("remote cache is disabled".into()))
        }))
    }

    /// Wrap an already constructed provider
    pub fn from_provider<P>(provider: P) -> Self
    where
        P: RemoteBuildCache + Clone + 'static,
    {
        Self::Factory(Box::new(move || Ok(Box::new(provider.clone()))))
    }
}

impl std::fmt::Debug for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => f.write_str("Unset"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Inputs identifying the build to look up
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub project_root: PathBuf,
    pub target: BuildTarget,
    pub fingerprint_options: FingerprintOptions,
    /// Explicit artifact name; skips fingerprinting
    pub name: Option<String>,
}

impl FetchRequest {
    pub fn new(project_root: impl Into<PathBuf>, target: BuildTarget) -> Self {
        let fingerprint_options = FingerprintOptions::new(target.platform);
        Self {
            project_root: project_root.into(),
            target,
            fingerprint_options,
            name: None,
        }
    }

    pub fn with_fingerprint_options(mut self, options: FingerprintOptions) -> Self {
        self.fingerprint_options = options;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Coordinates the local cache and the remote provider
pub struct CacheOrchestrator {
    local: LocalBuildCache,
    provider: ProviderSource,
    fingerprinter: Fingerprinter,
    progress: Arc<dyn ProgressReporter>,
    warned_unset: AtomicBool,
}

impl CacheOrchestrator {
    pub fn new(local: LocalBuildCache, provider: ProviderSource) -> Self {
        Self {
            local,
            provider,
            fingerprinter: Fingerprinter::default(),
            progress: Arc::new(TracingProgress),
            warned_unset: AtomicBool::new(false),
        }
    }

    /// Report progress somewhere other than the log
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Use a custom fingerprinter (another native enumerator)
    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn local(&self) -> &LocalBuildCache {
        &self.local
    }

    /// Artifact name for a request: the explicit name, or one derived from a
    /// fresh fingerprint
    pub fn artifact_name(&self, request: &FetchRequest) -> Result<String> {
        if let Some(name) = &request.name {
            return Ok(name.clone());
        }
        let fingerprint = self
            .fingerprinter
            .compute(&request.project_root, &request.fingerprint_options)?;
        Ok(format_artifact_name(
            request.target.platform,
            &request.target.traits,
            &fingerprint.hash,
            None,
        ))
    }

    /// Instantiate the remote provider. `Ok(None)` when none is configured.
    pub fn provider(&self) -> RemoteResult<Option<Box<dyn RemoteBuildCache>>> {
        match &self.provider {
            ProviderSource::Unset => {
                self.warn_unset();
                Ok(None)
            }
            ProviderSource::Disabled => Ok(None),
            ProviderSource::Factory(factory) => factory().map(Some),
        }
    }

    fn warn_unset(&self) {
        if !self.warned_unset.swap(true, Ordering::Relaxed) {
            warn!(
                "No remote cache provider configured; only the local cache is used. \
                 Set [remote_cache] provider in rnef.config.toml, or provider = \"none\" to silence this."
            );
        }
    }

    /// Find a reusable build for the request.
    ///
    /// `Ok(None)` means the caller should run a real build. Only fingerprint
    /// failures and unsupported remote operations are errors.
    #[instrument(skip_all, fields(platform = %request.target.platform))]
    pub async fn fetch_cached_build(&self, request: &FetchRequest) -> Result<Option<LocalBuild>> {
        if matches!(self.provider, ProviderSource::Unset) {
            self.warn_unset();
        }

        let name = self.artifact_name(request)?;
        let kinds = request.target.binary_kinds();

        if let Some(build) = self.local.query(&name, &kinds) {
            info!(name = %name, "using locally cached build");
            return Ok(Some(build));
        }

        match self.fetch_remote(&name, &kinds).await {
            Ok(build) => Ok(build),
            Err(CacheError::Remote(e)) if e.is_fatal() => Err(CacheError::Remote(e)),
            Err(e) => {
                warn!(name = %name, error = %e, "remote cache unavailable, continuing without it");
                self.progress.stop("Remote cache unavailable");
                Ok(None)
            }
        }
    }

    async fn fetch_remote(&self, name: &str, kinds: &[BinaryKind]) -> Result<Option<LocalBuild>> {
        let provider = match &self.provider {
            ProviderSource::Factory(factory) => factory()?,
            _ => return Ok(None),
        };

        let Some(details) = provider.detect_repo_details().await? else {
            debug!(provider = provider.name(), "remote cache not usable from here");
            return Ok(None);
        };
        debug!(provider = %details.provider, location = %details.location, "remote cache detected");

        self.progress
            .start(&format!("Looking for {} in {}", name, provider.name()));
        let Some(artifact) = provider.query(name).await? else {
            self.progress
                .stop(&format!("No cached build found in {}", provider.name()));
            return Ok(None);
        };

        self.download_into_cache(provider.as_ref(), &artifact, name, kinds)
            .await
    }

    /// Download an artifact into the local cache under `name`.
    ///
    /// The download lands in a scratch directory and is moved into place only
    /// once a binary for `kinds` was found; otherwise the cache is untouched
    /// and `None` is returned.
    pub async fn download_into_cache(
        &self,
        provider: &dyn RemoteBuildCache,
        artifact: &RemoteArtifact,
        name: &str,
        kinds: &[BinaryKind],
    ) -> Result<Option<LocalBuild>> {
        self.progress
            .start(&format!("Downloading {} from {}", name, provider.name()));
        let scratch = self.local.scratch_dir()?;

        provider
            .download(artifact, scratch.path(), self.progress.as_ref())
            .await?;
        provider.unpack(scratch.path()).await?;

        if find_binary(scratch.path(), kinds).is_none() {
            warn!(name, provider = provider.name(), "downloaded artifact holds no matching binary");
            self.progress
                .stop(&format!("Cached artifact {} holds no usable binary", name));
            return Ok(None);
        }

        let prepared = scratch.into_path();
        let origin = EntryOrigin::Remote(provider.name().to_string());
        if let Err(e) = self.local.adopt(name, &prepared, origin) {
            let _ = std::fs::remove_dir_all(&prepared);
            return Err(e);
        }

        info!(name, provider = provider.name(), "cached remote build locally");
        let build = self.local.query(name, kinds);
        if let Some(build) = &build {
            self.progress.stop(&format!(
                "Downloaded cached build to {}",
                build.binary_path.display()
            ));
        }
        Ok(build)
    }
}

impl std::fmt::Debug for CacheOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOrchestrator")
            .field("local", &self.local)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
