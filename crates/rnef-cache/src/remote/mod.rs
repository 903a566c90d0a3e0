//! Remote build cache providers
//!
//! Providers normalise very different backends (immutable, expiring GitHub
//! Actions artifacts; a flat S3 key space) to name-based lookup, download and
//! best-effort delete.

pub mod archive;
mod github;
mod s3;
#[cfg(test)]
mod test_server;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rnef_core::RemoteCacheSetting;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::credentials::{CredentialStore, TokenPrompt};
use crate::error::{RemoteCacheError, RemoteResult};
use crate::progress::ProgressReporter;

pub use github::GitHubActionsCache;
pub use s3::S3Cache;

/// Metadata of an artifact stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub name: String,
    /// Download location
    pub url: String,
    /// Provider specific identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a download: the artifact unpacked into `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub name: String,
    pub path: PathBuf,
}

/// Content to upload
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Already packaged bytes
    Buffer(Vec<u8>),
    /// A binary file or directory, zipped before upload
    Path(PathBuf),
}

/// Where a provider stores artifacts, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoDetails {
    /// Provider display name
    pub provider: String,
    /// `owner/repo` or `bucket/prefix`
    pub location: String,
    pub url: String,
}

/// A remote store of build artifacts
#[async_trait]
pub trait RemoteBuildCache: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    /// Resolve repository and credentials. `None` means the provider cannot
    /// be used from here (no remote, no token) and callers should skip it.
    async fn detect_repo_details(&self) -> RemoteResult<Option<RepoDetails>>;

    /// List artifacts, newest first; `None` lists everything
    async fn list(&self, artifact_name: Option<&str>) -> RemoteResult<Vec<RemoteArtifact>>;

    /// Most recent artifact with this name
    async fn query(&self, artifact_name: &str) -> RemoteResult<Option<RemoteArtifact>> {
        Ok(self.list(Some(artifact_name)).await?.into_iter().next())
    }

    /// Download and unpack an artifact into `dest`, an existing empty directory
    async fn download(
        &self,
        artifact: &RemoteArtifact,
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> RemoteResult<DownloadedArtifact>;

    async fn upload(&self, artifact_name: &str, source: UploadSource) -> RemoteResult<RemoteArtifact>;

    /// Delete up to `limit` artifacts with this name, returning what was deleted
    async fn delete(
        &self,
        artifact_name: &str,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<RemoteArtifact>>;

    /// Post-download fixups applied before the binary is resolved
    async fn unpack(&self, dir: &Path) -> RemoteResult<()> {
        let _ = dir;
        Ok(())
    }
}

/// Builds a provider on demand, for custom backends or deferred construction
pub type RemoteCacheFactory =
    Box<dyn Fn() -> RemoteResult<Box<dyn RemoteBuildCache>> + Send + Sync>;

/// Instantiate the provider a configuration selects; `None` when disabled
pub fn create_provider(
    setting: &RemoteCacheSetting,
    project_root: &Path,
    credentials: Arc<dyn CredentialStore>,
    prompt: Option<Arc<dyn TokenPrompt>>,
) -> RemoteResult<Option<Box<dyn RemoteBuildCache>>> {
    let provider: Box<dyn RemoteBuildCache> = match setting {
        RemoteCacheSetting::Disabled => return Ok(None),
        RemoteCacheSetting::GitHubActions(config) => Box::new(GitHubActionsCache::new(
            config.clone(),
            project_root,
            credentials,
            prompt,
        )?),
        RemoteCacheSetting::S3(config) => Box::new(S3Cache::new(config.clone())?),
    };
    debug!(provider = provider.name(), "remote cache provider created");
    Ok(Some(provider))
}

pub(crate) fn http_client() -> RemoteResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("rnef/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Write a response body to `path` chunk by chunk, reporting bytes as they arrive
pub(crate) async fn download_to_file(
    mut response: reqwest::Response,
    path: &Path,
    progress: &dyn ProgressReporter,
) -> RemoteResult<u64> {
    let total = response.content_length();
    let mut file = tokio::fs::File::create(path).await?;
    let mut transferred = 0u64;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        transferred += chunk.len() as u64;
        progress.bytes(transferred, total);
    }
    file.flush().await?;

    debug!(path = %path.display(), bytes = transferred, "download complete");
    Ok(transferred)
}

/// Run filesystem-heavy archive work off the async runtime
pub(crate) async fn blocking<T, F>(f: F) -> RemoteResult<T>
where
    F: FnOnce() -> RemoteResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RemoteCacheError::Io(io::Error::other(e)))?
}

/// Download a zip response into `dest` and extract it there
pub(crate) async fn download_zip(
    response: reqwest::Response,
    name: &str,
    dest: &Path,
    progress: &dyn ProgressReporter,
) -> RemoteResult<DownloadedArtifact> {
    let zip_path = dest.join(format!("{}.zip", name));
    download_to_file(response, &zip_path, progress).await?;

    progress.message(&format!("Unpacking {}", name));
    let archive = zip_path.clone();
    let target = dest.to_path_buf();
    blocking(move || archive::extract_zip(&archive, &target)).await?;
    tokio::fs::remove_file(&zip_path).await?;

    Ok(DownloadedArtifact {
        name: name.to_string(),
        path: dest.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use rnef_core::{GitHubConfig, S3Config};

    #[test]
    fn test_disabled_creates_nothing() {
        let provider = create_provider(
            &RemoteCacheSetting::Disabled,
            Path::new("."),
            Arc::new(MemoryCredentialStore::new()),
            None,
        )
        .unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn test_creates_configured_provider() {
        let github = create_provider(
            &RemoteCacheSetting::GitHubActions(GitHubConfig::default()),
            Path::new("."),
            Arc::new(MemoryCredentialStore::new()),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(github.name(), "GitHub");

        let s3 = create_provider(
            &RemoteCacheSetting::S3(S3Config {
                bucket: "builds".into(),
                region: "auto".into(),
                access_key_id: Some("key".into()),
                secret_access_key: Some("secret".into()),
                endpoint: Some("https://account.r2.cloudflarestorage.com".into()),
                name: "R2".into(),
                ..S3Config::default()
            }),
            Path::new("."),
            Arc::new(MemoryCredentialStore::new()),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(s3.name(), "R2");
    }

    #[test]
    fn test_artifact_json_omits_unknowns() {
        let artifact = RemoteArtifact {
            name: "rnef-android-debug-abc".into(),
            url: "https://example.com/a.zip".into(),
            id: None,
            size: Some(10),
            created_at: None,
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["size"], 10);
        assert!(json.get("id").is_none());
    }
}
