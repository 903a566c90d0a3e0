//! GitHub Actions artifacts provider

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use git2::Repository;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rnef_core::GitHubConfig;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::credentials::{CredentialStore, TokenPrompt, GITHUB_TOKEN_KEY};
use crate::error::{RemoteCacheError, RemoteResult};
use crate::progress::ProgressReporter;

use super::{
    archive, blocking, download_zip, http_client, DownloadedArtifact, RemoteArtifact,
    RemoteBuildCache, RepoDetails, UploadSource,
};

const PROVIDER_NAME: &str = "GitHub";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// Where to create a replacement token
pub const TOKEN_SETTINGS_URL: &str = "https://github.com/settings/tokens";

/// Scopes the token needs to read and delete workflow artifacts
pub const REQUIRED_SCOPES: &[&str] = &["repo", "workflow", "read:org"];

#[derive(Debug, Deserialize)]
struct ArtifactsPage {
    total_count: usize,
    artifacts: Vec<GitHubArtifact>,
}

#[derive(Debug, Deserialize)]
struct GitHubArtifact {
    id: u64,
    name: String,
    size_in_bytes: u64,
    archive_download_url: String,
    expired: bool,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    workflow_run: Option<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: Option<u64>,
}

impl GitHubArtifact {
    fn has_run(&self) -> bool {
        self.workflow_run.as_ref().and_then(|r| r.id).is_some()
    }
}

/// Build cache backed by GitHub Actions workflow artifacts.
///
/// Artifacts are produced by CI with `actions/upload-artifact`; this provider
/// only lists, downloads and deletes them.
pub struct GitHubActionsCache {
    config: GitHubConfig,
    project_root: PathBuf,
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    prompt: Option<Arc<dyn TokenPrompt>>,
    token: Mutex<Option<String>>,
}

impl GitHubActionsCache {
    pub fn new(
        config: GitHubConfig,
        project_root: &Path,
        credentials: Arc<dyn CredentialStore>,
        prompt: Option<Arc<dyn TokenPrompt>>,
    ) -> RemoteResult<Self> {
        Ok(Self {
            config,
            project_root: project_root.to_path_buf(),
            client: http_client()?,
            credentials,
            prompt,
            token: Mutex::new(None),
        })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Owner and repository from configuration, else from the `origin` remote
    fn repository(&self) -> Option<(String, String)> {
        if let (Some(owner), Some(repo)) = (&self.config.owner, &self.config.repository) {
            return Some((owner.clone(), repo.clone()));
        }

        let repo = match Repository::discover(&self.project_root) {
            Ok(repo) => repo,
            Err(e) => {
                debug!(error = %e, "no git repository for remote cache");
                return None;
            }
        };
        let remote = repo.find_remote("origin").ok()?;
        let (owner, name) = parse_remote_url(remote.url()?)?;
        Some((
            self.config.owner.clone().unwrap_or(owner),
            self.config.repository.clone().unwrap_or(name),
        ))
    }

    fn require_repository(&self) -> RemoteResult<(String, String)> {
        self.repository().ok_or_else(|| {
            RemoteCacheError::RepoDetection(
                "set remote_cache.owner and remote_cache.repository, or add a GitHub `origin` remote"
                    .to_string(),
            )
        })
    }

    /// Token from config, `GITHUB_TOKEN`, the credential store, then the prompt.
    ///
    /// The prompt blocks on terminal input, so it runs on the blocking pool.
    async fn token(&self) -> Option<String> {
        if let Some(token) = &self.config.token {
            return Some(token.clone());
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                return Some(token);
            }
        }

        {
            let mut cached = self.token.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(token) = cached.as_ref() {
                return Some(token.clone());
            }
            if let Some(token) = self.credentials.get(GITHUB_TOKEN_KEY) {
                *cached = Some(token.clone());
                return Some(token);
            }
        }

        let prompt = self.prompt.clone()?;
        let message = format!(
            "GitHub personal access token (create one at {} with scopes: {})",
            TOKEN_SETTINGS_URL,
            REQUIRED_SCOPES.join(", ")
        );
        let answer = match blocking(move || Ok(prompt.prompt(&message))).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "token prompt failed");
                None
            }
        };
        let token = answer?.trim().to_string();
        if token.is_empty() {
            return None;
        }
        if let Err(e) = self.credentials.set(GITHUB_TOKEN_KEY, &token) {
            warn!(error = %e, "failed to persist GitHub token");
        }
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.clone());
        Some(token)
    }

    async fn require_token(&self) -> RemoteResult<String> {
        self.token().await.ok_or_else(|| {
            RemoteCacheError::Configuration(format!(
                "no GitHub token; set GITHUB_TOKEN or create one at {} with scopes: {}",
                TOKEN_SETTINGS_URL,
                REQUIRED_SCOPES.join(", ")
            ))
        })
    }

    /// Drop every cached copy of the token so the next use prompts again
    fn invalidate_token(&self) {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = None;
        if let Err(e) = self.credentials.remove(GITHUB_TOKEN_KEY) {
            warn!(error = %e, "failed to clear stored GitHub token");
        }
    }

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn artifacts_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}/actions/artifacts",
            self.config.api_url.trim_end_matches('/'),
            owner,
            repo
        )
    }

    async fn check(&self, response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_token();
            return Err(RemoteCacheError::Unauthorized {
                provider: PROVIDER_NAME.to_string(),
                remediation: format!(
                    "The stored token was cleared; create a new one at {} with scopes: {}",
                    TOKEN_SETTINGS_URL,
                    REQUIRED_SCOPES.join(", ")
                ),
            });
        }

        let headers = response.headers();
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        if (status == StatusCode::FORBIDDEN && exhausted) || status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .or_else(|| {
                    headers
                        .get("x-ratelimit-reset")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<i64>().ok())
                        .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64)
                });
            return Err(RemoteCacheError::RateLimited { retry_after });
        }

        let message = response.text().await.unwrap_or_default();
        Err(RemoteCacheError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteBuildCache for GitHubActionsCache {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn detect_repo_details(&self) -> RemoteResult<Option<RepoDetails>> {
        let Some((owner, repo)) = self.repository() else {
            warn!("could not determine the GitHub repository; skipping remote cache");
            return Ok(None);
        };
        if self.token().await.is_none() {
            warn!("no GitHub token available; skipping remote cache");
            return Ok(None);
        }
        Ok(Some(RepoDetails {
            provider: PROVIDER_NAME.to_string(),
            location: format!("{}/{}", owner, repo),
            url: format!("https://github.com/{}/{}", owner, repo),
        }))
    }

    #[instrument(skip(self))]
    async fn list(&self, artifact_name: Option<&str>) -> RemoteResult<Vec<RemoteArtifact>> {
        let (owner, repo) = self.require_repository()?;
        let token = self.require_token().await?;
        let url = self.artifacts_url(&owner, &repo);

        let mut collected = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query = vec![
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(name) = artifact_name {
                query.push(("name", name.to_string()));
            }

            let response = self
                .request(Method::GET, &url, &token)
                .query(&query)
                .send()
                .await?;
            let body: ArtifactsPage = self.check(response).await?.json().await?;

            let received = body.artifacts.len();
            collected.extend(body.artifacts);
            debug!(page, received, total = body.total_count, "fetched artifacts page");

            if received == 0 || collected.len() >= body.total_count {
                break;
            }
            page += 1;
        }

        let mut artifacts: Vec<GitHubArtifact> = collected
            .into_iter()
            .filter(|a| !a.expired && a.has_run())
            .collect();
        artifacts.sort_by(|a, b| b.expires_at.cmp(&a.expires_at));

        Ok(artifacts
            .into_iter()
            .map(|a| RemoteArtifact {
                name: a.name,
                url: a.archive_download_url,
                id: Some(a.id),
                size: Some(a.size_in_bytes),
                created_at: a.created_at,
            })
            .collect())
    }

    #[instrument(skip(self, dest, progress), fields(artifact = %artifact.name))]
    async fn download(
        &self,
        artifact: &RemoteArtifact,
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> RemoteResult<DownloadedArtifact> {
        let token = self.require_token().await?;
        progress.message(&format!("Downloading {} from {}", artifact.name, PROVIDER_NAME));

        let response = self
            .request(Method::GET, &artifact.url, &token)
            .send()
            .await?;
        let response = self.check(response).await?;
        let downloaded = download_zip(response, &artifact.name, dest, progress).await?;

        info!(artifact = %artifact.name, "downloaded artifact from GitHub");
        Ok(downloaded)
    }

    async fn upload(&self, artifact_name: &str, _source: UploadSource) -> RemoteResult<RemoteArtifact> {
        Err(RemoteCacheError::Unsupported {
            provider: PROVIDER_NAME.to_string(),
            operation: format!("uploading {}", artifact_name),
            reason: "GitHub Actions artifacts can only be created from a running workflow; \
                     use actions/upload-artifact in CI instead"
                .to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn delete(
        &self,
        artifact_name: &str,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<RemoteArtifact>> {
        let (owner, repo) = self.require_repository()?;
        let token = self.require_token().await?;
        let base = self.artifacts_url(&owner, &repo);

        let matches = self.list(Some(artifact_name)).await?;
        let mut deleted = Vec::new();
        for artifact in matches.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let Some(id) = artifact.id else {
                continue;
            };
            let response = self
                .request(Method::DELETE, &format!("{}/{}", base, id), &token)
                .send()
                .await?;
            self.check(response).await?;
            debug!(id, name = %artifact.name, "deleted artifact");
            deleted.push(artifact);
        }

        info!(name = artifact_name, count = deleted.len(), "deleted GitHub artifacts");
        Ok(deleted)
    }

    /// `.app` bundles are uploaded as a tarball inside the zip to keep their
    /// executable bits
    async fn unpack(&self, dir: &Path) -> RemoteResult<()> {
        let dir = dir.to_path_buf();
        let unwrapped = blocking(move || archive::unwrap_tarballs(&dir)).await?;
        if unwrapped > 0 {
            debug!(unwrapped, "unwrapped tarballs");
        }
        Ok(())
    }
}

/// Owner and repository from a GitHub remote URL (https, ssh or scp-style)
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let re = Regex::new(r"[:/]([^/:]+)/([^/]+?)(?:\.git)?/?$").ok()?;
    let captures = re.captures(url.trim())?;
    Some((captures[1].to_string(), captures[2].to_string()))
}
