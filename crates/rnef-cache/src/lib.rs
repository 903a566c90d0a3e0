//! rnef Cache - reuse of native builds across machines
//!
//! Builds are keyed by an artifact name derived from the project fingerprint.
//! Lookups check the local cache directory first and only then ask the
//! configured remote provider (GitHub Actions artifacts, S3 or a custom
//! implementation of [`RemoteBuildCache`]). Remote failures degrade to a cache
//! miss so a broken cache never blocks a build.

pub mod credentials;
pub mod error;
pub mod local;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod remote;

pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenPrompt, GITHUB_TOKEN_KEY,
};
pub use error::{CacheError, RemoteCacheError, RemoteResult, Result};
pub use local::{CacheStats, LocalBuild, LocalBuildCache, LocalEntry, EntryOrigin, PruneStats};
pub use naming::{artifact_prefix, format_artifact_name, parse_artifact_name, ParsedArtifactName};
pub use orchestrator::{CacheOrchestrator, FetchRequest, ProviderSource};
pub use progress::{CollectingProgress, ProgressEvent, ProgressReporter, TracingProgress};
pub use remote::{
    create_provider, DownloadedArtifact, GitHubActionsCache, RemoteArtifact, RemoteBuildCache,
    RemoteCacheFactory, RepoDetails, S3Cache, UploadSource,
};
