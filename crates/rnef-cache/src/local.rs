//! Local build cache
//!
//! One directory per artifact name under the cache root. Each directory holds
//! the binary (plus any siblings copied with it) and a small sidecar recording
//! when and where the entry came from. Entries are never evicted implicitly;
//! `prune`, `remove` and `clear` are the only ways anything is deleted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rnef_core::{BinaryKind, Config};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{CacheError, Result};

/// Sidecar file written into every cache entry
pub const ENTRY_METADATA_FILE: &str = "rnef-cache-entry.json";

/// Prefix of in-flight download directories inside the cache root
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

/// Where a cache entry came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntryOrigin {
    /// Copied in after a local build
    Local,
    /// Downloaded from a remote provider
    Remote(String),
}

impl fmt::Display for EntryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(provider) => write!(f, "remote:{}", provider),
        }
    }
}

impl FromStr for EntryOrigin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "local" => Ok(Self::Local),
            Some(("remote", provider)) if !provider.is_empty() => {
                Ok(Self::Remote(provider.to_string()))
            }
            _ => Err(format!("unknown cache entry origin: {}", s)),
        }
    }
}

impl From<EntryOrigin> for String {
    fn from(origin: EntryOrigin) -> Self {
        origin.to_string()
    }
}

impl TryFrom<String> for EntryOrigin {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMetadata {
    name: String,
    created_at: DateTime<Utc>,
    origin: EntryOrigin,
}

/// A cached build resolved to its binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalBuild {
    /// Artifact name
    pub name: String,
    /// Cache entry directory
    pub artifact_path: PathBuf,
    /// The binary inside `artifact_path`
    pub binary_path: PathBuf,
}

/// A cache entry as seen by maintenance commands
#[derive(Debug, Clone, Serialize)]
pub struct LocalEntry {
    pub name: String,
    pub path: PathBuf,
    /// From the sidecar, falling back to the directory mtime
    pub created_at: Option<DateTime<Utc>>,
    pub origin: Option<EntryOrigin>,
    /// Total size in bytes
    pub size: u64,
}

/// Directory-backed store of native builds keyed by artifact name
#[derive(Debug, Clone)]
pub struct LocalBuildCache {
    root: PathBuf,
}

impl LocalBuildCache {
    /// Create a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache at the location the configuration resolves to
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_dir())
    }

    /// Get the cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for `name`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Look up a cached build, resolving the binary for the given kinds.
    ///
    /// Returns `None` when the entry is missing, is not a directory or holds no
    /// matching binary.
    #[instrument(skip(self, kinds), fields(root = %self.root.display()))]
    pub fn query(&self, name: &str, kinds: &[BinaryKind]) -> Option<LocalBuild> {
        if !is_valid_name(name) {
            debug!(name, "invalid artifact name");
            return None;
        }
        let artifact_path = self.artifact_path(name);
        if !artifact_path.is_dir() {
            debug!(name, "local cache miss");
            return None;
        }
        let Some(binary_path) = find_binary(&artifact_path, kinds) else {
            debug!(name, "local cache entry has no matching binary");
            return None;
        };
        debug!(name, binary = %binary_path.display(), "local cache hit");
        Some(LocalBuild {
            name: name.to_string(),
            artifact_path,
            binary_path,
        })
    }

    /// Copy a freshly built binary into the cache.
    ///
    /// Failures are logged and swallowed; a cache write never fails a build.
    pub fn save(&self, name: &str, binary: &Path) -> Option<PathBuf> {
        match self.try_save(name, binary) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(name, binary = %binary.display(), error = %e, "failed to save build to local cache");
                None
            }
        }
    }

    /// Copy a binary (file or `.app` directory) into the entry for `name`,
    /// returning the cached copy's path
    #[instrument(skip(self), fields(root = %self.root.display(), binary = %binary.display()))]
    pub fn try_save(&self, name: &str, binary: &Path) -> Result<PathBuf> {
        if !is_valid_name(name) {
            return Err(invalid_name(name));
        }
        let file_name = binary.file_name().ok_or_else(|| {
            CacheError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a binary path: {}", binary.display()),
            ))
        })?;

        let entry_dir = self.artifact_path(name);
        fs::create_dir_all(&entry_dir)?;

        let destination = entry_dir.join(file_name);
        if destination.is_dir() {
            fs::remove_dir_all(&destination)?;
        }
        copy_recursive(binary, &destination)?;
        write_metadata(&entry_dir, name, EntryOrigin::Local)?;

        info!(name, path = %destination.display(), "saved build to local cache");
        Ok(destination)
    }

    /// Move a fully prepared directory into place as the entry for `name`,
    /// replacing any existing entry
    pub(crate) fn adopt(&self, name: &str, prepared: &Path, origin: EntryOrigin) -> Result<PathBuf> {
        if !is_valid_name(name) {
            return Err(invalid_name(name));
        }
        write_metadata(prepared, name, origin)?;
        let target = self.artifact_path(name);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(prepared, &target)?;
        Ok(target)
    }

    /// Create a scratch directory inside the cache root. Living on the same
    /// filesystem as the entries lets [`adopt`](Self::adopt) use a rename.
    pub(crate) fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        fs::create_dir_all(&self.root)?;
        Ok(tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&self.root)?)
    }

    /// All entries, sorted by name
    pub fn list(&self) -> Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_dirs()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let metadata = read_metadata(&path);
            let created_at = metadata
                .as_ref()
                .map(|m| m.created_at)
                .or_else(|| modified_at(&path));
            entries.push(LocalEntry {
                name,
                created_at,
                origin: metadata.map(|m| m.origin),
                size: dir_size(&path),
                path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Get cache statistics
    pub fn status(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for path in self.entry_dirs()? {
            stats.entries += 1;
            stats.total_size += dir_size(&path);
        }
        Ok(stats)
    }

    /// Remove entries older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats> {
        info!(max_age_secs = max_age.as_secs(), "pruning local build cache");
        let mut stats = PruneStats::default();
        // An age too large to represent expires nothing
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        for entry in self.list()? {
            stats.total += 1;
            let expired = matches!(
                (entry.created_at, cutoff),
                (Some(created), Some(cutoff)) if created < cutoff
            );
            if expired {
                match fs::remove_dir_all(&entry.path) {
                    Ok(()) => {
                        debug!(name = %entry.name, "pruned cache entry");
                        stats.removed += 1;
                        stats.freed += entry.size;
                        continue;
                    }
                    Err(e) => warn!(name = %entry.name, error = %e, "failed to prune cache entry"),
                }
            }
            stats.kept += 1;
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    /// Remove one entry, returning whether it existed
    pub fn remove(&self, name: &str) -> Result<bool> {
        if !is_valid_name(name) {
            return Err(invalid_name(name));
        }
        let path = self.artifact_path(name);
        if !path.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&path)?;
        info!(name, "removed cache entry");
        Ok(true)
    }

    /// Remove every entry and leftover scratch directory, returning the number
    /// of entries removed
    pub fn clear(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let scratch = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(TEMP_PREFIX));
            fs::remove_dir_all(&path)?;
            if !scratch {
                removed += 1;
            }
        }
        info!(removed, "cleared local build cache");
        Ok(removed)
    }

    fn entry_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if path.is_dir() && !hidden {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }
}

/// Find the binary inside an entry directory.
///
/// Kinds are tried in order; within a kind, candidates are taken in lexical
/// file-name order and the first wins.
pub fn find_binary(dir: &Path, kinds: &[BinaryKind]) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Do not descend into bundles; an .app is itself the binary
            e.depth() == 1 || !has_bundle_ancestor(dir, e.path())
        })
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect();
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));

    kinds
        .iter()
        .find_map(|kind| candidates.iter().find(|p| kind.matches(p)).cloned())
}

fn has_bundle_ancestor(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|relative| {
            relative
                .parent()
                .into_iter()
                .flat_map(Path::components)
                .any(|c| Path::new(c.as_os_str()).extension().is_some_and(|e| e == "app"))
        })
        .unwrap_or(false)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}

fn invalid_name(name: &str) -> CacheError {
    CacheError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid artifact name: {:?}", name),
    ))
}

fn write_metadata(entry_dir: &Path, name: &str, origin: EntryOrigin) -> Result<()> {
    let metadata = EntryMetadata {
        name: name.to_string(),
        created_at: Utc::now(),
        origin,
    };
    let json = serde_json::to_string_pretty(&metadata)?;
    fs::write(entry_dir.join(ENTRY_METADATA_FILE), json)?;
    Ok(())
}

fn read_metadata(entry_dir: &Path) -> Option<EntryMetadata> {
    let content = fs::read_to_string(entry_dir.join(ENTRY_METADATA_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.into())
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Copy a file or directory tree, keeping permissions and symlinks
pub(crate) fn copy_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    if !metadata.is_dir() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, destination)?;
        return Ok(());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(source).map_err(io::Error::other)?;
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link = fs::read_link(source)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
    /// Bytes freed
    pub freed: u64,
}

/// Cache statistics
#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    /// Number of cache entries
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        format_bytes(self.total_size)
    }
}

/// Format a byte count in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
