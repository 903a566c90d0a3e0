//! Fingerprint sources and per-source hashing

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::excludes::ExcludeSet;

/// One contributor to a fingerprint.
///
/// `hash` is filled in by [`FingerprintSource::hashed`]. Sources whose hash
/// stays `None` (a missing file, an unreadable directory) are kept for
/// diagnostics but do not feed the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FingerprintSource {
    /// Literal contents identified by `id`
    Contents {
        id: String,
        contents: String,
        reasons: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },

    /// A single file read at hashing time
    File {
        id: String,
        #[serde(rename = "filePath")]
        file_path: PathBuf,
        reasons: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },

    /// A directory hashed recursively
    Dir {
        #[serde(rename = "filePath")]
        file_path: PathBuf,
        reasons: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },
}

impl FingerprintSource {
    pub fn contents(id: impl Into<String>, contents: impl Into<String>, reason: &str) -> Self {
        Self::Contents {
            id: id.into(),
            contents: contents.into(),
            reasons: vec![reason.to_string()],
            hash: None,
        }
    }

    pub fn file(id: impl Into<String>, file_path: impl Into<PathBuf>, reason: &str) -> Self {
        Self::File {
            id: id.into(),
            file_path: file_path.into(),
            reasons: vec![reason.to_string()],
            hash: None,
        }
    }

    pub fn dir(file_path: impl Into<PathBuf>, reason: &str) -> Self {
        Self::Dir {
            file_path: file_path.into(),
            reasons: vec![reason.to_string()],
            hash: None,
        }
    }

    /// Stable identifier, always written with `/` separators
    pub fn id(&self) -> String {
        match self {
            Self::Contents { id, .. } | Self::File { id, .. } => id.clone(),
            Self::Dir { file_path, .. } => slash_path(file_path),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Contents { .. } => "contents",
            Self::File { .. } => "file",
            Self::Dir { .. } => "dir",
        }
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Contents { reasons, .. } | Self::File { reasons, .. } | Self::Dir { reasons, .. } => {
                reasons
            }
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Contents { hash, .. } | Self::File { hash, .. } | Self::Dir { hash, .. } => {
                hash.as_deref()
            }
        }
    }

    /// Compute this source's hash, resolving relative paths against `root`
    pub fn hashed(mut self, root: &Path, excludes: &ExcludeSet) -> Self {
        let computed = match &self {
            Self::Contents { contents, .. } => Some(hex_digest(contents.as_bytes())),
            Self::File { file_path, .. } => hash_file(&resolve(root, file_path)),
            Self::Dir { file_path, .. } => hash_dir(root, &resolve(root, file_path), excludes),
        };
        match &mut self {
            Self::Contents { hash, .. } | Self::File { hash, .. } | Self::Dir { hash, .. } => {
                *hash = computed;
            }
        }
        self
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Render a path with forward slashes so ids match across platforms
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn hash_file(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(hex_digest(&bytes)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "file source not hashable");
            None
        }
    }
}

/// Walk a directory in file-name order, feeding `<relative path>\0<file digest>\n`
/// for each regular file that is not excluded.
fn hash_dir(root: &Path, dir: &Path, excludes: &ExcludeSet) -> Option<String> {
    if !dir.is_dir() {
        debug!(path = %dir.display(), "dir source missing");
        return None;
    }

    let relative_to_root = |p: &Path| -> PathBuf {
        p.strip_prefix(root)
            .or_else(|_| p.strip_prefix(dir))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| p.to_path_buf())
    };

    let mut hasher = Sha256::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !excludes.is_excluded(&relative_to_root(e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_hash) = hash_file(entry.path()) else {
            continue;
        };
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        hasher.update(slash_path(relative).as_bytes());
        hasher.update(b"\0");
        hasher.update(file_hash.as_bytes());
        hasher.update(b"\n");
    }

    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_contents_hash() {
        let source = FingerprintSource::contents("id", "hello", "test")
            .hashed(Path::new("/"), &ExcludeSet::empty());
        assert_eq!(
            source.hash(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[test]
    fn test_missing_file_has_no_hash() {
        let temp = TempDir::new().unwrap();
        let source = FingerprintSource::file("missing", "missing.txt", "test")
            .hashed(temp.path(), &ExcludeSet::empty());
        assert_eq!(source.hash(), None);
        assert_eq!(source.id(), "missing");
    }

    #[test]
    fn test_dir_hash_respects_excludes() {
        let temp = TempDir::new().unwrap();
        let android = temp.path().join("android");
        fs::create_dir_all(android.join("app/src")).unwrap();
        fs::create_dir_all(android.join("app/build")).unwrap();
        fs::write(android.join("app/src/Main.kt"), "fun main() {}").unwrap();
        fs::write(android.join("app/build/out.dex"), "v1").unwrap();

        let excludes = ExcludeSet::with_defaults::<&str>(&[]).unwrap();
        let first = FingerprintSource::dir("android", "test").hashed(temp.path(), &excludes);

        fs::write(android.join("app/build/out.dex"), "v2").unwrap();
        let second = FingerprintSource::dir("android", "test").hashed(temp.path(), &excludes);
        assert_eq!(first.hash(), second.hash());

        fs::write(android.join("app/src/Main.kt"), "fun main() { println() }").unwrap();
        let third = FingerprintSource::dir("android", "test").hashed(temp.path(), &excludes);
        assert_ne!(first.hash(), third.hash());
    }

    #[test]
    fn test_dir_hash_sees_renames() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("ios")).unwrap();
        fs::write(temp.path().join("ios/Podfile"), "platform :ios").unwrap();
        let before = FingerprintSource::dir("ios", "test").hashed(temp.path(), &ExcludeSet::empty());

        fs::rename(temp.path().join("ios/Podfile"), temp.path().join("ios/Podfile.old")).unwrap();
        let after = FingerprintSource::dir("ios", "test").hashed(temp.path(), &ExcludeSet::empty());
        assert_ne!(before.hash(), after.hash());
    }

    #[test]
    fn test_serialized_shape() {
        let source = FingerprintSource::dir("android", "bareNativeDir");
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["filePath"], "android");
        assert_eq!(json["reasons"][0], "bareNativeDir");
        assert!(json.get("hash").is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let parsed = serde_json::from_str::<FingerprintSource>(
            r#"{"type":"url","id":"x","reasons":[]}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_slash_path() {
        assert_eq!(slash_path(Path::new("android/app")), "android/app");
        assert_eq!(slash_path(Path::new("/abs/file.txt")), "/abs/file.txt");
    }
}
