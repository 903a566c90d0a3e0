//! Fingerprint computation

use std::path::Path;
use std::sync::Arc;

use rnef_core::Platform;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::enumerator::{NativeSurfaceEnumerator, SourceEnumerator, AUTOLINKING_CONFIG_PREFIX};
use crate::error::{FingerprintError, Result};
use crate::excludes::ExcludeSet;
use crate::resolver::resolve_extra_sources;
use crate::source::FingerprintSource;

/// Inputs to a fingerprint computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintOptions {
    /// Target platform
    pub platform: Platform,

    /// Extra paths, directories or globs hashed after the native sources
    #[serde(default)]
    pub extra_sources: Vec<String>,

    /// Globs excluded from directory hashing and glob expansion
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

impl FingerprintOptions {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            extra_sources: Vec::new(),
            ignore_paths: Vec::new(),
        }
    }

    pub fn with_extra_sources(mut self, sources: Vec<String>) -> Self {
        self.extra_sources = sources;
        self
    }

    pub fn with_ignore_paths(mut self, paths: Vec<String>) -> Self {
        self.ignore_paths = paths;
        self
    }
}

/// Result of a fingerprint computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex encoded SHA-256 digest
    pub hash: String,

    /// Every source considered, including unhashable ones
    pub sources: Vec<FingerprintSource>,
}

/// Computes fingerprints with a pluggable native enumerator
#[derive(Clone)]
pub struct Fingerprinter {
    enumerator: Arc<dyn SourceEnumerator>,
}

impl Fingerprinter {
    pub fn new(enumerator: Arc<dyn SourceEnumerator>) -> Self {
        Self { enumerator }
    }

    /// Compute the fingerprint of `project_root` for the given options
    #[instrument(skip_all, fields(root = %project_root.display(), platform = %options.platform))]
    pub fn compute(&self, project_root: &Path, options: &FingerprintOptions) -> Result<Fingerprint> {
        if !project_root.is_dir() {
            return Err(FingerprintError::ProjectNotFound(project_root.to_path_buf()));
        }

        let excludes = ExcludeSet::with_defaults(&options.ignore_paths)?;

        let mut sources = self.enumerator.enumerate(project_root, options.platform)?;
        sources.extend(resolve_extra_sources(
            &options.extra_sources,
            project_root,
            &options.ignore_paths,
        ));

        let sources: Vec<FingerprintSource> = sources
            .into_iter()
            .filter(|s| !s.id().starts_with(AUTOLINKING_CONFIG_PREFIX))
            .map(|s| s.hashed(project_root, &excludes))
            .collect();

        let mut hasher = Sha256::new();
        let mut hashed = 0usize;
        for source in &sources {
            if let Some(hash) = source.hash() {
                hasher.update(format!("{}-{}\n", source.id(), hash).as_bytes());
                hashed += 1;
            } else {
                debug!(id = %source.id(), "source has no hash, excluded from digest");
            }
        }
        let hash = format!("{:x}", hasher.finalize());

        info!(
            hash = %hash,
            sources = sources.len(),
            hashed,
            "fingerprint computed"
        );
        Ok(Fingerprint { hash, sources })
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(Arc::new(NativeSurfaceEnumerator::new()))
    }
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fingerprinter").finish_non_exhaustive()
    }
}

/// Compute a fingerprint with the default React Native enumerator
pub fn compute_fingerprint(project_root: &Path, options: &FingerprintOptions) -> Result<Fingerprint> {
    Fingerprinter::default().compute(project_root, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, contents: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "package.json", r#"{"scripts":{"start":"rnef start"},"dependencies":{}}"#);
        write(root, "android/app/src/main/AndroidManifest.xml", "<manifest/>");
        write(root, "android/app/build/outputs/apk/debug/app-debug.apk", "apk-1");
        write(root, "ios/Podfile", "platform :ios");
        write(root, "file.txt", "mock content");
        temp
    }

    fn android() -> FingerprintOptions {
        FingerprintOptions::new(Platform::Android)
    }

    #[test]
    fn test_deterministic() {
        let temp = project();
        let first = compute_fingerprint(temp.path(), &android()).unwrap();
        let second = compute_fingerprint(temp.path(), &android()).unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(first.hash.len(), 64);
    }

    #[test]
    fn test_source_change_changes_hash() {
        let temp = project();
        let before = compute_fingerprint(temp.path(), &android()).unwrap();
        write(temp.path(), "android/app/src/main/AndroidManifest.xml", "<manifest package=\"x\"/>");
        let after = compute_fingerprint(temp.path(), &android()).unwrap();
        assert_ne!(before.hash, after.hash);
    }

    #[test]
    fn test_build_output_change_keeps_hash() {
        let temp = project();
        let before = compute_fingerprint(temp.path(), &android()).unwrap();
        write(temp.path(), "android/app/build/outputs/apk/debug/app-debug.apk", "apk-2");
        write(temp.path(), "android/build/tmp/cache.bin", "x");
        let after = compute_fingerprint(temp.path(), &android()).unwrap();
        assert_eq!(before.hash, after.hash);
    }

    #[test]
    fn test_other_platform_change_keeps_hash() {
        let temp = project();
        let before = compute_fingerprint(temp.path(), &android()).unwrap();
        write(temp.path(), "ios/Podfile", "platform :ios, '16.0'");
        let after = compute_fingerprint(temp.path(), &android()).unwrap();
        assert_eq!(before.hash, after.hash);
    }

    #[test]
    fn test_platforms_differ() {
        let temp = project();
        let android = compute_fingerprint(temp.path(), &android()).unwrap();
        let ios = compute_fingerprint(temp.path(), &FingerprintOptions::new(Platform::Ios)).unwrap();
        assert_ne!(android.hash, ios.hash);
    }

    #[test]
    fn test_extra_sources_contribute() {
        let temp = project();
        let options = android().with_extra_sources(vec!["file.txt".into(), "missing.txt".into()]);
        let before = compute_fingerprint(temp.path(), &options).unwrap();
        assert!(before
            .sources
            .iter()
            .any(|s| s.id().ends_with("file.txt") && s.hash().is_some()));

        write(temp.path(), "file.txt", "changed");
        let after = compute_fingerprint(temp.path(), &options).unwrap();
        assert_ne!(before.hash, after.hash);
    }

    #[test]
    fn test_ignore_paths_exclude_from_dirs() {
        let temp = project();
        write(temp.path(), "android/app/src/debug/Flipper.kt", "v1");
        let options = android().with_ignore_paths(vec!["android/app/src/debug".into()]);
        let before = compute_fingerprint(temp.path(), &options).unwrap();
        write(temp.path(), "android/app/src/debug/Flipper.kt", "v2");
        let after = compute_fingerprint(temp.path(), &options).unwrap();
        assert_eq!(before.hash, after.hash);
    }

    #[test]
    fn test_autolinking_config_filtered() {
        let temp = project();
        let fingerprint = compute_fingerprint(temp.path(), &android()).unwrap();
        assert!(!fingerprint
            .sources
            .iter()
            .any(|s| s.id().starts_with(AUTOLINKING_CONFIG_PREFIX)));
    }

    #[test]
    fn test_same_project_in_two_locations_matches() {
        let a = project();
        let b = project();
        let fa = compute_fingerprint(a.path(), &android()).unwrap();
        let fb = compute_fingerprint(b.path(), &android()).unwrap();
        assert_eq!(fa.hash, fb.hash);
    }

    #[test]
    fn test_unhashable_sources_kept() {
        struct Fixed(Vec<FingerprintSource>);
        impl SourceEnumerator for Fixed {
            fn enumerate(&self, _: &Path, _: Platform) -> Result<Vec<FingerprintSource>> {
                Ok(self.0.clone())
            }
        }

        let temp = project();
        let with_missing = Fingerprinter::new(Arc::new(Fixed(vec![
            FingerprintSource::file("gone", "does/not/exist", "test"),
            FingerprintSource::contents("kept", "x", "test"),
        ])))
        .compute(temp.path(), &android())
        .unwrap();
        assert_eq!(with_missing.sources.len(), 2);
        assert_eq!(with_missing.sources[0].hash(), None);

        let only_kept = Fingerprinter::new(Arc::new(Fixed(vec![FingerprintSource::contents(
            "kept", "x", "test",
        )])))
        .compute(temp.path(), &android())
        .unwrap();
        assert_eq!(with_missing.hash, only_kept.hash);
    }

    #[test]
    fn test_missing_project_root() {
        let err = compute_fingerprint(Path::new("/definitely/not/here"), &android());
        assert!(matches!(err, Err(FingerprintError::ProjectNotFound(_))));
    }
}
