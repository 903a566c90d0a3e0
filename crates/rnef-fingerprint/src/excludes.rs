//! Directory exclusion rules
//!
//! Build outputs, IDE state and installed pods are either non-deterministic or
//! irrelevant to native behaviour and never take part in a fingerprint.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{FingerprintError, Result};

/// Glob patterns, relative to the project root, skipped while hashing directories
pub fn default_dir_excludes() -> Vec<&'static str> {
    vec![
        "android/build",
        "android/**/build",
        "android/**/.cxx",
        "android/.gradle",
        "android/**/.gradle",
        "android/.idea",
        "android/local.properties",
        "ios/DerivedData",
        "ios/Pods",
        "ios/build",
        "**/xcuserdata",
        "**/.cxx",
        "**/node_modules/**/node_modules",
        "node_modules/**/android/build",
    ]
}

/// Compiled set of exclusion globs.
///
/// Every pattern excludes the matched path and everything below it, so
/// `ios/Pods` also covers `ios/Pods/Target Support Files/...`.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeSet {
    /// Compile a set of patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref().trim_end_matches('/');
            for candidate in [pattern.to_string(), format!("{}/**", pattern)] {
                let glob = GlobBuilder::new(&candidate)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| FingerprintError::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    })?;
                builder.add(glob);
            }
            compiled.push(pattern.to_string());
        }

        let set = builder.build().map_err(|e| FingerprintError::InvalidPattern {
            pattern: compiled.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            set,
            patterns: compiled,
        })
    }

    /// The default excludes plus user supplied ignore paths
    pub fn with_defaults<S: AsRef<str>>(ignore_paths: &[S]) -> Result<Self> {
        let mut patterns: Vec<String> = default_dir_excludes()
            .into_iter()
            .map(str::to_string)
            .collect();
        patterns.extend(ignore_paths.iter().map(|p| p.as_ref().to_string()));
        Self::new(&patterns)
    }

    /// An empty set that excludes nothing
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check a path relative to the project root
    pub fn is_excluded(&self, relative: &Path) -> bool {
        !self.patterns.is_empty() && self.set.is_match(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ExcludeSet {
        ExcludeSet::with_defaults::<&str>(&[]).unwrap()
    }

    #[test]
    fn test_build_outputs_excluded() {
        let set = defaults();
        assert!(set.is_excluded(Path::new("android/build/outputs/apk/debug/app-debug.apk")));
        assert!(set.is_excluded(Path::new("android/app/build")));
        assert!(set.is_excluded(Path::new("android/app/build/intermediates/x.dex")));
        assert!(set.is_excluded(Path::new("android/app/.cxx/cmake/debug")));
        assert!(set.is_excluded(Path::new("ios/Pods/Manifest.lock")));
        assert!(set.is_excluded(Path::new("ios/App.xcodeproj/xcuserdata/me.xcuserdatad")));
    }

    #[test]
    fn test_sources_not_excluded() {
        let set = defaults();
        assert!(!set.is_excluded(Path::new("android/app/src/main/AndroidManifest.xml")));
        assert!(!set.is_excluded(Path::new("android/build.gradle")));
        assert!(!set.is_excluded(Path::new("ios/Podfile")));
        assert!(!set.is_excluded(Path::new("node_modules/react-native-svg/android/src/Svg.java")));
    }

    #[test]
    fn test_user_ignore_paths() {
        let set = ExcludeSet::with_defaults(&["android/app/src/debug"]).unwrap();
        assert!(set.is_excluded(Path::new("android/app/src/debug/AndroidManifest.xml")));
        assert!(!set.is_excluded(Path::new("android/app/src/main/AndroidManifest.xml")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            ExcludeSet::new(&["android/[build"]),
            Err(FingerprintError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_empty_set() {
        assert!(!ExcludeSet::empty().is_excluded(Path::new("android/build")));
    }
}
