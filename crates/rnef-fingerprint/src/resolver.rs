//! Resolution of user-declared extra fingerprint sources
//!
//! Extra sources come from configuration as literal paths, directories or glob
//! patterns. Resolution never fails as a whole: a path that is missing,
//! unreadable or not UTF-8 is logged and skipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::excludes::ExcludeSet;
use crate::source::{slash_path, FingerprintSource};

/// Reason attached to every source resolved from user configuration
pub const CUSTOM_USER_CONFIG_REASON: &str = "custom-user-config";

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// Whether a declared source should be expanded as a glob
pub fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Expand extra source declarations into fingerprint sources.
///
/// Patterns are processed in the order given; glob matches follow a
/// file-name-ordered walk. Files become `contents` sources (read eagerly as
/// UTF-8, identified by absolute path) and directories become `dir` sources
/// (relative to the project root when inside it). Duplicate ids keep their
/// first occurrence.
#[instrument(skip(patterns, ignore_paths), fields(count = patterns.len()))]
pub fn resolve_extra_sources<S: AsRef<str>>(
    patterns: &[S],
    project_root: &Path,
    ignore_paths: &[S],
) -> Vec<FingerprintSource> {
    let ignores = match ExcludeSet::new(ignore_paths) {
        Ok(set) => set,
        Err(e) => {
            debug!(error = %e, "ignoring invalid ignore paths");
            ExcludeSet::empty()
        }
    };

    let mut sources = Vec::new();
    let mut seen = HashSet::new();

    for pattern in patterns {
        let pattern = strip_current_dir(pattern.as_ref());
        let resolved = if is_glob_pattern(pattern) {
            expand_glob(pattern, project_root, &ignores)
        } else {
            resolve_literal(pattern, project_root).into_iter().collect()
        };

        for source in resolved {
            if seen.insert(source.id()) {
                sources.push(source);
            }
        }
    }

    debug!(resolved = sources.len(), "extra sources resolved");
    sources
}

/// `./patches/*.patch` and `patches/*.patch` name the same files
fn strip_current_dir(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.trim_start_matches('/');
    }
    pattern
}

fn resolve_literal(pattern: &str, project_root: &Path) -> Option<FingerprintSource> {
    let path = Path::new(pattern);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };

    match fs::metadata(&absolute) {
        Ok(_) => source_for_path(&absolute, project_root),
        Err(e) => {
            debug!(path = %absolute.display(), error = %e, "extra source does not exist, skipping");
            None
        }
    }
}

fn expand_glob(pattern: &str, project_root: &Path, ignores: &ExcludeSet) -> Vec<FingerprintSource> {
    let matcher = match compile(pattern) {
        Some(m) => m,
        None => return Vec::new(),
    };

    let absolute_pattern = Path::new(pattern).is_absolute();
    let base = literal_base(pattern);
    let walk_root = if absolute_pattern {
        base.clone()
    } else {
        project_root.join(&base)
    };

    if !walk_root.is_dir() {
        debug!(pattern, base = %walk_root.display(), "glob base does not exist");
        return Vec::new();
    }

    let relative = |p: &Path| -> PathBuf {
        p.strip_prefix(project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| p.to_path_buf())
    };

    let mut matches = Vec::new();
    let walker = WalkDir::new(&walk_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !ignores.is_excluded(&relative(e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(pattern, error = %e, "skipping unreadable glob entry");
                continue;
            }
        };
        let candidate = if absolute_pattern {
            entry.path().to_path_buf()
        } else {
            relative(entry.path())
        };
        if !matcher.is_match(&candidate) {
            continue;
        }
        if let Some(source) = source_for_path(entry.path(), project_root) {
            matches.push(source);
        }
    }

    debug!(pattern, matches = matches.len(), "glob expanded");
    matches
}

fn compile(pattern: &str) -> Option<GlobMatcher> {
    match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            debug!(pattern, error = %e, "invalid glob pattern, skipping");
            None
        }
    }
}

/// Leading path components that contain no glob metacharacters
fn literal_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let components: Vec<&str> = pattern.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        // The final component is what gets matched, never part of the base
        if is_glob_pattern(component) || i == components.len() - 1 {
            break;
        }
        if component.is_empty() && i == 0 {
            base.push("/");
        } else {
            base.push(component);
        }
    }
    base
}

fn source_for_path(path: &Path, project_root: &Path) -> Option<FingerprintSource> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to stat extra source");
            return None;
        }
    };

    if metadata.is_dir() {
        let relative = path.strip_prefix(project_root).unwrap_or(path);
        return Some(FingerprintSource::dir(
            PathBuf::from(slash_path(relative)),
            CUSTOM_USER_CONFIG_REASON,
        ));
    }

    match fs::read_to_string(path) {
        Ok(contents) => Some(FingerprintSource::contents(
            path.to_string_lossy(),
            contents,
            CUSTOM_USER_CONFIG_REASON,
        )),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to read extra source");
            None
        }
    }
}
