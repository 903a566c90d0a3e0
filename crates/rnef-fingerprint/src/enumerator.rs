//! Enumeration of a project's native surface

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rnef_core::Platform;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::source::FingerprintSource;

/// Id prefix of the autolinking config source. Its contents embed absolute
/// paths, so the fingerprint drops it before hashing.
pub const AUTOLINKING_CONFIG_PREFIX: &str = "rncoreAutolinkingConfig";

/// Produces the platform-specific sources of a fingerprint.
///
/// Implementations must return sources in a stable order for a given
/// filesystem state; the digest depends on it.
pub trait SourceEnumerator: Send + Sync {
    /// List the sources for `platform` under `project_root`
    fn enumerate(&self, project_root: &Path, platform: Platform) -> Result<Vec<FingerprintSource>>;
}

/// Default enumerator for React Native projects.
///
/// Yields, in order: the bare native directory, `package.json` scripts,
/// `app.json`, `react-native.config.js`, every native dependency (sorted by
/// package name) and the autolinking config.
#[derive(Debug, Default, Clone)]
pub struct NativeSurfaceEnumerator;

impl NativeSurfaceEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl SourceEnumerator for NativeSurfaceEnumerator {
    #[instrument(skip_all, fields(root = %project_root.display(), platform = %platform))]
    fn enumerate(&self, project_root: &Path, platform: Platform) -> Result<Vec<FingerprintSource>> {
        let mut sources = Vec::new();

        let native_dir = project_root.join(platform.native_dir());
        if native_dir.is_dir() {
            sources.push(FingerprintSource::dir(platform.native_dir(), "bareNativeDir"));
        }

        let package_json = read_package_json(project_root)?;
        if let Some(scripts) = package_json.as_ref().and_then(|p| p.get("scripts")) {
            sources.push(FingerprintSource::contents(
                "packageJson:scripts",
                serde_json::to_string(scripts)?,
                "packageJson:scripts",
            ));
        }

        for (file, reason) in [("app.json", "expoConfig"), ("react-native.config.js", "rncoreConfig")] {
            if project_root.join(file).is_file() {
                sources.push(FingerprintSource::file(file, file, reason));
            }
        }

        let mut linked = Vec::new();
        for name in dependency_names(package_json.as_ref()) {
            let package_dir = project_root.join("node_modules").join(&name);
            let native = native_sources(&name, &package_dir, platform);
            if native.is_empty() {
                continue;
            }
            linked.push(json!({
                "name": name,
                "root": package_dir.to_string_lossy(),
            }));
            sources.push(FingerprintSource::file(
                format!("node_modules/{}/package.json", name),
                PathBuf::from("node_modules").join(&name).join("package.json"),
                autolinking_reason(platform),
            ));
            sources.extend(native);
        }

        let config = json!({
            "platform": platform.as_str(),
            "project": project_root.to_string_lossy(),
            "dependencies": linked,
        });
        sources.push(FingerprintSource::contents(
            format!("{}:{}", AUTOLINKING_CONFIG_PREFIX, platform),
            serde_json::to_string(&config)?,
            autolinking_reason(platform),
        ));

        debug!(count = sources.len(), "native sources enumerated");
        Ok(sources)
    }
}

fn autolinking_reason(platform: Platform) -> &'static str {
    match platform {
        Platform::Android => "rncoreAutolinkingAndroid",
        Platform::Ios => "rncoreAutolinkingIos",
    }
}

fn read_package_json(project_root: &Path) -> Result<Option<Value>> {
    let path = project_root.join("package.json");
    if !path.is_file() {
        debug!(path = %path.display(), "no package.json");
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// `dependencies` and `devDependencies` names, sorted and deduplicated
fn dependency_names(package_json: Option<&Value>) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Some(package_json) = package_json else {
        return names;
    };
    for field in ["dependencies", "devDependencies"] {
        if let Some(deps) = package_json.get(field).and_then(Value::as_object) {
            names.extend(deps.keys().cloned());
        }
    }
    names
}

/// Native code a dependency contributes for `platform`, empty for JS-only packages
fn native_sources(name: &str, package_dir: &Path, platform: Platform) -> Vec<FingerprintSource> {
    let reason = autolinking_reason(platform);
    let relative = PathBuf::from("node_modules").join(name);
    let mut sources = Vec::new();

    match platform {
        Platform::Android => {
            if package_dir.join("android").is_dir() {
                sources.push(FingerprintSource::dir(relative.join("android"), reason));
            }
        }
        Platform::Ios => {
            for podspec in podspecs(package_dir) {
                let id = format!("node_modules/{}/{}", name, podspec);
                sources.push(FingerprintSource::file(id, relative.join(&podspec), reason));
            }
            if !sources.is_empty() && package_dir.join("ios").is_dir() {
                sources.push(FingerprintSource::dir(relative.join("ios"), reason));
            }
        }
    }

    sources
}

fn podspecs(package_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(package_dir) else {
        return Vec::new();
    };
    let mut specs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".podspec"))
        .collect();
    specs.sort();
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, contents: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(
            root,
            "package.json",
            r#"{
  "name": "app",
  "scripts": { "start": "rnef start" },
  "dependencies": { "react-native-svg": "15.0.0", "lodash": "4.17.21" },
  "devDependencies": { "@scope/native-lib": "1.0.0" }
}"#,
        );
        write(root, "android/app/build.gradle", "apply plugin: 'com.android.application'");
        write(root, "ios/Podfile", "platform :ios, '15.0'");
        write(root, "node_modules/react-native-svg/package.json", "{}");
        write(root, "node_modules/react-native-svg/android/build.gradle", "");
        write(root, "node_modules/react-native-svg/RNSVG.podspec", "");
        write(root, "node_modules/react-native-svg/apple/RNSVG.mm", "");
        write(root, "node_modules/lodash/package.json", "{}");
        write(root, "node_modules/@scope/native-lib/package.json", "{}");
        write(root, "node_modules/@scope/native-lib/android/src/Lib.kt", "");
        temp
    }

    fn ids(sources: &[FingerprintSource]) -> Vec<String> {
        sources.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_android_sources() {
        let temp = project();
        let sources = NativeSurfaceEnumerator::new()
            .enumerate(temp.path(), Platform::Android)
            .unwrap();

        assert_eq!(
            ids(&sources),
            vec![
                "android",
                "packageJson:scripts",
                "node_modules/@scope/native-lib/package.json",
                "node_modules/@scope/native-lib/android",
                "node_modules/react-native-svg/package.json",
                "node_modules/react-native-svg/android",
                "rncoreAutolinkingConfig:android",
            ]
        );
    }

    #[test]
    fn test_ios_sources_skip_android() {
        let temp = project();
        let sources = NativeSurfaceEnumerator::new()
            .enumerate(temp.path(), Platform::Ios)
            .unwrap();

        let ids = ids(&sources);
        assert_eq!(ids[0], "ios");
        assert!(ids.contains(&"node_modules/react-native-svg/RNSVG.podspec".to_string()));
        assert!(!ids.iter().any(|id| id.contains("android")));
        assert!(!ids.iter().any(|id| id.contains("native-lib")));
    }

    #[test]
    fn test_order_is_stable() {
        let temp = project();
        let enumerator = NativeSurfaceEnumerator::new();
        let first = enumerator.enumerate(temp.path(), Platform::Android).unwrap();
        let second = enumerator.enumerate(temp.path(), Platform::Android).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_without_package_json() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("android")).unwrap();
        let sources = NativeSurfaceEnumerator::new()
            .enumerate(temp.path(), Platform::Android)
            .unwrap();
        assert_eq!(ids(&sources), vec!["android", "rncoreAutolinkingConfig:android"]);
    }

    #[test]
    fn test_malformed_package_json_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("package.json"), "{ not json").unwrap();
        assert!(NativeSurfaceEnumerator::new()
            .enumerate(temp.path(), Platform::Android)
            .is_err());
    }
}
