//! Platform and build target types

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RnefError;

/// Native platforms an artifact can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android (Gradle)
    Android,
    /// iOS (Xcode)
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "android" => Some(Self::Android),
            "ios" | "apple" => Some(Self::Ios),
            _ => None,
        }
    }

    /// Name of the native project directory at the project root
    pub fn native_dir(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = RnefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| RnefError::InvalidPlatform(s.to_string()))
    }
}

/// Apple build destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Simulator,
    Device,
}

impl Distribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulator => "simulator",
            Self::Device => "device",
        }
    }
}

/// Kind of native binary stored in a cached artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    /// Android APK
    Apk,
    /// Android App Bundle
    Aab,
    /// iOS archive for devices
    Ipa,
    /// iOS app bundle for simulators (a directory)
    App,
}

impl BinaryKind {
    /// Every kind, in resolution order for artifacts of unknown origin
    pub const ALL: [BinaryKind; 4] = [Self::Apk, Self::Aab, Self::Ipa, Self::App];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Aab => "aab",
            Self::Ipa => "ipa",
            Self::App => "app",
        }
    }

    /// `.app` bundles are directories, everything else is a single file
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::App)
    }

    /// Check whether a path on disk is a binary of this kind
    pub fn matches(&self, path: &Path) -> bool {
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension()));
        if !ext_matches {
            return false;
        }
        if self.is_directory() {
            path.is_dir()
        } else {
            path.is_file()
        }
    }
}

/// A platform plus the trait tokens that distinguish its build flavours.
///
/// Android uses `[variant]` (e.g. `debug`), Apple uses
/// `[destination, configuration]` (e.g. `simulator`, `Release`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTarget {
    pub platform: Platform,
    pub traits: Vec<String>,
}

impl BuildTarget {
    /// Create a build target, rejecting trait tokens that would break name parsing
    pub fn new(platform: Platform, traits: Vec<String>) -> Result<Self, RnefError> {
        for t in &traits {
            if t.is_empty() || t.contains('-') {
                return Err(RnefError::InvalidTrait(t.clone()));
            }
        }
        Ok(Self { platform, traits })
    }

    /// Parse a comma separated trait list (`--traits debug` or `--traits simulator,Release`)
    pub fn parse_traits(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }

    /// Apple destination encoded in the traits, if any
    pub fn distribution(&self) -> Option<Distribution> {
        if self.platform != Platform::Ios {
            return None;
        }
        if self.traits.iter().any(|t| t.eq_ignore_ascii_case("device")) {
            Some(Distribution::Device)
        } else {
            Some(Distribution::Simulator)
        }
    }

    /// Binary kinds to look for inside a cached artifact, in priority order
    pub fn binary_kinds(&self) -> Vec<BinaryKind> {
        match self.platform {
            Platform::Android => vec![BinaryKind::Apk, BinaryKind::Aab],
            Platform::Ios => match self.distribution() {
                Some(Distribution::Device) => vec![BinaryKind::Ipa],
                _ => vec![BinaryKind::App],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("android"), Some(Platform::Android));
        assert_eq!(Platform::parse("iOS"), Some(Platform::Ios));
        assert_eq!(Platform::parse("harmony"), None);
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn test_parse_traits() {
        assert_eq!(BuildTarget::parse_traits("debug"), vec!["debug"]);
        assert_eq!(
            BuildTarget::parse_traits("simulator, Release,"),
            vec!["simulator", "Release"]
        );
        assert!(BuildTarget::parse_traits("").is_empty());
    }

    #[test]
    fn test_trait_with_separator_rejected() {
        let err = BuildTarget::new(Platform::Android, vec!["release-staging".into()]);
        assert!(matches!(err, Err(RnefError::InvalidTrait(_))));
    }

    #[test]
    fn test_binary_kinds() {
        let android = BuildTarget::new(Platform::Android, vec!["debug".into()]).unwrap();
        assert_eq!(android.binary_kinds(), vec![BinaryKind::Apk, BinaryKind::Aab]);

        let sim = BuildTarget::new(Platform::Ios, vec!["simulator".into(), "Debug".into()]).unwrap();
        assert_eq!(sim.binary_kinds(), vec![BinaryKind::App]);

        let device = BuildTarget::new(Platform::Ios, vec!["device".into(), "Release".into()]).unwrap();
        assert_eq!(device.distribution(), Some(Distribution::Device));
        assert_eq!(device.binary_kinds(), vec![BinaryKind::Ipa]);
    }

    #[test]
    fn test_binary_kind_matches() {
        let temp = tempfile::TempDir::new().unwrap();
        let apk = temp.path().join("app-debug.apk");
        std::fs::write(&apk, b"apk").unwrap();
        let app = temp.path().join("HelloWorld.app");
        std::fs::create_dir(&app).unwrap();

        assert!(BinaryKind::Apk.matches(&apk));
        assert!(!BinaryKind::Aab.matches(&apk));
        assert!(BinaryKind::App.matches(&app));

        // A file named like a bundle is not a bundle
        let fake_app = temp.path().join("Fake.app.txt");
        std::fs::write(&fake_app, b"").unwrap();
        assert!(!BinaryKind::App.matches(&fake_app));
    }
}
