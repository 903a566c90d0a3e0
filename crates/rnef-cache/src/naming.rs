//! Artifact naming
//!
//! Names have the shape `rnef-<platform>-<trait>...-<hash>`. Trait tokens never
//! contain `-`, which keeps names parseable and lets listings filter by prefix.

use rnef_core::Platform;

/// Leading token of every derived artifact name
pub const ARTIFACT_PREFIX: &str = "rnef";

const SEPARATOR: char = '-';

/// Build the artifact name for a platform, traits and fingerprint hash.
///
/// An explicit `name` is returned verbatim and bypasses derivation.
pub fn format_artifact_name(
    platform: Platform,
    traits: &[String],
    hash: &str,
    name: Option<&str>,
) -> String {
    if let Some(name) = name {
        return name.to_string();
    }
    format!("{}{}", artifact_prefix(platform, traits), hash)
}

/// Name prefix shared by every fingerprint of a platform and trait set,
/// including the trailing separator
pub fn artifact_prefix(platform: Platform, traits: &[String]) -> String {
    let mut prefix = format!("{}{}{}{}", ARTIFACT_PREFIX, SEPARATOR, platform, SEPARATOR);
    for t in traits {
        prefix.push_str(t);
        prefix.push(SEPARATOR);
    }
    prefix
}

/// Components of a derived artifact name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifactName {
    pub platform: Platform,
    pub traits: Vec<String>,
    pub hash: String,
}

/// Split a derived name back into its components; `None` for explicit names
pub fn parse_artifact_name(name: &str) -> Option<ParsedArtifactName> {
    let mut parts: Vec<&str> = name.split(SEPARATOR).collect();
    if parts.len() < 3 || parts[0] != ARTIFACT_PREFIX {
        return None;
    }
    let platform = Platform::parse(parts[1])?;
    let hash = parts.pop()?.to_string();
    if hash.is_empty() {
        return None;
    }
    let traits = parts[2..].iter().map(|t| t.to_string()).collect();
    Some(ParsedArtifactName {
        platform,
        traits,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traits(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_android_debug_name() {
        assert_eq!(
            format_artifact_name(Platform::Android, &traits(&["debug"]), "abc123", None),
            "rnef-android-debug-abc123"
        );
    }

    #[test]
    fn test_apple_traits_keep_order() {
        assert_eq!(
            format_artifact_name(Platform::Ios, &traits(&["simulator", "Release"]), "ff00", None),
            "rnef-ios-simulator-Release-ff00"
        );
    }

    #[test]
    fn test_explicit_name_wins() {
        assert_eq!(
            format_artifact_name(Platform::Android, &traits(&["debug"]), "abc123", Some("my-build")),
            "my-build"
        );
    }

    #[test]
    fn test_distinct_inputs_distinct_names() {
        let a = format_artifact_name(Platform::Android, &traits(&["debug"]), "abc", None);
        let b = format_artifact_name(Platform::Android, &traits(&["release"]), "abc", None);
        let c = format_artifact_name(Platform::Ios, &traits(&["debug"]), "abc", None);
        let d = format_artifact_name(Platform::Android, &traits(&["debug"]), "abd", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_prefix_matches_derived_names() {
        let prefix = artifact_prefix(Platform::Android, &traits(&["debug"]));
        assert_eq!(prefix, "rnef-android-debug-");
        assert!(format_artifact_name(Platform::Android, &traits(&["debug"]), "abc", None)
            .starts_with(&prefix));
    }

    #[test]
    fn test_parse_round_trip() {
        let parsed = parse_artifact_name("rnef-ios-device-Release-0a1b").unwrap();
        assert_eq!(parsed.platform, Platform::Ios);
        assert_eq!(parsed.traits, traits(&["device", "Release"]));
        assert_eq!(parsed.hash, "0a1b");
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_artifact_name("my-build"), None);
        assert_eq!(parse_artifact_name("rnef-windows-debug-abc"), None);
        assert_eq!(parse_artifact_name("rnef-android"), None);
    }
}
