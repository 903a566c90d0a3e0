//! Build target selection shared by cache commands

use clap::{Args, ValueEnum};
use rnef_cache::{parse_artifact_name, CacheOrchestrator};
use rnef_core::{BinaryKind, BuildTarget, Platform};

use super::{CliError, Project};

/// Target platform argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    Android,
    Ios,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Android => Platform::Android,
            PlatformArg::Ios => Platform::Ios,
        }
    }
}

/// Either an explicit artifact name or a platform plus traits
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Explicit artifact name, bypassing the fingerprint
    #[arg(long, conflicts_with_all = ["platform", "traits"])]
    pub name: Option<String>,

    /// Target platform
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Comma separated build traits, e.g. `debug` or `simulator,Release`
    #[arg(long, requires = "platform")]
    pub traits: Option<String>,
}

/// The artifact a command operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub name: String,
    /// Known when derived from a platform or from a parseable name
    pub target: Option<BuildTarget>,
}

impl ResolvedTarget {
    /// Binary kinds to look for; all of them when the platform is unknown
    pub fn binary_kinds(&self) -> Vec<BinaryKind> {
        match &self.target {
            Some(target) => target.binary_kinds(),
            None => BinaryKind::ALL.to_vec(),
        }
    }
}

impl TargetArgs {
    /// Build target from `--platform` and `--traits`
    pub fn build_target(&self) -> anyhow::Result<Option<BuildTarget>> {
        let Some(platform) = self.platform else {
            return Ok(None);
        };
        let traits = self
            .traits
            .as_deref()
            .map(BuildTarget::parse_traits)
            .unwrap_or_default();
        Ok(Some(BuildTarget::new(platform.into(), traits)?))
    }

    /// Artifact name, fingerprinting the project when no `--name` was given
    pub fn resolve(
        &self,
        project: &Project,
        orchestrator: &CacheOrchestrator,
    ) -> anyhow::Result<ResolvedTarget> {
        if let Some(name) = &self.name {
            let target = parse_artifact_name(name)
                .and_then(|parsed| BuildTarget::new(parsed.platform, parsed.traits).ok());
            return Ok(ResolvedTarget {
                name: name.clone(),
                target,
            });
        }

        let Some(target) = self.build_target()? else {
            return Err(CliError::Usage(
                "Pass --name, or --platform (with --traits) to derive the artifact name".into(),
            )
            .into());
        };
        let name = orchestrator.artifact_name(&project.fetch_request(target.clone()))?;
        Ok(ResolvedTarget {
            name,
            target: Some(target),
        })
    }
}
