//! Remote cache command

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use console::style;
use tracing::info;

use rnef_cache::{artifact_prefix, RemoteArtifact, RemoteBuildCache, UploadSource};

use crate::cli::{output, run_async, Cli, CliError, OutputFormat, Project, TargetArgs};
use crate::exit_codes;

/// Inspect and manage artifacts in the remote cache
#[derive(Debug, Args)]
pub struct RemoteCacheCommand {
    /// Action to perform
    #[arg(value_enum)]
    pub action: RemoteAction,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Binary to upload; defaults to the local cache entry
    #[arg(long)]
    pub binary_path: Option<PathBuf>,

    /// Maximum number of artifacts to delete
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Remote cache actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RemoteAction {
    /// Show the artifact for the current fingerprint or name
    List,
    /// Show every artifact, optionally narrowed by platform and traits
    ListAll,
    /// Download an artifact into the local cache
    Download,
    /// Upload a binary under the artifact name
    Upload,
    /// Delete artifacts with the artifact name
    Delete,
}

impl RemoteCacheCommand {
    /// Execute the remote-cache command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(action = ?self.action, "executing remote-cache command");
        run_async(self.execute_async(cli))
    }

    fn json_output(&self, cli: &Cli) -> bool {
        self.json || cli.format == OutputFormat::Json
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = Project::load()?;
        let orchestrator = project.orchestrator(cli);

        let provider = orchestrator.provider()?.ok_or(CliError::NoProvider)?;
        let Some(details) = provider.detect_repo_details().await? else {
            return Err(CliError::Usage(format!(
                "{} cannot be used here: repository or credentials could not be determined",
                provider.name()
            ))
            .into());
        };
        if cli.is_interactive_text() && !self.json {
            output::info(&format!(
                "Using {} at {}",
                details.provider,
                style(&details.location).cyan()
            ));
        }

        let resolve = || self.target.resolve(&project, &orchestrator);

        match self.action {
            RemoteAction::ListAll => {
                let mut artifacts = provider.list(None).await?;
                if let Some(target) = self.target.build_target()? {
                    let prefix = artifact_prefix(target.platform, &target.traits);
                    artifacts.retain(|a| a.name.starts_with(&prefix));
                } else if let Some(name) = &self.target.name {
                    artifacts.retain(|a| a.name.starts_with(name.as_str()));
                }
                self.print_artifacts(cli, &artifacts)?;
            }
            RemoteAction::List => {
                let name = resolve()?.name;
                let name = name.as_str();
                let artifacts = provider.list(Some(name)).await?;
                if artifacts.is_empty() {
                    return Err(CliError::NotFound(name.to_string()).into());
                }
                self.print_artifacts(cli, &artifacts)?;
            }
            RemoteAction::Download => {
                let resolved = resolve()?;
                let name = resolved.name.as_str();
                let artifact = provider
                    .query(name)
                    .await?
                    .ok_or_else(|| CliError::NotFound(name.to_string()))?;
                let build = orchestrator
                    .download_into_cache(provider.as_ref(), &artifact, name, &resolved.binary_kinds())
                    .await?
                    .ok_or_else(|| {
                        anyhow::anyhow!("Artifact {} does not contain a usable binary", name)
                    })?;

                if self.json_output(cli) {
                    output::json(&build)?;
                } else if !cli.quiet {
                    output::success(&format!(
                        "Downloaded {} to {}",
                        output::name_style().apply_to(name),
                        output::path_style().apply_to(build.binary_path.display())
                    ));
                }
            }
            RemoteAction::Upload => {
                let resolved = resolve()?;
                let name = resolved.name.as_str();
                let binary = match &self.binary_path {
                    Some(path) => path.clone(),
                    None => orchestrator
                        .local()
                        .query(name, &resolved.binary_kinds())
                        .map(|build| build.binary_path)
                        .ok_or_else(|| {
                            CliError::Usage(format!(
                                "No --binary-path given and no local build cached as {}",
                                name
                            ))
                        })?,
                };
                if !binary.exists() {
                    return Err(
                        CliError::Usage(format!("Binary not found: {}", binary.display())).into(),
                    );
                }

                let artifact = provider.upload(name, UploadSource::Path(binary)).await?;
                if self.json_output(cli) {
                    output::json(&artifact)?;
                } else if !cli.quiet {
                    output::success(&format!(
                        "Uploaded {} to {}",
                        output::name_style().apply_to(&artifact.name),
                        artifact.url
                    ));
                }
            }
            RemoteAction::Delete => {
                let name = resolve()?.name;
                let name = name.as_str();
                let deleted = provider.delete(name, self.limit).await?;
                if deleted.is_empty() {
                    return Err(CliError::NotFound(name.to_string()).into());
                }
                if self.json_output(cli) {
                    output::json(&deleted)?;
                } else if !cli.quiet {
                    output::success(&format!(
                        "Deleted {} artifact(s) named {}",
                        deleted.len(),
                        output::name_style().apply_to(name)
                    ));
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }

    fn print_artifacts(&self, cli: &Cli, artifacts: &[RemoteArtifact]) -> anyhow::Result<()> {
        if self.json_output(cli) {
            return output::json(&artifacts);
        }
        if artifacts.is_empty() {
            if !cli.quiet {
                output::warning("No artifacts found");
            }
            return Ok(());
        }

        for artifact in artifacts {
            println!("{}", output::name_style().apply_to(&artifact.name));
            if cli.quiet {
                continue;
            }
            println!("{}", output::key_value("url", &artifact.url));
            if let Some(size) = artifact.size {
                println!(
                    "{}",
                    output::key_value("size", &rnef_cache::local::format_bytes(size))
                );
            }
            if let Some(created_at) = artifact.created_at {
                println!("{}", output::key_value("created", &created_at.to_rfc3339()));
            }
        }
        Ok(())
    }
}
