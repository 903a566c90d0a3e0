//! Local build cache command

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use crate::cli::{output, run_async, Cli, CliError, OutputFormat, Project, TargetArgs};
use crate::exit_codes;

/// Local build cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Find a reusable build, locally or in the remote cache
    Lookup(CacheLookupCommand),
    /// Copy a freshly built binary into the local cache
    Save(CacheSaveCommand),
    /// List cached builds
    List(CacheListCommand),
    /// Show cache statistics
    Status(CacheStatusCommand),
    /// Remove old cache entries
    Prune(CachePruneCommand),
    /// Remove one or all cached builds
    Clean(CacheCleanCommand),
}

/// Find a reusable build
#[derive(Debug, Args)]
pub struct CacheLookupCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Save a build into the local cache
#[derive(Debug, Args)]
pub struct CacheSaveCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Built binary (`.apk`, `.aab`, `.ipa` or `.app` directory)
    #[arg(long)]
    pub binary_path: PathBuf,
}

/// List cached builds
#[derive(Debug, Args)]
pub struct CacheListCommand;

/// Show cache statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand;

/// Prune old cache entries
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days (default: 30)
    #[arg(long, default_value = "30")]
    pub max_age_days: u64,

    /// Dry run - show what would be pruned
    #[arg(long)]
    pub dry_run: bool,
}

/// Remove cached builds
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Remove only this entry
    #[arg(long)]
    pub name: Option<String>,

    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        match &self.action {
            CacheAction::Lookup(cmd) => run_async(cmd.execute_async(cli)),
            CacheAction::Save(cmd) => cmd.execute(cli),
            CacheAction::List(cmd) => cmd.execute(cli),
            CacheAction::Status(cmd) => cmd.execute(cli),
            CacheAction::Prune(cmd) => cmd.execute(cli),
            CacheAction::Clean(cmd) => cmd.execute(cli),
        }
    }
}

impl CacheLookupCommand {
    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!("executing cache lookup");
        let project = Project::load()?;
        let orchestrator = project.orchestrator(cli);

        let resolved = self.target.resolve(&project, &orchestrator)?;
        let Some(target) = resolved.target.clone() else {
            return Err(CliError::Usage(format!(
                "Cannot tell the platform of {}; pass --platform and --traits instead",
                resolved.name
            ))
            .into());
        };
        let request = project.fetch_request(target).with_name(&resolved.name);

        match orchestrator.fetch_cached_build(&request).await? {
            Some(build) => {
                if cli.format == OutputFormat::Json {
                    output::json(&build)?;
                } else {
                    println!("{}", build.binary_path.display());
                }
                Ok(exit_codes::SUCCESS)
            }
            None => {
                if cli.format == OutputFormat::Json {
                    output::json(&serde_json::json!({ "name": resolved.name, "found": false }))?;
                } else if !cli.quiet {
                    output::warning(&format!("No cached build for {}", resolved.name));
                }
                Ok(exit_codes::CACHE_MISS)
            }
        }
    }
}

impl CacheSaveCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let project = Project::load()?;
        let orchestrator = project.orchestrator(cli);
        let resolved = self.target.resolve(&project, &orchestrator)?;

        if !self.binary_path.exists() {
            return Err(
                CliError::Usage(format!("Binary not found: {}", self.binary_path.display())).into(),
            );
        }

        let cached = orchestrator.local().try_save(&resolved.name, &self.binary_path)?;

        if cli.format == OutputFormat::Json {
            output::json(&serde_json::json!({
                "name": resolved.name,
                "path": cached.display().to_string(),
            }))?;
        } else if !cli.quiet {
            output::success(&format!(
                "Cached {} at {}",
                output::name_style().apply_to(&resolved.name),
                output::path_style().apply_to(cached.display())
            ));
        }
        Ok(exit_codes::SUCCESS)
    }
}

impl CacheListCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cache = Project::load()?.local_cache();
        let entries = cache.list()?;

        if cli.format == OutputFormat::Json {
            output::json(&entries)?;
        } else if entries.is_empty() {
            if !cli.quiet {
                output::info("No cached builds");
            }
        } else {
            for entry in &entries {
                let origin = entry
                    .origin
                    .as_ref()
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let created = entry
                    .created_at
                    .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}  {}",
                    output::name_style().apply_to(&entry.name),
                    style(created).dim(),
                    origin,
                    rnef_cache::local::format_bytes(entry.size)
                );
            }
        }
        Ok(exit_codes::SUCCESS)
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cache = Project::load()?.local_cache();
        let stats = cache.status()?;

        if cli.format == OutputFormat::Json {
            output::json(&serde_json::json!({
                "entries": stats.entries,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "cache_dir": cache.root().display().to_string(),
            }))?;
        } else if !cli.quiet {
            println!("{}", output::header("Build Cache Status"));
            println!();
            let location = output::path_style()
                .apply_to(cache.root().display())
                .to_string();
            println!("{}", output::key_value("Location", &location));
            println!("{}", output::key_value("Entries", &stats.entries.to_string()));
            println!(
                "{}",
                output::key_value("Size", &style(stats.formatted_size()).yellow().to_string())
            );
        }

        Ok(exit_codes::SUCCESS)
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cache = Project::load()?.local_cache();
        let max_age = Duration::from_secs(self.max_age_days * 24 * 60 * 60);

        if cli.is_interactive_text() {
            output::info(&format!(
                "Pruning cache entries older than {} days...",
                self.max_age_days
            ));
        }

        if self.dry_run {
            let cutoff = Utc::now() - chrono::Duration::from_std(max_age)?;
            let stale: Vec<_> = cache
                .list()?
                .into_iter()
                .filter(|e| e.created_at.is_some_and(|c| c < cutoff))
                .collect();

            if cli.format == OutputFormat::Json {
                output::json(&stale)?;
            } else if !cli.quiet {
                for entry in &stale {
                    println!("  would remove {}", output::name_style().apply_to(&entry.name));
                }
                println!("  {} entries would be removed", stale.len());
            }
            return Ok(exit_codes::SUCCESS);
        }

        let stats = cache.prune(max_age)?;

        if cli.format == OutputFormat::Json {
            output::json(&serde_json::json!({
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
                "freed": stats.freed,
            }))?;
        } else if !cli.quiet {
            output::success(&format!(
                "Removed {} of {} entries ({} kept, {} freed)",
                stats.removed,
                stats.total,
                stats.kept,
                rnef_cache::local::format_bytes(stats.freed)
            ));
        }

        Ok(exit_codes::SUCCESS)
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cache = Project::load()?.local_cache();

        if let Some(name) = &self.name {
            if !cache.remove(name)? {
                return Err(CliError::NotFound(name.clone()).into());
            }
            if !cli.quiet {
                output::success(&format!("Removed {}", output::name_style().apply_to(name)));
            }
            return Ok(exit_codes::SUCCESS);
        }

        if !cache.root().exists() {
            if !cli.quiet {
                output::success("Cache directory does not exist.");
            }
            return Ok(exit_codes::SUCCESS);
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "Remove all cached builds at {}?",
                    cache.root().display()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(exit_codes::CANCELLED);
            }
        }

        let removed = cache.clear()?;

        if !cli.quiet {
            output::success(&format!(
                "Removed {} cached builds from {}",
                removed,
                output::path_style().apply_to(cache.root().display())
            ));
        }

        Ok(exit_codes::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> CacheAction {
        let mut argv = vec!["rnef", "cache"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            crate::cli::Commands::Cache(cmd) => cmd.action,
            _ => panic!("expected cache command"),
        }
    }

    #[test]
    fn test_prune_defaults() {
        let CacheAction::Prune(cmd) = parse(&["prune"]) else {
            panic!("expected prune");
        };
        assert_eq!(cmd.max_age_days, 30);
        assert!(!cmd.dry_run);
    }

    #[test]
    fn test_save_requires_binary_path() {
        assert!(Cli::try_parse_from(["rnef", "cache", "save", "--platform", "android"]).is_err());
        let CacheAction::Save(cmd) = parse(&[
            "save",
            "--platform",
            "android",
            "--traits",
            "release",
            "--binary-path",
            "app-release.apk",
        ]) else {
            panic!("expected save");
        };
        assert_eq!(cmd.binary_path, PathBuf::from("app-release.apk"));
    }

    #[test]
    fn test_lookup_accepts_name() {
        let CacheAction::Lookup(cmd) = parse(&["lookup", "--name", "rnef-ios-simulator-Debug-abc"])
        else {
            panic!("expected lookup");
        };
        assert_eq!(cmd.target.name.as_deref(), Some("rnef-ios-simulator-Debug-abc"));
    }
}
