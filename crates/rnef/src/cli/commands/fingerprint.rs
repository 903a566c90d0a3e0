//! Fingerprint command

use clap::Args;
use tracing::info;

use rnef_fingerprint::compute_fingerprint;

use crate::cli::{output, Cli, OutputFormat, PlatformArg, Project};
use crate::exit_codes;

/// Compute the native fingerprint of the project
#[derive(Debug, Args)]
pub struct FingerprintCommand {
    /// Target platform
    #[arg(value_enum)]
    pub platform: PlatformArg,

    /// Extra paths, directories or globs to hash (added to the config)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub extra_sources: Vec<String>,

    /// Globs to exclude from hashing (added to the config)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub ignore_paths: Vec<String>,

    /// Print only the hash
    #[arg(long)]
    pub raw: bool,
}

impl FingerprintCommand {
    /// Execute the fingerprint command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(platform = ?self.platform, raw = self.raw, "executing fingerprint command");
        let project = Project::load()?;
        let options =
            project.fingerprint_options(self.platform.into(), &self.extra_sources, &self.ignore_paths);

        let fingerprint = compute_fingerprint(&project.root, &options)?;

        if self.raw {
            println!("{}", fingerprint.hash);
            return Ok(exit_codes::SUCCESS);
        }

        match cli.format {
            OutputFormat::Json => output::json(&fingerprint)?,
            OutputFormat::Text => {
                // hash on stdout, evidence on stderr, so `$(rnef fingerprint ios)` stays clean
                println!("{}", fingerprint.hash);
                if !cli.quiet {
                    eprintln!("{}", serde_json::to_string_pretty(&fingerprint.sources)?);
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}
