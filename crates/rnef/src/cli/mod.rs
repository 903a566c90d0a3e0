//! CLI definition and command handling

pub mod commands;
pub mod output;
mod project;
mod target;

use std::future::Future;

use clap::{Parser, Subcommand};
use thiserror::Error;

use commands::{CacheCommand, FingerprintCommand, RemoteCacheCommand};

pub use project::Project;
pub use target::{PlatformArg, ResolvedTarget, TargetArgs};

/// rnef - reuse native React Native builds keyed by a project fingerprint
#[derive(Debug, Parser)]
#[command(name = "rnef")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute the native fingerprint of the project
    Fingerprint(FingerprintCommand),

    /// Inspect and manage artifacts in the remote cache
    RemoteCache(RemoteCacheCommand),

    /// Look up, save and maintain locally cached builds
    Cache(CacheCommand),
}

/// Errors raised by the command layer itself
#[derive(Debug, Error)]
pub enum CliError {
    /// Ctrl-C during a command
    #[error("Cancelled")]
    Cancelled,

    /// Missing or incompatible arguments
    #[error("{0}")]
    Usage(String),

    /// No remote provider configured or it is disabled
    #[error("No remote cache provider configured. Add a [remote_cache] section to rnef.config.toml.")]
    NoProvider,

    /// The requested artifact does not exist
    #[error("Artifact not found: {0}")]
    NotFound(String),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Fingerprint(ref cmd) => cmd.execute(&self),
            Commands::RemoteCache(ref cmd) => cmd.execute(&self),
            Commands::Cache(ref cmd) => cmd.execute(&self),
        }
    }

    /// Whether human-readable progress and status lines should be printed
    pub fn is_interactive_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

/// Run an async command on a fresh runtime, cancelling it on Ctrl-C or SIGTERM.
///
/// Cancelling drops the command future, which removes any scratch download
/// directory it was holding.
pub fn run_async<F>(future: F) -> anyhow::Result<i32>
where
    F: Future<Output = anyhow::Result<i32>>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        tokio::select! {
            result = future => result,
            _ = shutdown_signal() => Err(CliError::Cancelled.into()),
        }
    })
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
