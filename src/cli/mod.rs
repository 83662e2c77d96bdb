//! Command-line interface for updraft.
//!
//! The `updraft` binary exposes the host-application side of the update
//! pipeline. The other side, replacing files once the application has
//! exited, lives in the separate `updraft-bootstrap` binary.
//!
//! # Commands
//!
//! - `compare` - order two version strings
//! - `check` - report whether an update descriptor offers a newer version
//! - `install` - download, verify and hand off an update
//!
//! # Global Options
//!
//! - `--verbose` - enable debug output
//! - `--quiet` - suppress all log output except errors
//! - `--no-progress` - disable progress bars
//! - `--config` - path to a custom config file
//!
//! # Example
//!
//! ```bash
//! updraft check https://example.com/app/feed.json --installed 1.1.0.0
//! updraft install https://example.com/app/feed.json --installed 1.1.0.0 --target /opt/app/app
//! ```

mod check;
pub mod common;
mod compare;
mod install;

pub use check::{CheckCommand, CheckReport};
pub use compare::CompareCommand;
pub use install::{InstallCommand, patch_bootstrap_args};

use crate::config::UpdaterConfig;
use crate::utils::init_logging;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

/// Settings derived from the global options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Console log level; `None` keeps stderr quiet apart from errors.
    pub log_level: Option<Level>,

    pub no_progress: bool,

    pub config_path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(
    name = "updraft",
    about = "Self-update toolkit - check, download and apply application updates",
    version,
    long_about = "updraft compares versions, downloads and verifies update packages, and hands them to the \
                  updraft-bootstrap binary that replaces the application's files after it exits."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a custom config file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare two version strings
    Compare(CompareCommand),

    /// Check an update descriptor against the installed version
    Check(CheckCommand),

    /// Download an update and hand it to the installer or bootstrapper
    Install(InstallCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some(Level::DEBUG)
        } else if self.quiet {
            None
        } else {
            Some(Level::WARN)
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        // A subscriber may already be installed when embedded in tests
        let _ = init_logging(cli_config.log_level.or(Some(Level::ERROR)), None, self.verbose);

        match self.command {
            Commands::Compare(cmd) => cmd.execute(),
            Commands::Check(cmd) => cmd.execute().await,
            Commands::Install(mut cmd) => {
                let config = UpdaterConfig::load_with_optional(cli_config.config_path).await?;
                cmd.no_progress |= cli_config.no_progress;
                cmd.execute(config).await
            }
        }
    }
}
