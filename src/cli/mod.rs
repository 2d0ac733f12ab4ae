//! Command-line interface for updraft.
//!
//! updraft is installed in a subdirectory of the application it maintains and
//! is normally run with no flags at all: the repository and target come from
//! `updraft.toml` next to the binary, and the install directory is the parent
//! of the binary's directory.
//!
//! # Available Commands
//!
//! - `check` - Compare the installed version with the latest release
//! - `update` - Install the latest release if it is newer, rolling back on failure
//! - `launch` - Start the target application
//!
//! # Usage
//!
//! ```bash
//! # Is there anything new?
//! updraft check
//!
//! # Install it and start the application afterwards
//! updraft update --launch
//!
//! # One-off overrides without touching updraft.toml
//! updraft --owner acme --repo widget --asset-filter win-x64 check
//!
//! # Maintain a different directory (useful for testing a package)
//! updraft --install-dir /tmp/widget update
//! ```
//!
//! # Output
//!
//! Status lines and a progress bar go to stderr; `--quiet` keeps only errors and
//! `--no-progress` replaces the bar with plain status lines. Log verbosity
//! follows `--verbose`/`--quiet` unless `RUST_LOG` is set.

mod check;
mod launch;
mod reporter;
mod update;

use crate::config::{UpdaterConfig, default_config_path};
use crate::upgrade::{InstallLayout, UpdateOrchestrator};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reporter::CliReporter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Output settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Level for the `updraft` log target: `debug`, `warn` or `error`.
    pub log_level: String,

    /// Show only errors.
    pub quiet: bool,

    /// Echo log lines from the update engine.
    pub verbose: bool,

    /// Replace the progress bar with plain status lines.
    pub no_progress: bool,
}

/// Self-updater for applications published as GitHub releases.
#[derive(Parser, Debug)]
#[command(
    name = "updraft",
    about = "Keep an installed application up to date with its latest GitHub release",
    version,
    long_about = "updraft checks GitHub for a newer release of the application it is installed \
                  next to, and replaces the installation with it. Operator data is preserved, \
                  and the previous installation is restored if anything goes wrong."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show detailed progress and debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Show errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print status lines instead of a progress bar.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Path to the configuration file [default: updraft.toml next to the binary].
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory to update [default: parent of the binary's directory].
    #[arg(long, global = true, value_name = "DIR")]
    install_dir: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

/// Per-invocation overrides of `updraft.toml` values.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// GitHub repository owner.
    #[arg(long, global = true)]
    owner: Option<String>,

    /// GitHub repository name.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Case-insensitive substring selecting the release asset.
    #[arg(long, global = true)]
    asset_filter: Option<String>,

    /// Name of the process to stop before updating.
    #[arg(long, global = true)]
    process: Option<String>,

    /// Target executable, relative to the install directory.
    #[arg(long, global = true)]
    exe: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut UpdaterConfig) {
        let fields = [
            (&self.owner, &mut config.repository.owner),
            (&self.repo, &mut config.repository.name),
            (&self.asset_filter, &mut config.repository.asset_filter),
            (&self.process, &mut config.target.process_name),
            (&self.exe, &mut config.target.executable),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a newer release is available.
    Check(check::CheckCommand),

    /// Install the latest release if it is newer than the installed version.
    Update(update::UpdateCommand),

    /// Start the target application.
    Launch(launch::LaunchCommand),
}

/// Everything a command needs, built once per invocation.
pub(crate) struct RunContext {
    pub config: UpdaterConfig,
    pub orchestrator: UpdateOrchestrator,
    pub reporter: Arc<CliReporter>,
}

impl Cli {
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };

        CliConfig {
            log_level: log_level.to_string(),
            quiet: self.quiet,
            verbose: self.verbose,
            no_progress: self.no_progress,
        }
    }

    /// Runs the selected command.
    pub async fn execute(self) -> Result<()> {
        let cli_config = self.build_config();
        self.execute_with_config(cli_config).await
    }

    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        let context = self.prepare(&cli_config).await?;

        match self.command {
            Commands::Check(cmd) => cmd.execute(&context).await,
            Commands::Update(cmd) => cmd.execute(&context).await,
            Commands::Launch(cmd) => cmd.execute(&context),
        }
    }

    async fn prepare(&self, cli_config: &CliConfig) -> Result<RunContext> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        debug!("Using config {}", config_path.display());

        let mut config = if self.config.is_some() {
            UpdaterConfig::load_from(&config_path).await?
        } else {
            UpdaterConfig::load_or_default(&config_path).await?
        };
        self.overrides.apply(&mut config);

        let layout = InstallLayout::detect(self.install_dir.as_deref())
            .context("Failed to determine the install directory")?;
        debug!("Install directory: {}", layout.install_dir().display());

        let reporter = Arc::new(CliReporter::new(cli_config));
        let orchestrator = UpdateOrchestrator::new(layout, reporter.clone());

        Ok(RunContext {
            config,
            orchestrator,
            reporter,
        })
    }
}
