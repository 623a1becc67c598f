// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `deployer`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "deployer",
    version,
    about = "Run Terraform in a separate container over a shared control volume.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `Deployer.toml` in the current working directory if it
    /// exists, built-in defaults otherwise.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEPLOYER_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Supervise a deployment: queue the Terraform steps and relay their output.
    Deploy(DeployArgs),
    /// Execute queued commands until the supervisor says it is done.
    Run,
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Deployment parameters as a JSON object.
    #[arg(value_name = "PARAMS_JSON")]
    pub params: String,

    /// Directory holding the unpacked release to deploy.
    #[arg(
        long,
        value_name = "DIR",
        conflicts_with = "release_archive",
        required_unless_present = "release_archive"
    )]
    pub release_dir: Option<PathBuf>,

    /// Zip archive of the release, unpacked into the control volume.
    #[arg(long, value_name = "PATH")]
    pub release_archive: Option<PathBuf>,

    /// Whether Terraform state already exists. Omit to skip the check.
    #[arg(long, value_name = "BOOL")]
    pub state_exists: Option<bool>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
