//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with path
//! normalization and the runtime configuration derived from it.

use crate::lane::{Lane, Mode, Platform};
use clap::{Args as ClapArgs, Parser, Subcommand};
use path_absolutize::Absolutize;
use std::path::PathBuf;

/// Release lanes for Android and iOS apps
#[derive(Parser, Debug)]
#[command(
    name = "mobile_release",
    version,
    about = "Release lanes for Android and iOS apps",
    long_about = "Builds, signs and publishes an Expo/React Native app for one platform.

Usage:
  mobile_release preflight
  mobile_release lane android build
  mobile_release lane ios release --project-root ./app

Credentials are read from the environment. Release lanes stop before any build
work when a required variable is missing, listing every missing name."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a build or release lane for one platform
    Lane(LaneArgs),

    /// Check the project tree for missing files and inconsistent identifiers
    Preflight(PreflightArgs),
}

#[derive(ClapArgs, Debug)]
pub struct LaneArgs {
    /// Target platform
    #[arg(value_enum)]
    pub platform: Platform,

    /// `build` produces an unsigned debug build; `release` signs and uploads
    #[arg(value_enum)]
    pub mode: Mode,

    #[command(flatten)]
    pub project: ProjectArgs,

    /// Directory under which the per-lane credential directory is created
    ///
    /// Defaults to the system temporary directory.
    #[arg(long, value_name = "DIR", env = "RELEASE_EPHEMERAL_DIR")]
    pub ephemeral_dir: Option<PathBuf>,

    /// Only print errors and the final summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug)]
pub struct PreflightArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Also warn about lane tools missing from PATH
    #[arg(long)]
    pub check_tools: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ProjectArgs {
    /// Project root containing app.json
    #[arg(
        long,
        value_name = "PATH",
        env = "RELEASE_PROJECT_ROOT",
        default_value = "."
    )]
    pub project_root: PathBuf,
}

impl ProjectArgs {
    /// Absolute project root.
    pub fn resolve(&self) -> std::io::Result<PathBuf> {
        Ok(self.project_root.absolutize()?.into_owned())
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        let project = match &self.command {
            Command::Lane(args) => &args.project,
            Command::Preflight(args) => &args.project,
        };
        if project.project_root.as_os_str().is_empty() {
            return Err("Project root cannot be empty".to_string());
        }
        if let Command::Lane(args) = &self.command {
            if args.ephemeral_dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
                return Err("Ephemeral directory cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl LaneArgs {
    pub fn lane(&self) -> Lane {
        Lane::new(self.platform, self.mode)
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        let quiet = match &args.command {
            Command::Lane(lane) => lane.quiet,
            Command::Preflight(_) => false,
        };
        Self {
            output: super::OutputManager::new(!quiet, quiet),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }
}
