//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::orchestrator::{BuildRequest, CodeSource, DeployRequest};
use crate::planner::PlanKind;

/// Deckhand - build, deploy and roll back applications from declarative plans.
#[derive(Parser, Debug)]
#[command(name = "deckhand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "DECKHAND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new Deckhand configuration.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration and its plans.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Normalize and display a plan without running it.
    Plan {
        /// Which plan to show.
        #[arg(short, long, default_value = "deploy")]
        kind: PlanKind,
    },

    /// Run the build plan.
    Build {
        /// Build identifier (generated from the current time if omitted).
        #[arg(long)]
        build_id: Option<String>,

        /// Shared run flags.
        #[command(flatten)]
        run: RunFlags,
    },

    /// Run the deploy plan.
    Deploy {
        /// Deploy code from a prepared build.
        #[arg(long, conflicts_with_all = ["repo", "snapshot"])]
        build: Option<String>,

        /// Deploy code from a repository reference.
        #[arg(long, conflicts_with = "snapshot")]
        repo: Option<String>,

        /// Deploy code from a snapshot.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Refresh caches and indexes.
        #[arg(long)]
        refresh: bool,

        /// Let rollback steps undo database and asset changes.
        #[arg(long)]
        allow_full_rollback: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Shared run flags.
        #[command(flatten)]
        run: RunFlags,
    },

    /// Run only the rollback steps of a plan.
    Rollback {
        /// Which plan to roll back.
        #[arg(short, long, default_value = "deploy")]
        kind: PlanKind,

        /// Build the rollback refers to.
        #[arg(long)]
        build_id: Option<String>,

        /// Let rollback steps undo database and asset changes.
        #[arg(long)]
        allow_full_rollback: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Extra options (`key=value`).
        #[arg(long = "option", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
}

/// Flags shared by `build` and `deploy`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunFlags {
    /// Include assets.
    #[arg(long)]
    pub assets: bool,

    /// Include databases.
    #[arg(long)]
    pub databases: bool,

    /// Run the clean steps first.
    #[arg(long)]
    pub clean: bool,

    /// Extra options (`key=value`).
    #[arg(long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl RunFlags {
    /// Builds a build request from these flags.
    #[must_use]
    pub fn build_request(&self, build_id: Option<String>) -> BuildRequest {
        BuildRequest {
            build_id,
            include_assets: self.assets,
            include_databases: self.databases,
            clean: self.clean,
            extra: self.options.iter().cloned().collect(),
        }
    }

    /// Builds a deploy request from these flags and a code source.
    #[must_use]
    pub fn deploy_request(
        &self,
        source: CodeSource,
        refresh: bool,
        allow_full_rollback: bool,
    ) -> DeployRequest {
        DeployRequest {
            source,
            include_assets: self.assets,
            include_databases: self.databases,
            refresh,
            clean: self.clean,
            allow_full_rollback,
            extra: self.options.iter().cloned().collect(),
        }
    }
}

/// Picks the code source from the mutually exclusive deploy flags.
#[must_use]
pub fn code_source(
    build: Option<String>,
    repo: Option<String>,
    snapshot: Option<PathBuf>,
) -> CodeSource {
    match (build, repo, snapshot) {
        (Some(build_id), _, _) => CodeSource::Build { build_id },
        (None, Some(reference), _) => CodeSource::Repository { reference },
        (None, None, Some(path)) => CodeSource::Snapshot { path },
        (None, None, None) => CodeSource::None,
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
