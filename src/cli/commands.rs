//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Siteplan - plan, apply and roll back call-control site provisioning.
#[derive(Parser, Debug)]
#[command(name = "siteplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "SITEPLAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

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
    /// Initialize a new siteplan project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration, templates and optionally a sites file.
    Validate {
        /// Sites file to check as well, relative to the config directory.
        #[arg(short, long)]
        sites: Option<PathBuf>,

        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,

        /// Check that the blueprint's global partitions exist in the inventory.
        #[arg(long)]
        remote: bool,
    },

    /// Build a plan from a sites file and save it.
    Plan {
        /// Sites file (YAML or JSON), relative to the config directory.
        #[arg(short, long, default_value = "sites.yaml")]
        sites: PathBuf,

        /// Plan every object for creation without consulting the inventory.
        #[arg(long)]
        no_lookup: bool,

        /// List every planned object.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show a saved plan.
    Show {
        /// Plan identifier (defaults to the most recent plan).
        plan_id: Option<String>,

        /// List every planned object.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Execute a saved plan.
    Apply {
        /// Plan identifier (defaults to the most recent plan).
        plan_id: Option<String>,

        /// Record what would be created without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// List recorded executions, most recent first.
    Executions,

    /// Show execution and rollback progress of a plan.
    Status {
        /// Plan identifier (defaults to the most recent plan).
        plan_id: Option<String>,
    },

    /// Undo the objects an execution created.
    Rollback {
        /// Plan identifier.
        plan_id: String,

        /// Record the inverse calls without making them.
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or remove the lock on a plan.
    Unlock {
        /// Plan identifier.
        plan_id: String,

        /// Remove the lock even if it has not expired.
        #[arg(long)]
        force: bool,
    },
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
