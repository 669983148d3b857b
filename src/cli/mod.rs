//! CLI module for the siteplan tool.
//!
//! This module provides the command-line interface for planning,
//! applying and rolling back site provisioning.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
