//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::config::DEFAULT_BUILD_FILE;
use clap::{Parser, Subcommand};
use commands::{parse_key_value, ListCommand, RunCommand, ValidateCommand, WatchCommand};
use std::ffi::OsString;

/// Declarative front-end build runner
#[derive(Debug, Parser, Clone)]
#[command(name = "buildline")]
#[command(version)]
#[command(about = "Runs and watches declarative front-end build pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the build description
    #[arg(short, long, global = true, default_value = DEFAULT_BUILD_FILE)]
    pub file: String,

    /// Configuration overrides (dotted.key=value), applied before placeholders resolve
    #[arg(long = "set", global = true, value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Build once, then rebuild on changes
    Watch(WatchCommand),

    /// List tasks, aliases and watch rules
    List(ListCommand),

    /// Validate the build description
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
