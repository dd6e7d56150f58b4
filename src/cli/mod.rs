//! CLI module for Herd
//!
//! This module provides the command-line interface for Herd,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::LogFormat;

/// Herd - run one command across a fleet of hosts
#[derive(Parser, Debug, Clone)]
#[command(name = "herd")]
#[command(version)]
#[command(about = "Run one command across a fleet of hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "HERD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Print the run record as JSON instead of streaming output
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command on every selected host
    Run(commands::run::RunArgs),

    /// Resolve and list hosts without running anything
    Hosts(commands::hosts::HostsArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration for this invocation.
    ///
    /// A bad explicit `--config` file or a bad environment value is an error.
    /// A broken file in one of the default locations only warns and falls
    /// back to the defaults plus environment overrides.
    pub fn load_config(&self) -> Result<Config> {
        match Config::load(self.config.as_deref()) {
            Ok(config) => Ok(config),
            Err(e) if self.config.is_some() || matches!(e, Error::Config(_)) => Err(e),
            Err(e) => {
                eprintln!("Warning: Failed to load config: {}", e);
                Config::from_env()
            }
        }
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
