//! Subcommands module for Herd CLI
//!
//! This module contains all the subcommand implementations.

pub mod hosts;
pub mod run;

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::cli::output::OutputFormatter;
use crate::cli::Cli;
use crate::config::Config;
use crate::inventory::{resolve_hosts, DnsProvider, HostProvider, HostSet, LiteralProvider, SortKey};

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, config: Config) -> Self {
        let output = OutputFormatter::new(
            config.output.color && !cli.no_color,
            cli.json,
            config.output.timestamp,
            cli.verbosity(),
        );

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
        }
    }

    /// Resolve host specs through DNS, falling back to literal host definitions
    pub async fn resolve_hosts(&self, specs: &[String], sort: Vec<SortKey>) -> Result<HostSet> {
        let providers: Vec<Arc<dyn HostProvider>> =
            vec![Arc::new(DnsProvider::new()), Arc::new(LiteralProvider::new())];
        let hosts = resolve_hosts(&providers, specs, sort).await;
        if hosts.is_empty() {
            bail!("no hosts matched {}", specs.join(", "));
        }
        Ok(hosts)
    }
}
