//! Run command - execute one command across the selected hosts

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::CommandContext;
use crate::executor::{Executor, LocalExecutor, ProgressState, Runner, RunnerConfig};
use crate::inventory::parse_sort_keys;

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Maximum number of hosts running at once (0 = all)
    #[arg(short = 'p', long)]
    pub parallel: Option<i64>,

    /// Random delay before each host starts, up to this duration
    #[arg(long, value_parser = humantime::parse_duration)]
    pub splay: Option<Duration>,

    /// Deadline for the whole run
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Deadline for a single host
    #[arg(long, value_parser = humantime::parse_duration)]
    pub host_timeout: Option<Duration>,

    /// Deadline for establishing a session to a single host
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Sort keys, comma separated (name, exitstatus, stdout, stderr or an attribute)
    #[arg(long)]
    pub sort: Option<String>,

    /// Do not stream host output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Host names or definitions (`name key=value ...`)
    #[arg(required = true, num_args = 1..)]
    pub hosts: Vec<String>,

    /// Command to run, after `--`
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// The command as one shell line
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Apply flags on top of the configured runner settings
    pub fn runner_config(&self, base: &RunnerConfig) -> RunnerConfig {
        let mut config = base.clone();
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(splay) = self.splay {
            config.splay = splay;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(timeout) = self.host_timeout {
            config.host_timeout = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(sort) = &self.sort {
            config.sort = parse_sort_keys(sort);
        }
        config
    }

    /// Execute the run command.
    ///
    /// Exit code: 0 if every host succeeded, 1 if any command failed, 2 if
    /// any host errored.
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let config = self.runner_config(&ctx.config.runner);
        let hosts = ctx.resolve_hosts(&self.hosts, config.sort.clone()).await?;

        let executor: Arc<dyn Executor> = Arc::new(LocalExecutor::new());
        let mut runner = Runner::from_config(hosts, Some(executor), &config);

        if ctx.verbosity > 0 {
            let (name, settings) = runner.settings();
            ctx.output.settings(name, &settings);
        }

        let command = self.command_line();
        let width = runner.hosts().max_name_length();
        let total = runner.hosts().len();

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (output_tx, mut output_rx) = mpsc::unbounded_channel();
        let output_tx = (!self.quiet && !ctx.output.is_json()).then_some(output_tx);

        let output = &ctx.output;
        let item = {
            let mut finished = 0;
            let run = runner.run(&command, Some(progress_tx), output_tx);
            tokio::pin!(run);

            loop {
                tokio::select! {
                    item = &mut run => break item?,
                    Some(line) = output_rx.recv() => output.output_line(&line, width),
                    Some(message) = progress_rx.recv() => {
                        if message.state == ProgressState::Finished {
                            finished += 1;
                        }
                        output.progress(&message, finished, total);
                    }
                }
            }
        };
        while let Ok(line) = output_rx.try_recv() {
            output.output_line(&line, width);
        }

        if output.is_json() {
            output.json(&item)?;
        } else {
            output.recap(&item);
        }

        runner.end().await;

        let code = if item.summary.err > 0 {
            2
        } else if item.summary.fail > 0 {
            1
        } else {
            0
        };
        Ok(code)
    }
}
