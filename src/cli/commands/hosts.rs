//! Hosts command - resolve and list hosts

use anyhow::Result;
use clap::Parser;

use super::CommandContext;
use crate::inventory::parse_sort_keys;

/// Arguments for the hosts command
#[derive(Parser, Debug, Clone)]
pub struct HostsArgs {
    /// Sort keys, comma separated (name, exitstatus, stdout, stderr or an attribute)
    #[arg(long)]
    pub sort: Option<String>,

    /// Host names or definitions (`name key=value ...`)
    #[arg(required = true)]
    pub hosts: Vec<String>,
}

impl HostsArgs {
    /// Execute the hosts command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let sort = match &self.sort {
            Some(spec) => parse_sort_keys(spec),
            None => ctx.config.runner.sort.clone(),
        };
        let hosts = ctx.resolve_hosts(&self.hosts, sort).await?;

        if ctx.output.is_json() {
            let listing: Vec<_> = hosts
                .iter()
                .map(|host| {
                    serde_json::json!({
                        "name": host.name,
                        "address": host.address(),
                        "attributes": host.attributes,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(0);
        }

        let width = hosts.max_name_length();
        for host in &hosts {
            println!("{:<width$}   {}", host.name, host.address());
        }
        ctx.output.info(&format!("{} hosts", hosts.len()));
        Ok(0)
    }
}
