//! Host providers.
//!
//! A [`HostProvider`] turns a user-supplied spec (a hostname, a glob, ...)
//! into concrete [`Host`]s. Providers degrade gracefully: a spec a provider
//! cannot resolve yields an empty list rather than an error, so one missing
//! source never aborts the others.

use async_trait::async_trait;
use globset::Glob;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Host, HostSet, SortKey};

/// Source of hosts
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// Provider name, for logging
    fn name(&self) -> &str;

    /// Resolve a spec into hosts. Unresolvable specs return an empty list.
    async fn resolve(&self, spec: &str) -> Vec<Host>;
}

/// Resolves a spec as a DNS name
#[derive(Debug, Clone, Default)]
pub struct DnsProvider;

impl DnsProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostProvider for DnsProvider {
    fn name(&self) -> &str {
        "dns"
    }

    async fn resolve(&self, spec: &str) -> Vec<Host> {
        let addrs = match tokio::net::lookup_host((spec, 0)).await {
            Ok(addrs) => addrs.map(|a| a.ip().to_string()).collect::<Vec<_>>(),
            Err(e) => {
                debug!(spec = %spec, error = %e, "DNS lookup failed");
                return Vec::new();
            }
        };

        let mut attributes = IndexMap::new();
        if let Some(first) = addrs.first() {
            attributes.insert("address".to_string(), serde_json::json!(first));
        }
        vec![Host::new(spec, attributes)]
    }
}

/// Serves a fixed list of hosts, matched by exact name or `*` glob
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    hosts: Vec<(String, IndexMap<String, serde_json::Value>)>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host definition
    pub fn with_host(mut self, host: Host) -> Self {
        self.hosts.push((host.name, host.attributes));
        self
    }
}

#[async_trait]
impl HostProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, spec: &str) -> Vec<Host> {
        let matcher = match Glob::new(spec) {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                debug!(spec = %spec, error = %e, "Not a valid glob, matching literally");
                return self
                    .hosts
                    .iter()
                    .filter(|(name, _)| name == spec)
                    .map(|(name, attrs)| Host::new(name.clone(), attrs.clone()))
                    .collect();
            }
        };

        self.hosts
            .iter()
            .filter(|(name, _)| name == spec || matcher.is_match(name))
            .map(|(name, attrs)| Host::new(name.clone(), attrs.clone()))
            .collect()
    }
}

/// Treats the spec itself as a host definition (`name k=v ...`)
#[derive(Debug, Clone, Default)]
pub struct LiteralProvider;

impl LiteralProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostProvider for LiteralProvider {
    fn name(&self) -> &str {
        "literal"
    }

    async fn resolve(&self, spec: &str) -> Vec<Host> {
        match Host::parse(spec) {
            Ok(host) => vec![host],
            Err(e) => {
                debug!(spec = %spec, error = %e, "Not a host definition");
                Vec::new()
            }
        }
    }
}

/// Resolve every spec against every provider and merge the results.
///
/// The first occurrence of a host name wins. The returned set is sorted by
/// `sort` (result-derived keys are no-ops here since no host has run yet).
pub async fn resolve_hosts(
    providers: &[Arc<dyn HostProvider>],
    specs: &[String],
    sort: Vec<SortKey>,
) -> HostSet {
    let mut set = HostSet::with_sort(sort);

    for spec in specs {
        let mut found = 0;
        for provider in providers {
            let hosts = provider.resolve(spec).await;
            debug!(provider = provider.name(), spec = %spec, count = hosts.len(), "Resolved hosts");
            found += set.extend(hosts);
        }
        if found == 0 {
            warn!(spec = %spec, "No hosts found");
        }
    }

    set.sort();
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticProvider {
        StaticProvider::new()
            .with_host(Host::parse("web-02 role=frontend").unwrap())
            .with_host(Host::parse("web-01 role=frontend").unwrap())
            .with_host(Host::parse("db-01 role=database").unwrap())
    }

    #[tokio::test]
    async fn test_static_glob() {
        let hosts = provider().resolve("web-*").await;
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["web-02", "web-01"]);
    }

    #[tokio::test]
    async fn test_static_unknown_is_empty() {
        assert!(provider().resolve("cache-*").await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_hosts_merges_and_sorts() {
        let providers: Vec<Arc<dyn HostProvider>> = vec![
            Arc::new(provider()),
            Arc::new(StaticProvider::new().with_host(Host::named("web-01"))),
        ];
        let specs = vec!["web-*".to_string(), "db-01".to_string(), "nope".to_string()];
        let set = resolve_hosts(&providers, &specs, vec![SortKey::Name]).await;
        assert_eq!(set.names(), vec!["db-01", "web-01", "web-02"]);
        // first provider's definition wins
        assert_eq!(
            set.get("web-01").unwrap().attribute("role"),
            Some(&serde_json::json!("frontend"))
        );
    }

    #[tokio::test]
    async fn test_literal_parses_attributes() {
        let hosts = LiteralProvider::new().resolve("web-09 rack=4").await;
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "web-09");
        assert_eq!(hosts[0].attribute("rack"), Some(&serde_json::json!(4)));
        assert!(LiteralProvider::new().resolve("   ").await.is_empty());
    }

    #[tokio::test]
    async fn test_dns_localhost() {
        let hosts = DnsProvider::new().resolve("localhost").await;
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "localhost");
    }

    #[tokio::test]
    async fn test_dns_unresolvable_is_empty() {
        let hosts = DnsProvider::new().resolve("no-such-host.invalid").await;
        assert!(hosts.is_empty());
    }
}
