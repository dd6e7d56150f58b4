//! Inventory management for Herd.
//!
//! This module provides:
//! - [`Host`]: identity plus per-host session state
//! - [`HostSet`]: the ordered, deduplicated collection a run targets
//! - [`SortKey`]: the closed set of keys a host set can be ordered by
//! - [`HostProvider`]: the capability that turns a spec into hosts

pub mod host;
pub mod provider;
pub mod sort;

pub use host::{Host, HostParseError};
pub use provider::{resolve_hosts, DnsProvider, HostProvider, LiteralProvider, StaticProvider};
pub use sort::{parse_sort_keys, SortKey};

use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("duplicate host: {0}")]
    DuplicateHost(String),

    #[error("unknown sort key: '{0}'")]
    UnknownSortKey(String),

    #[error("host parse error: {0}")]
    HostParse(#[from] HostParseError),
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// An ordered collection of distinct hosts.
///
/// Order matters: it is the default order of results and the order in which
/// per-host tasks are submitted. The maximum host name length is cached for
/// aligned rendering and kept in sync on every mutation.
#[derive(Debug, Clone)]
pub struct HostSet {
    hosts: Vec<Arc<Host>>,
    max_name_length: usize,
    sort: Vec<SortKey>,
}

impl Default for HostSet {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSet {
    /// Create an empty host set sorted by name
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            max_name_length: 0,
            sort: vec![SortKey::Name],
        }
    }

    /// Create an empty host set with the given sort keys
    pub fn with_sort(sort: Vec<SortKey>) -> Self {
        Self {
            sort,
            ..Self::new()
        }
    }

    /// Add a host, rejecting duplicate names
    pub fn add(&mut self, host: impl Into<Arc<Host>>) -> InventoryResult<()> {
        let host = host.into();
        if self.contains(&host.name) {
            return Err(InventoryError::DuplicateHost(host.name.clone()));
        }
        self.max_name_length = self.max_name_length.max(host.name.len());
        self.hosts.push(host);
        Ok(())
    }

    /// Add every host not already present, returning how many were added
    pub fn extend<I, H>(&mut self, hosts: I) -> usize
    where
        I: IntoIterator<Item = H>,
        H: Into<Arc<Host>>,
    {
        let mut added = 0;
        for host in hosts {
            if self.add(host).is_ok() {
                added += 1;
            }
        }
        added
    }

    /// Remove a host by name
    pub fn remove(&mut self, name: &str) -> Option<Arc<Host>> {
        let pos = self.hosts.iter().position(|h| h.name == name)?;
        let host = self.hosts.remove(pos);
        self.recompute_max_name_length();
        Some(host)
    }

    /// Remove every host
    pub fn clear(&mut self) {
        self.hosts.clear();
        self.max_name_length = 0;
    }

    /// Get a host by name
    pub fn get(&self, name: &str) -> Option<&Arc<Host>> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Check whether a host with this name is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Iterate over hosts in their current order
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Host>> {
        self.hosts.iter()
    }

    /// Host names in their current order
    pub fn names(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| h.name.as_str()).collect()
    }

    /// Length of the longest host name
    pub fn max_name_length(&self) -> usize {
        self.max_name_length
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn set_sort_keys(&mut self, sort: Vec<SortKey>) {
        self.sort = sort;
    }

    /// Whether any sort key depends on run results
    pub fn has_result_keys(&self) -> bool {
        self.sort.iter().any(SortKey::is_result_key)
    }

    /// Reorder hosts in place by the configured keys.
    ///
    /// The sort is stable: hosts that compare equal on every key keep their
    /// relative order.
    pub fn sort(&mut self) {
        let keys = &self.sort;
        self.hosts.sort_by(|a, b| {
            keys.iter()
                .fold(Ordering::Equal, |ord, key| ord.then_with(|| key.compare(a, b)))
        });
    }

    fn recompute_max_name_length(&mut self) {
        self.max_name_length = self.hosts.iter().map(|h| h.name.len()).max().unwrap_or(0);
    }
}

impl<'a> IntoIterator for &'a HostSet {
    type Item = &'a Arc<Host>;
    type IntoIter = std::slice::Iter<'a, Arc<Host>>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

impl FromIterator<Host> for HostSet {
    fn from_iter<T: IntoIterator<Item = Host>>(iter: T) -> Self {
        let mut set = HostSet::new();
        set.extend(iter);
        set
    }
}
