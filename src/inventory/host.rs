//! Host definition for the Herd inventory.
//!
//! A [`Host`] is created by a host provider before a run and lives for the
//! whole session, usually shared as `Arc<Host>` between the [`HostSet`],
//! the per-host tasks of a run, and progress/output events.
//!
//! Two fields are mutable after construction:
//!
//! - the connection handle, installed by the executor on first use and torn
//!   down by [`Runner::end`](crate::executor::Runner::end);
//! - the last result, written once per run by the task that owns this host.
//!   Only that task writes it while a run is in flight, and it is only read for
//!   sorting after every task has been joined.
//!
//! [`HostSet`]: super::HostSet

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::connection::Connection;
use crate::executor::HostResult;

/// A managed host
#[derive(Debug)]
pub struct Host {
    /// Host name, unique within a host set
    pub name: String,

    /// Provider-supplied attributes (addresses, tags, ...)
    pub attributes: IndexMap<String, serde_json::Value>,

    connection: Mutex<Option<Arc<dyn Connection>>>,

    last_result: RwLock<Option<Arc<HostResult>>>,
}

impl Host {
    /// Create a new host with the given name and attributes
    pub fn new(name: impl Into<String>, attributes: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            attributes,
            connection: Mutex::new(None),
            last_result: RwLock::new(None),
        }
    }

    /// Create a host without attributes
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, IndexMap::new())
    }

    /// Get the address to connect to, falling back to the name
    pub fn address(&self) -> &str {
        self.attributes
            .get("address")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Parse a host definition such as `"web1 address=10.0.0.1 role=frontend"`
    pub fn parse(input: &str) -> Result<Self, HostParseError> {
        let mut parts = input.split_whitespace();
        let name = parts.next().ok_or(HostParseError::EmptyInput)?;

        let mut attributes = IndexMap::new();
        for part in parts {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| HostParseError::InvalidAttribute(part.to_string()))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            attributes.insert(key.to_string(), value);
        }

        Ok(Host::new(name, attributes))
    }

    /// The currently installed connection, if any
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.lock().clone()
    }

    /// Install a connection, returning the one it replaces
    pub fn set_connection(&self, connection: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
        self.connection.lock().replace(connection)
    }

    /// Remove the connection from this host
    pub fn take_connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.lock().take()
    }

    /// Result of the most recent run on this host
    pub fn last_result(&self) -> Option<Arc<HostResult>> {
        self.last_result.read().clone()
    }

    pub(crate) fn set_last_result(&self, result: Arc<HostResult>) {
        *self.last_result.write() = Some(result);
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Errors that can occur when parsing a host definition
#[derive(Debug, thiserror::Error)]
pub enum HostParseError {
    #[error("empty input")]
    EmptyInput,
    #[error("invalid attribute (expected key=value): {0}")]
    InvalidAttribute(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LocalSession;

    #[test]
    fn test_host_named() {
        let host = Host::named("webserver1");
        assert_eq!(host.name, "webserver1");
        assert_eq!(host.address(), "webserver1");
        assert!(host.last_result().is_none());
        assert!(host.connection().is_none());
    }

    #[test]
    fn test_host_parse() {
        let host = Host::parse("web1 address=10.0.0.1 weight=3").unwrap();
        assert_eq!(host.name, "web1");
        assert_eq!(host.address(), "10.0.0.1");
        assert_eq!(host.attribute("weight"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_host_parse_rejects_bare_words() {
        assert!(matches!(Host::parse(""), Err(HostParseError::EmptyInput)));
        assert!(matches!(
            Host::parse("web1 nonsense"),
            Err(HostParseError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_connection_slot() {
        let host = Host::named("web1");
        assert!(host
            .set_connection(Arc::new(LocalSession::new("web1")))
            .is_none());
        assert!(host.connection().is_some());
        assert!(host.take_connection().is_some());
        assert!(host.connection().is_none());
    }

    #[test]
    fn test_equality_by_name() {
        assert_eq!(Host::named("a"), Host::parse("a role=db").unwrap());
        assert_ne!(Host::named("a"), Host::named("b"));
    }
}
