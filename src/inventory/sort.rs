//! Sort keys for host sets.
//!
//! The ordering of a [`HostSet`](super::HostSet) is described by a list of
//! [`SortKey`]s; the first key is primary and later keys break ties. Some keys
//! look at the host itself, others at the host's most recent result, which is
//! only known after a run.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::Host;

/// A single key of a host-set ordering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortKey {
    /// Host name
    Name,
    /// Exit status of the last result
    ExitStatus,
    /// Captured standard output of the last result
    Stdout,
    /// Captured standard error of the last result
    Stderr,
    /// A provider-supplied host attribute
    Attribute(String),
}

impl SortKey {
    /// Whether this key depends on the outcome of a run
    pub fn is_result_key(&self) -> bool {
        matches!(self, SortKey::ExitStatus | SortKey::Stdout | SortKey::Stderr)
    }

    /// Compare two hosts by this key.
    ///
    /// Hosts without a result (or without the attribute) sort before hosts
    /// that have one.
    pub fn compare(&self, a: &Host, b: &Host) -> Ordering {
        match self {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::ExitStatus => {
                let key = |h: &Host| h.last_result().map(|r| r.exit_status);
                key(a).cmp(&key(b))
            }
            SortKey::Stdout => {
                let (ra, rb) = (a.last_result(), b.last_result());
                ra.as_deref()
                    .map(|r| r.stdout.as_slice())
                    .cmp(&rb.as_deref().map(|r| r.stdout.as_slice()))
            }
            SortKey::Stderr => {
                let (ra, rb) = (a.last_result(), b.last_result());
                ra.as_deref()
                    .map(|r| r.stderr.as_slice())
                    .cmp(&rb.as_deref().map(|r| r.stderr.as_slice()))
            }
            SortKey::Attribute(name) => compare_values(a.attribute(name), b.attribute(name)),
        }
    }
}

fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    use serde_json::Value;

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "name" => SortKey::Name,
            "exitstatus" | "exit_status" => SortKey::ExitStatus,
            "stdout" => SortKey::Stdout,
            "stderr" => SortKey::Stderr,
            _ => SortKey::Attribute(s.trim().to_string()),
        })
    }
}

impl TryFrom<String> for SortKey {
    type Error = super::InventoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(super::InventoryError::UnknownSortKey(value));
        }
        Ok(value.parse().unwrap_or_else(|never| match never {}))
    }
}

impl From<SortKey> for String {
    fn from(key: SortKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Name => write!(f, "name"),
            SortKey::ExitStatus => write!(f, "exitstatus"),
            SortKey::Stdout => write!(f, "stdout"),
            SortKey::Stderr => write!(f, "stderr"),
            SortKey::Attribute(name) => write!(f, "{}", name),
        }
    }
}

/// Parse a comma separated key list such as `"exitstatus,name"`
pub fn parse_sort_keys(spec: &str) -> Vec<SortKey> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_keys() {
        assert_eq!("name".parse::<SortKey>().unwrap(), SortKey::Name);
        assert_eq!("ExitStatus".parse::<SortKey>().unwrap(), SortKey::ExitStatus);
        assert_eq!("stdout".parse::<SortKey>().unwrap(), SortKey::Stdout);
        assert_eq!(
            "region".parse::<SortKey>().unwrap(),
            SortKey::Attribute("region".into())
        );
    }

    #[test]
    fn test_parse_sort_keys_list() {
        assert_eq!(
            parse_sort_keys("exitstatus, name,"),
            vec![SortKey::ExitStatus, SortKey::Name]
        );
    }

    #[test]
    fn test_result_keys() {
        assert!(SortKey::Stderr.is_result_key());
        assert!(!SortKey::Name.is_result_key());
        assert!(!SortKey::Attribute("stdout_len".into()).is_result_key());
    }

    #[test]
    fn test_attribute_compare_numbers_and_missing() {
        let a = Host::parse("a weight=10").unwrap();
        let b = Host::parse("b weight=9").unwrap();
        let c = Host::named("c");
        let key = SortKey::Attribute("weight".into());
        assert_eq!(key.compare(&a, &b), Ordering::Greater);
        assert_eq!(key.compare(&c, &b), Ordering::Less);
    }

    #[test]
    fn test_serde_as_string() {
        let keys: Vec<SortKey> = serde_json::from_str(r#"["exitstatus","name"]"#).unwrap();
        assert_eq!(keys, vec![SortKey::ExitStatus, SortKey::Name]);
        assert_eq!(serde_json::to_string(&keys).unwrap(), r#"["exitstatus","name"]"#);
    }
}
