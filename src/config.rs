//! Configuration module for Herd
//!
//! Handles loading and merging configuration from multiple sources, later
//! sources winning:
//! - Default values
//! - System configuration (`/etc/herd/config.toml`)
//! - User configuration (`~/.config/herd/config.toml`)
//! - Project configuration (`./herd.toml`)
//! - An explicit file (`--config` or `HERD_CONFIG`)
//! - Environment variables
//!
//! Command-line flags are applied on top by the binary.
//!
//! Files are merged key by key, so a project file that only sets
//! `runner.parallel` keeps the timeouts from the user file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::RunnerConfig;
use crate::inventory::parse_sort_keys;
use crate::logging::LoggingConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Concurrency and timeouts
    pub runner: RunnerConfig,

    /// Terminal output
    pub output: OutputConfig,

    pub logging: LoggingConfig,
}

/// Terminal output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Colorize output
    pub color: bool,

    /// Prefix streamed lines with a timestamp
    pub timestamp: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: true,
            timestamp: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::Value::Object(Default::default());

        for path in Self::config_paths(config_path) {
            if path.exists() {
                debug!(path = %path.display(), "Loading config file");
                merge_values(&mut merged, read_value(&path)?);
            } else if Some(path.as_path()) == config_path {
                return Err(Error::ConfigRead {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::config(e.to_string()))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults with only the environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load a single file on top of the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let value = read_value(path.as_ref())?;
        serde_json::from_value(value).map_err(|e| Error::ConfigParse {
            path: path.as_ref().to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Configuration file paths in load order
    fn config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/herd/config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("herd").join("config.toml"));
        }

        paths.push(PathBuf::from("herd.toml"));

        if let Some(path) = explicit_path {
            paths.push(path.to_path_buf());
        }

        paths
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(parallel) = env_var("HERD_PARALLEL") {
            self.runner.parallel = parallel
                .parse()
                .map_err(|e| Error::config(format!("HERD_PARALLEL '{parallel}': {e}")))?;
        }

        for (name, field) in [
            ("HERD_SPLAY", &mut self.runner.splay),
            ("HERD_TIMEOUT", &mut self.runner.timeout),
            ("HERD_HOST_TIMEOUT", &mut self.runner.host_timeout),
            ("HERD_CONNECT_TIMEOUT", &mut self.runner.connect_timeout),
        ] {
            if let Some(value) = env_var(name) {
                *field = parse_duration(name, &value)?;
            }
        }

        if let Some(sort) = env_var("HERD_SORT") {
            let keys = parse_sort_keys(&sort);
            if keys.is_empty() {
                return Err(Error::config(format!("HERD_SORT '{sort}': no sort keys")));
            }
            self.runner.sort = keys;
        }

        if std::env::var_os("NO_COLOR").is_some() {
            self.output.color = false;
            self.logging.ansi = false;
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a human-readable duration such as `10s` or `250ms`
pub fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| Error::config(format!("{name} '{value}': {e}")))
}

/// Read a config file into a generic value, choosing the format by extension
fn read_value(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_error = |message: String| Error::ConfigParse {
        path: path.to_path_buf(),
        message,
    };

    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        _ => {
            let value: toml::Value =
                toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_error(e.to_string()))
        }
    }
}

/// Deep-merge `overlay` into `base`; tables merge recursively, anything else replaces
fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
