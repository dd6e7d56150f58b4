//! Error types for Herd.
//!
//! Each layer owns a focused error enum (`ExecutorError`, `InventoryError`,
//! `ConnectionError`); this module wraps them into the crate-wide [`Error`]
//! used by configuration loading and the binary.

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionError;
use crate::executor::ExecutorError;
use crate::inventory::InventoryError;

/// Result type alias for Herd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Herd.
#[derive(Error, Debug)]
pub enum Error {
    /// A run could not be started.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Host set construction or host resolution failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// A connection could not be used or closed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Error reading a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path of the file
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParse {
        /// Path of the file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error from any displayable message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Whether this error was raised before any host was touched.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Executor(_) | Error::Config(_))
    }
}
