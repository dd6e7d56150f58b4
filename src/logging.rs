//! Structured logging built on `tracing`.
//!
//! Logs go to stderr so that streamed host output on stdout stays clean.
//! The filter is chosen in this order: `RUST_LOG`, the `-v` count, the
//! configured level, then `warn`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::error::{Error, Result};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human friendly
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `RUST_LOG` nor `-v` is given
    pub level: Option<String>,

    pub format: LogFormat,

    /// Colorize log lines
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::default(),
            ansi: true,
        }
    }
}

/// Filter directive for a `-v` count
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn fallback_directive(verbosity: u8, config: &LoggingConfig) -> String {
    match (verbosity, config.level.as_deref()) {
        (0, Some(level)) => level.to_string(),
        _ => level_for_verbosity(verbosity).to_string(),
    }
}

fn build_filter(verbosity: u8, config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = fallback_directive(verbosity, config);
    EnvFilter::try_new(&directive)
        .map_err(|e| Error::config(format!("invalid log level '{directive}': {e}")))
}

/// Install the global subscriber
pub fn init_logging(verbosity: u8, config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(verbosity, config)?;
    let with_target = verbosity >= 3;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.ansi)
                    .with_target(with_target),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.ansi)
                    .with_target(with_target),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            )
            .try_init(),
    };

    installed.map_err(|e| Error::config(e.to_string()))
}
