//! # Herd - Run One Command Across a Fleet
//!
//! Herd is the execution core of an interactive fleet shell: given a set of
//! hosts and a command, it runs the command on every host concurrently and
//! returns one ordered result per host.
//!
//! ## Core Concepts
//!
//! - **Hosts**: named targets with free-form attributes and a reusable session
//! - **Host sets**: ordered, deduplicated collections of hosts, sortable by
//!   name, attributes or the outcome of the last run
//! - **Executors**: the pluggable transport that runs one command on one host
//! - **Runner**: bounded parallelism, random splay, a per-host deadline and a
//!   global deadline around an executor
//! - **History items**: the record of a run (results in host order plus an
//!   ok/fail/err summary)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   resolve   ┌───────────┐
//! │ HostProvider ├────────────►│  HostSet  │
//! └──────────────┘             └─────┬─────┘
//!                                    │
//!                                    ▼
//!        progress / output  ┌─────────────────┐  one task per host
//!      ◄────────────────────┤     Runner      ├──────────────────┐
//!                           └────────┬────────┘                  ▼
//!                                    │                   ┌──────────────┐
//!                                    ▼                   │   Executor   │
//!                           ┌─────────────────┐          └──────────────┘
//!                           │   HistoryItem   │
//!                           └─────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use herd::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let hosts: HostSet = ["web-01", "web-02"].into_iter().map(Host::named).collect();
//!     let mut runner = Runner::new(hosts, Some(Arc::new(LocalExecutor::new())));
//!     runner.set_parallel(1);
//!
//!     let item = runner.run("uptime", None, None).await?;
//!     println!("ok={} fail={} err={}", item.summary.ok, item.summary.fail, item.summary.err);
//!     runner.end().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::connection::{Connection, ConnectionError, ConnectionResult, LocalSession};
    pub use crate::error::{Error, Result};
    #[cfg(feature = "local")]
    pub use crate::executor::LocalExecutor;
    pub use crate::executor::{
        ExecContext, Executor, ExecutorError, HistoryItem, HostError, HostResult, OutputLine,
        OutputSink, OutputStream, ProgressMessage, ProgressSink, ProgressState, Runner,
        RunnerConfig, Summary, INFRA_EXIT_STATUS,
    };
    pub use crate::inventory::{
        resolve_hosts, DnsProvider, Host, HostProvider, HostSet, SortKey, StaticProvider,
    };
}

/// Error types and result aliases.
pub mod error;

/// Layered configuration (files, environment).
pub mod config;

/// Host sessions.
pub mod connection;

/// Hosts, host sets, sort keys and host providers.
pub mod inventory;

/// The runner, the executor capability and run results.
pub mod executor;

/// Tracing subscriber setup.
pub mod logging;

/// Command-line interface.
#[cfg(feature = "local")]
pub mod cli;

pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
