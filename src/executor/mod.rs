//! Core execution engine for Herd
//!
//! This module provides the concurrent command-execution engine:
//! - [`Executor`]: the pluggable transport that runs one command on one host
//! - [`Runner`]: scatters a command over a [`HostSet`](crate::inventory::HostSet)
//!   under bounded parallelism, splay and two-level timeouts, and gathers an
//!   ordered [`HistoryItem`]
//! - progress and output events streamed while a run is in flight

#[cfg(feature = "local")]
pub mod local;
pub mod result;
pub mod runner;

#[cfg(feature = "local")]
pub use local::LocalExecutor;
pub use result::{HistoryItem, HostError, HostResult, Summary, INFRA_EXIT_STATUS};
pub use runner::{Runner, RunnerConfig};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::inventory::Host;

/// Errors that prevent a run from starting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("No executor defined")]
    NoExecutor,

    #[error("No hosts selected")]
    NoHosts,
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Which stream a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A chunk of live output from one host
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub host: Arc<Host>,
    pub stream: OutputStream,
    pub data: Vec<u8>,
}

impl OutputLine {
    pub fn is_stderr(&self) -> bool {
        self.stream == OutputStream::Stderr
    }
}

/// Lifecycle of a per-host task: `Queued -> (Waiting) -> Running -> Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgressState {
    Queued,
    Waiting,
    Running,
    Finished,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressState::Queued => write!(f, "queued"),
            ProgressState::Waiting => write!(f, "waiting"),
            ProgressState::Running => write!(f, "running"),
            ProgressState::Finished => write!(f, "finished"),
        }
    }
}

/// A state change of one host's task. `result` is set only when finished.
#[derive(Debug, Clone)]
pub struct ProgressMessage {
    pub host: Arc<Host>,
    pub state: ProgressState,
    pub result: Option<Arc<HostResult>>,
}

/// Sink for progress events
pub type ProgressSink = UnboundedSender<ProgressMessage>;

/// Sink for live output
pub type OutputSink = UnboundedSender<OutputLine>;

/// Per-call context handed to an [`Executor`]
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Cancelled when the run is aborted or this host's deadline elapses
    pub token: CancellationToken,
    /// This host's deadline
    pub timeout: Duration,
}

impl ExecContext {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self { token, timeout }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Transport that executes one command on one host.
///
/// Implementations must:
/// - return promptly with an infrastructure result ([`HostResult::infra`])
///   once `ctx.token` is cancelled;
/// - send output to `output` as it is produced, not only at completion;
/// - honour the connect timeout when establishing a session.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command` on `host`
    async fn run(
        &self,
        ctx: ExecContext,
        host: &Arc<Host>,
        command: &str,
        output: Option<OutputSink>,
    ) -> HostResult;

    /// Limit how long establishing a session to one host may take
    fn set_connect_timeout(&self, timeout: Duration);

    /// Current connect timeout
    fn connect_timeout(&self) -> Duration;
}
