//! Shared test utilities for the Herd test suite.
//!
//! This module provides:
//! - [`MockExecutor`], a scriptable [`Executor`] that tracks concurrency
//! - Host set builders
//! - Helpers to drain progress and output channels
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;

use herd::connection::LocalSession;
use herd::executor::{
    ExecContext, Executor, HostError, HostResult, OutputLine, OutputSink, OutputStream,
    ProgressMessage,
};
use herd::inventory::{Host, HostSet};

/// A delay long enough that a test would time out before it elapses
pub const FOREVER: Duration = Duration::from_secs(3600);

/// What the mock does for one host
#[derive(Debug, Clone)]
pub struct Behavior {
    pub exit_status: i32,
    pub delay: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Keep sleeping after the context is cancelled
    pub ignore_cancel: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            exit_status: 0,
            delay: Duration::ZERO,
            stdout: Vec::new(),
            stderr: Vec::new(),
            ignore_cancel: false,
        }
    }
}

impl Behavior {
    pub fn exit(exit_status: i32) -> Self {
        Self {
            exit_status,
            ..Self::default()
        }
    }

    pub fn sleep(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self::sleep(FOREVER)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.as_bytes().to_vec();
        self
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.as_bytes().to_vec();
        self
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }
}

/// Scriptable executor that records how it was driven
pub struct MockExecutor {
    default: RwLock<Behavior>,
    per_host: RwLock<HashMap<String, Behavior>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    started: RwLock<Vec<String>>,
    entered_at: RwLock<HashMap<String, Instant>>,
    connect_timeout: RwLock<Duration>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            default: RwLock::new(Behavior::default()),
            per_host: RwLock::new(HashMap::new()),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
            started: RwLock::new(Vec::new()),
            entered_at: RwLock::new(HashMap::new()),
            connect_timeout: RwLock::new(Duration::from_secs(3)),
        }
    }

    /// Behavior for hosts without a specific one
    pub fn with_default(self, behavior: Behavior) -> Self {
        *self.default.write() = behavior;
        self
    }

    /// Behavior for one host
    pub fn with_host(self, host: &str, behavior: Behavior) -> Self {
        self.per_host.write().insert(host.to_string(), behavior);
        self
    }

    /// Highest number of hosts that were inside `run` at the same time
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Hosts inside `run` right now
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Hosts in the order `run` was entered
    pub fn started(&self) -> Vec<String> {
        self.started.read().clone()
    }

    /// When `run` was entered for `host`
    pub fn entered_at(&self, host: &str) -> Option<Instant> {
        self.entered_at.read().get(host).copied()
    }

    fn behavior_for(&self, host: &str) -> Behavior {
        self.per_host
            .read()
            .get(host)
            .cloned()
            .unwrap_or_else(|| self.default.read().clone())
    }
}

/// Decrements the running counter even when the call is dropped mid-flight
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn run(
        &self,
        ctx: ExecContext,
        host: &Arc<Host>,
        _command: &str,
        output: Option<OutputSink>,
    ) -> HostResult {
        self.entered_at.write().insert(host.name.clone(), Instant::now());
        let behavior = self.behavior_for(&host.name);
        self.started.write().push(host.name.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(Arc::clone(&self.running));

        if host.connection().is_none() {
            host.set_connection(Arc::new(LocalSession::new(host.name.clone())));
        }

        if let Some(output) = &output {
            for (stream, data) in [
                (OutputStream::Stdout, &behavior.stdout),
                (OutputStream::Stderr, &behavior.stderr),
            ] {
                if !data.is_empty() {
                    let _ = output.send(OutputLine {
                        host: Arc::clone(host),
                        stream,
                        data: data.clone(),
                    });
                }
            }
        }

        if ctx.is_cancelled() && !behavior.ignore_cancel {
            return HostResult::infra(host.name.clone(), HostError::Cancelled { started: true });
        }

        if behavior.ignore_cancel {
            tokio::time::sleep(behavior.delay).await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(behavior.delay) => {}
                _ = ctx.token.cancelled() => {
                    return HostResult::infra(host.name.clone(), HostError::Cancelled { started: true });
                }
            }
        }

        HostResult::new(host.name.clone(), behavior.exit_status)
            .with_output(behavior.stdout, behavior.stderr)
    }

    fn set_connect_timeout(&self, timeout: Duration) {
        *self.connect_timeout.write() = timeout;
    }

    fn connect_timeout(&self) -> Duration {
        *self.connect_timeout.read()
    }
}

/// Host set of `host00`, `host01`, ... in name order
pub fn hosts(count: usize) -> HostSet {
    (0..count).map(|i| Host::named(format!("host{i:02}"))).collect()
}

/// Host set with the given names, in the given order
pub fn named_hosts(names: &[&str]) -> HostSet {
    names.iter().map(|name| Host::named(*name)).collect()
}

/// Everything currently buffered in a channel
pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Progress messages for one host
pub fn progress_for<'a>(messages: &'a [ProgressMessage], host: &str) -> Vec<&'a ProgressMessage> {
    messages.iter().filter(|m| m.host.name == host).collect()
}
