//! Per-host results and per-run history records.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::inventory::HostSet;

/// Exit status recorded for local or infrastructure failures
pub const INFRA_EXIT_STATUS: i32 = -1;

/// Infrastructure-level failure of one host.
///
/// These never abort a run; they are recorded in the host's [`HostResult`]
/// with exit status [`INFRA_EXIT_STATUS`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The per-host deadline elapsed
    #[error("timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// The run was cancelled. `started` tells whether the host had reached
    /// the running state.
    #[error("context canceled")]
    Cancelled { started: bool },

    /// Establishing a session failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Establishing a session exceeded the connect timeout
    #[error("connection timed out after {}", humantime::format_duration(*.0))]
    ConnectTimeout(Duration),

    /// The command could not be started
    #[error("failed to start command: {0}")]
    Spawn(String),

    /// I/O failure while streaming output
    #[error("IO error: {0}")]
    Io(String),
}

impl Serialize for HostError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// The outcome of running one command on one host.
///
/// Exit status convention: `0` is success, positive values are the remote
/// command's own exit code, and [`INFRA_EXIT_STATUS`] means the command never
/// produced an exit code (timeout, cancellation, connection error). `error` is
/// always set in the latter case.
#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    /// Host name
    pub host: String,
    pub exit_status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
    /// Captured standard output (empty when output was only streamed)
    #[serde(serialize_with = "lossy")]
    pub stdout: Vec<u8>,
    /// Captured standard error (empty when output was only streamed)
    #[serde(serialize_with = "lossy")]
    pub stderr: Vec<u8>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    #[serde(skip)]
    pub(crate) index: usize,
}

impl HostResult {
    /// Create a result with the given exit status and no output
    pub fn new(host: impl Into<String>, exit_status: i32) -> Self {
        let now = Utc::now();
        Self {
            host: host.into(),
            exit_status,
            error: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            started_at: now,
            ended_at: now,
            elapsed: Duration::ZERO,
            index: 0,
        }
    }

    /// Create an infrastructure failure result
    pub fn infra(host: impl Into<String>, error: HostError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(host, INFRA_EXIT_STATUS)
        }
    }

    /// Attach captured output
    pub fn with_output(mut self, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Attach an error while keeping the exit status
    pub fn with_error(mut self, error: HostError) -> Self {
        self.error = Some(error);
        self
    }

    /// Set start and end times, deriving the elapsed time
    pub fn with_timing(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self.ended_at = ended_at;
        self.elapsed = (ended_at - started_at).to_std().unwrap_or_default();
        self
    }

    /// Position of this result in the host set ordering
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_ok(&self) -> bool {
        self.exit_status == 0
    }

    /// The remote command ran and exited non-zero
    pub fn is_failure(&self) -> bool {
        self.exit_status > 0
    }

    /// The command did not produce an exit status
    pub fn is_error(&self) -> bool {
        self.exit_status == INFRA_EXIT_STATUS
    }
}

/// Outcome counts of a run. Every result lands in exactly one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ok: usize,
    pub fail: usize,
    pub err: usize,
}

impl Summary {
    /// Count one result
    pub fn record(&mut self, result: &HostResult) {
        match result.exit_status {
            INFRA_EXIT_STATUS => self.err += 1,
            0 => self.ok += 1,
            _ => self.fail += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.fail + self.err
    }

    /// Whether every host succeeded
    pub fn all_ok(&self) -> bool {
        self.fail == 0 && self.err == 0
    }
}

/// The record of one run
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub command: String,
    /// One result per host, ordered by host index
    pub results: Vec<Arc<HostResult>>,
    pub summary: Summary,
    max_host_name_length: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl HistoryItem {
    /// Length of the longest host name at the time of the run
    pub fn max_host_name_length(&self) -> usize {
        self.max_host_name_length
    }

    /// Wall-clock time of the run (up to now if it has not been sealed)
    pub fn elapsed(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    /// Serialize this record as pretty JSON
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rewrite indices and result order to follow the current host order,
    /// refreshing each host's last result to the reindexed record.
    pub(crate) fn reorder_to(&mut self, hosts: &HostSet) {
        let positions: HashMap<&str, usize> = hosts
            .iter()
            .enumerate()
            .map(|(idx, host)| (host.name.as_str(), idx))
            .collect();

        let mut reordered: Vec<Arc<HostResult>> = self
            .results
            .iter()
            .map(|result| {
                let index = positions
                    .get(result.host.as_str())
                    .copied()
                    .unwrap_or(result.index);
                Arc::new(HostResult {
                    index,
                    ..HostResult::clone(result)
                })
            })
            .collect();
        reordered.sort_by_key(|r| r.index);

        for result in &reordered {
            if let Some(host) = hosts.get(&result.host) {
                host.set_last_result(Arc::clone(result));
            }
        }
        self.results = reordered;
    }

    pub(crate) fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

/// Collects results into pre-sized slots while a run is in flight
#[derive(Debug)]
pub(crate) struct HistoryBuilder {
    command: String,
    slots: Vec<Option<Arc<HostResult>>>,
    summary: Summary,
    max_host_name_length: usize,
    started_at: DateTime<Utc>,
}

impl HistoryBuilder {
    pub(crate) fn new(command: impl Into<String>, hosts: usize, max_host_name_length: usize) -> Self {
        Self {
            command: command.into(),
            slots: vec![None; hosts],
            summary: Summary::default(),
            max_host_name_length,
            started_at: Utc::now(),
        }
    }

    /// Place a result in its slot. Returns false if the slot is taken or out
    /// of range, in which case the result is dropped.
    pub(crate) fn record(&mut self, result: Arc<HostResult>) -> bool {
        match self.slots.get_mut(result.index) {
            Some(slot) if slot.is_none() => {
                self.summary.record(&result);
                *slot = Some(result);
                true
            }
            _ => false,
        }
    }

    /// Fill every empty slot with `fill(index)` and produce the record
    pub(crate) fn finish(self, mut fill: impl FnMut(usize) -> Arc<HostResult>) -> HistoryItem {
        let mut summary = self.summary;
        let results = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let result = fill(index);
                    summary.record(&result);
                    result
                })
            })
            .collect();

        HistoryItem {
            command: self.command,
            results,
            summary,
            max_host_name_length: self.max_host_name_length,
            started_at: self.started_at,
            ended_at: None,
        }
    }
}
