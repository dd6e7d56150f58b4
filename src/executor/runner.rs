//! Runner: scatter one command over a host set and gather the results.
//!
//! One call to [`Runner::run`] launches a task per host, capped at the
//! effective parallelism by a semaphore. Each task optionally sleeps a random
//! splay, then calls the [`Executor`] under its own per-host deadline. A
//! watcher cancels the shared run token when the global deadline elapses or an
//! interrupt arrives. Once every task has settled (or has been abandoned after
//! cancellation), hosts without a result get a synthesized cancellation result,
//! so the returned [`HistoryItem`] always has exactly one result per host.

use chrono::Utc;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::result::HistoryBuilder;
use super::{
    ExecContext, Executor, ExecutorError, ExecutorResult, HistoryItem, HostError, HostResult,
    OutputSink, ProgressMessage, ProgressSink, ProgressState,
};
use crate::inventory::{Host, HostSet, SortKey};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Concurrency and timeout policy of a [`Runner`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of hosts running at once; zero or negative means all
    pub parallel: i64,

    /// Upper bound of the random delay before each host starts
    #[serde(with = "humantime_serde")]
    pub splay: Duration,

    /// Deadline for the whole run
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Deadline for a single host
    #[serde(with = "humantime_serde")]
    pub host_timeout: Duration,

    /// Deadline for establishing a session to a single host
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// How long to wait for cancelled tasks before abandoning them
    #[serde(with = "humantime_serde")]
    pub drain_grace: Duration,

    /// Host ordering
    pub sort: Vec<SortKey>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: 0,
            splay: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            host_timeout: DEFAULT_HOST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            sort: vec![SortKey::Name],
        }
    }
}

/// Runs commands across a host set
pub struct Runner {
    hosts: HostSet,
    parallel: i64,
    splay: Duration,
    timeout: Duration,
    host_timeout: Duration,
    drain_grace: Duration,
    executor: Option<Arc<dyn Executor>>,
}

impl Runner {
    /// Create a runner with default timeouts (60s per run, 10s per host)
    pub fn new(hosts: HostSet, executor: Option<Arc<dyn Executor>>) -> Self {
        Self {
            hosts,
            parallel: 0,
            splay: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            host_timeout: DEFAULT_HOST_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            executor,
        }
    }

    /// Create a runner from configuration. A non-empty `config.sort`
    /// replaces the host set's sort keys.
    pub fn from_config(
        mut hosts: HostSet,
        executor: Option<Arc<dyn Executor>>,
        config: &RunnerConfig,
    ) -> Self {
        if !config.sort.is_empty() {
            hosts.set_sort_keys(config.sort.clone());
        }
        let mut runner = Self::new(hosts, executor);
        runner.set_parallel(config.parallel);
        runner.set_splay(config.splay);
        runner.set_timeout(config.timeout);
        runner.set_host_timeout(config.host_timeout);
        runner.set_connect_timeout(config.connect_timeout);
        runner.set_drain_grace(config.drain_grace);
        runner
    }

    pub fn set_parallel(&mut self, parallel: i64) {
        self.parallel = parallel;
    }

    pub fn set_splay(&mut self, splay: Duration) {
        self.splay = splay;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_host_timeout(&mut self, timeout: Duration) {
        self.host_timeout = timeout;
    }

    pub fn host_timeout(&self) -> Duration {
        self.host_timeout
    }

    /// Forwarded to the executor; ignored when none is configured
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        if let Some(executor) = &self.executor {
            executor.set_connect_timeout(timeout);
        }
    }

    pub fn set_drain_grace(&mut self, grace: Duration) {
        self.drain_grace = grace;
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = Some(executor);
    }

    pub fn hosts(&self) -> &HostSet {
        &self.hosts
    }

    /// Mutable access to the host set between runs
    pub fn hosts_mut(&mut self) -> &mut HostSet {
        &mut self.hosts
    }

    /// Number of hosts allowed to run at once for the current host set
    pub fn effective_parallelism(&self) -> usize {
        usize::try_from(self.parallel)
            .ok()
            .filter(|p| *p > 0)
            .map_or(self.hosts.len(), |p| p.min(self.hosts.len()))
    }

    /// Current settings, for display by a surrounding CLI
    pub fn settings(&self) -> (&'static str, IndexMap<&'static str, String>) {
        let mut settings = IndexMap::new();
        settings.insert("Parallel", self.parallel.to_string());
        settings.insert("Splay", humantime::format_duration(self.splay).to_string());
        settings.insert("Timeout", humantime::format_duration(self.timeout).to_string());
        settings.insert(
            "HostTimeout",
            humantime::format_duration(self.host_timeout).to_string(),
        );
        if let Some(executor) = &self.executor {
            settings.insert(
                "ConnectTimeout",
                humantime::format_duration(executor.connect_timeout()).to_string(),
            );
        }
        ("Runner", settings)
    }

    /// Run `command` on every host, cancelling on Ctrl-C.
    pub async fn run(
        &mut self,
        command: &str,
        progress: Option<ProgressSink>,
        output: Option<OutputSink>,
    ) -> ExecutorResult<HistoryItem> {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Unable to listen for interrupts");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(command, progress, output, interrupt).await
    }

    /// Run `command` on every host, cancelling when `interrupt` completes.
    ///
    /// Fails only if no executor is configured or the host set is empty; all
    /// per-host problems, including a global timeout or interrupt, are reported
    /// through the results and summary of the returned record.
    #[instrument(skip(self, progress, output, interrupt), fields(hosts = self.hosts.len()))]
    pub async fn run_until<F>(
        &mut self,
        command: &str,
        progress: Option<ProgressSink>,
        output: Option<OutputSink>,
        interrupt: F,
    ) -> ExecutorResult<HistoryItem>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let executor = self.executor.clone().ok_or(ExecutorError::NoExecutor)?;
        if self.hosts.is_empty() {
            return Err(ExecutorError::NoHosts);
        }

        let (progress, drain) = match progress {
            Some(progress) => (progress, None),
            None => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
                (tx, Some(drain))
            }
        };

        let hosts: Vec<Arc<Host>> = self.hosts.iter().cloned().collect();
        let parallel = self.effective_parallelism();
        let mut history = HistoryBuilder::new(command, hosts.len(), self.hosts.max_name_length());
        let token = CancellationToken::new();
        let _cancel_on_exit = token.clone().drop_guard();
        let running: Arc<[AtomicBool]> = hosts.iter().map(|_| AtomicBool::new(false)).collect();
        let command: Arc<str> = Arc::from(command);

        info!(command = %command, parallel, "Starting run");

        let semaphore = Arc::new(Semaphore::new(parallel));
        let mut tasks = JoinSet::new();
        for (index, host) in hosts.iter().enumerate() {
            let task = HostTask {
                index,
                host: Arc::clone(host),
                command: Arc::clone(&command),
                executor: Arc::clone(&executor),
                semaphore: Arc::clone(&semaphore),
                token: token.clone(),
                progress: progress.clone(),
                output: output.clone(),
                splay: self.splay,
                host_timeout: self.host_timeout,
                running: Arc::clone(&running),
            };
            task.report(ProgressState::Queued, None);
            tasks.spawn(task.run());
        }

        let watcher = tokio::spawn(watch(token.clone(), self.timeout, interrupt));

        // Outer None: still running. Inner None: cancelled, grace too large to expire.
        let mut drain_deadline: Option<Option<Instant>> = None;
        let mut abandoned = false;
        loop {
            let joined = match drain_deadline {
                None => tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = token.cancelled() => {
                        drain_deadline = Some(Instant::now().checked_add(self.drain_grace));
                        continue;
                    }
                },
                Some(None) => tasks.join_next().await,
                Some(Some(deadline)) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(abandoned = tasks.len(), "Abandoning tasks that ignored cancellation");
                        tasks.abort_all();
                        tasks.detach_all();
                        abandoned = true;
                        break;
                    }
                },
            };

            match joined {
                None => break,
                Some(Ok(Some(result))) => {
                    if !history.record(Arc::clone(&result)) {
                        warn!(host = %result.host, index = result.index(), "Dropping unexpected result");
                    }
                }
                Some(Ok(None)) => {}
                Some(Err(e)) => warn!(error = %e, "Host task did not complete"),
            }
        }

        token.cancel();
        let _ = watcher.await;

        let mut item = history.finish(|index| {
            let host = &hosts[index];
            let started = running[index].load(Ordering::Acquire);
            debug!(host = %host.name, started, "No result, marking as cancelled");
            let mut result = HostResult::infra(host.name.clone(), HostError::Cancelled { started });
            result.index = index;
            let result = Arc::new(result);
            host.set_last_result(Arc::clone(&result));
            let _ = progress.send(ProgressMessage {
                host: Arc::clone(host),
                state: ProgressState::Finished,
                result: Some(Arc::clone(&result)),
            });
            result
        });

        if self.hosts.has_result_keys() {
            // Re-sort hosts and results by the outcome of this run
            self.hosts.sort();
            item.reorder_to(&self.hosts);
        }
        item.end();

        // Abandoned tasks may still hold a sender, so only join the drain when none are left
        drop(progress);
        if let Some(drain) = drain {
            if abandoned {
                drain.abort();
            } else {
                let _ = drain.await;
            }
        }

        info!(
            ok = item.summary.ok,
            fail = item.summary.fail,
            err = item.summary.err,
            elapsed = ?item.elapsed(),
            "Run finished"
        );
        Ok(item)
    }

    /// Close every open host connection
    pub async fn end(&self) {
        for host in &self.hosts {
            if let Some(connection) = host.take_connection() {
                debug!("Disconnecting from {}", host.name);
                if let Err(e) = connection.close().await {
                    warn!(host = %host.name, error = %e, "Failed to close connection");
                }
            }
        }
    }
}

/// Cancel `token` when the run deadline passes or `interrupt` completes
async fn watch<F>(token: CancellationToken, timeout: Duration, interrupt: F)
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            error!("Run canceled with unfinished tasks!");
            token.cancel();
        }
        _ = interrupt => {
            error!("Interrupted, canceling with unfinished tasks");
            token.cancel();
        }
    }
}

/// Sleep a uniformly random duration in `[0, splay)`, returning early on cancellation
async fn splay_delay(splay: Duration, token: &CancellationToken) {
    if splay.is_zero() {
        return;
    }
    let upper = u64::try_from(splay.as_nanos()).unwrap_or(u64::MAX);
    let delay = Duration::from_nanos(rand::thread_rng().gen_range(0..upper));
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = token.cancelled() => {}
    }
}

/// Everything one host's task needs, owned so it can be spawned
struct HostTask {
    index: usize,
    host: Arc<Host>,
    command: Arc<str>,
    executor: Arc<dyn Executor>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    progress: ProgressSink,
    output: Option<OutputSink>,
    splay: Duration,
    host_timeout: Duration,
    running: Arc<[AtomicBool]>,
}

impl HostTask {
    fn report(&self, state: ProgressState, result: Option<Arc<HostResult>>) {
        debug!(host = %self.host.name, %state, "Progress");
        let _ = self.progress.send(ProgressMessage {
            host: Arc::clone(&self.host),
            state,
            result,
        });
    }

    async fn run(self) -> Option<Arc<HostResult>> {
        let _permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok()?,
            _ = self.token.cancelled() => return None,
        };
        if self.token.is_cancelled() {
            return None;
        }

        if !self.splay.is_zero() {
            self.report(ProgressState::Waiting, None);
            splay_delay(self.splay, &self.token).await;
        }

        self.running[self.index].store(true, Ordering::Release);
        self.report(ProgressState::Running, None);

        let host_token = self.token.child_token();
        let ctx = ExecContext::new(host_token.clone(), self.host_timeout);
        let started_at = Utc::now();
        let execution = self
            .executor
            .run(ctx, &self.host, &self.command, self.output.clone());

        let mut result = match tokio::time::timeout(self.host_timeout, execution).await {
            Ok(result) => result,
            Err(_) => {
                host_token.cancel();
                debug!(host = %self.host.name, "Host timed out");
                HostResult::infra(self.host.name.clone(), HostError::Timeout(self.host_timeout))
                    .with_timing(started_at, Utc::now())
            }
        };
        result.host.clone_from(&self.host.name);
        result.index = self.index;

        let result = Arc::new(result);
        self.host.set_last_result(Arc::clone(&result));
        self.report(ProgressState::Finished, Some(Arc::clone(&result)));
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Host;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn run(
            &self,
            _ctx: ExecContext,
            host: &Arc<Host>,
            _command: &str,
            _output: Option<OutputSink>,
        ) -> HostResult {
            HostResult::new(host.name.clone(), 0)
        }

        fn set_connect_timeout(&self, _timeout: Duration) {}

        fn connect_timeout(&self) -> Duration {
            Duration::from_secs(3)
        }
    }

    fn hosts(n: usize) -> HostSet {
        (0..n).map(|i| Host::named(format!("host{i}"))).collect()
    }

    #[test]
    fn test_effective_parallelism() {
        let mut runner = Runner::new(hosts(7), None);
        assert_eq!(runner.effective_parallelism(), 7);
        runner.set_parallel(-3);
        assert_eq!(runner.effective_parallelism(), 7);
        runner.set_parallel(2);
        assert_eq!(runner.effective_parallelism(), 2);
    }

    #[test]
    fn test_effective_parallelism_is_capped_at_host_count() {
        let mut runner = Runner::new(hosts(7), None);
        runner.set_parallel(100);
        assert_eq!(runner.effective_parallelism(), 7);
        runner.set_parallel(i64::MAX);
        assert_eq!(runner.effective_parallelism(), 7);
    }

    #[test]
    fn test_settings() {
        let mut runner = Runner::new(hosts(1), Some(Arc::new(Echo)));
        runner.set_parallel(5);
        runner.set_splay(Duration::from_millis(500));
        let (name, settings) = runner.settings();
        assert_eq!(name, "Runner");
        assert_eq!(settings["Parallel"], "5");
        assert_eq!(settings["Splay"], "500ms");
        assert_eq!(settings["Timeout"], "1m");
        assert_eq!(settings["HostTimeout"], "10s");
        assert_eq!(settings["ConnectTimeout"], "3s");
    }

    #[test]
    fn test_config_from_toml() {
        let config: RunnerConfig = toml::from_str(
            r#"
            parallel = 4
            splay = "2s"
            host_timeout = "30s"
            sort = ["exitstatus", "name"]
            "#,
        )
        .unwrap();
        assert_eq!(config.parallel, 4);
        assert_eq!(config.splay, Duration::from_secs(2));
        assert_eq!(config.host_timeout, Duration::from_secs(30));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.sort, vec![SortKey::ExitStatus, SortKey::Name]);

        let runner = Runner::from_config(hosts(2), None, &config);
        assert!(runner.hosts().has_result_keys());
        assert_eq!(runner.effective_parallelism(), 2);
    }

    #[tokio::test]
    async fn test_run_requires_executor() {
        let mut runner = Runner::new(hosts(2), None);
        let err = runner.run("true", None, None).await.unwrap_err();
        assert_eq!(err, ExecutorError::NoExecutor);
    }

    #[tokio::test]
    async fn test_run_requires_hosts() {
        let mut runner = Runner::new(HostSet::new(), Some(Arc::new(Echo)));
        let err = runner.run("true", None, None).await.unwrap_err();
        assert_eq!(err, ExecutorError::NoHosts);
    }

    #[tokio::test]
    async fn test_splay_delay_returns_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let start = std::time::Instant::now();
        splay_delay(Duration::from_secs(3600), &token).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_without_progress_sink() {
        let mut runner = Runner::new(hosts(3), Some(Arc::new(Echo)));
        let item = runner
            .run_until("true", None, None, std::future::pending())
            .await
            .unwrap();
        assert_eq!(item.summary.ok, 3);
        assert!(item.ended_at.is_some());
    }
}
