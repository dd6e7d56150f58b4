//! Local executor
//!
//! Runs each host's command through `sh -c` on the control node. Useful for
//! tests, dry runs and for driving per-host scripts that do their own
//! remoting (the host name is exported as `HERD_HOST`).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    ExecContext, Executor, HostError, HostResult, OutputLine, OutputSink, OutputStream,
    INFRA_EXIT_STATUS,
};
use crate::connection::{Connection, LocalSession};
use crate::inventory::Host;

const DEFAULT_SHELL: &str = "sh";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Executor that runs commands on the local machine
#[derive(Debug)]
pub struct LocalExecutor {
    shell: String,
    connect_timeout: RwLock<Duration>,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            connect_timeout: RwLock::new(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Use a different POSIX shell (invoked as `<shell> -c <command>`)
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Reuse the host's session if it is alive, otherwise open a new one
    async fn ensure_session(&self, host: &Host) {
        if let Some(existing) = host.connection() {
            if existing.is_alive().await {
                return;
            }
        }
        trace!(host = %host.name, "Opening local session");
        host.set_connection(Arc::new(LocalSession::new(host.name.clone())));
    }

    fn build_command(&self, host: &Host, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env("HERD_HOST", &host.name)
            .env("HERD_ADDRESS", host.address())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn run(
        &self,
        ctx: ExecContext,
        host: &Arc<Host>,
        command: &str,
        output: Option<OutputSink>,
    ) -> HostResult {
        let started_at = Utc::now();
        let infra = |error: HostError| {
            HostResult::infra(host.name.clone(), error).with_timing(started_at, Utc::now())
        };

        if ctx.is_cancelled() {
            return infra(HostError::Cancelled { started: true });
        }

        let connect_timeout = self.connect_timeout();
        let spawned = tokio::time::timeout(connect_timeout, async {
            self.ensure_session(host).await;
            self.build_command(host, command).spawn()
        })
        .await;

        let mut child = match spawned {
            Ok(Ok(child)) => child,
            Ok(Err(e)) => return infra(HostError::Spawn(e.to_string())),
            Err(_) => return infra(HostError::ConnectTimeout(connect_timeout)),
        };
        debug!(host = %host.name, pid = ?child.id(), "Command started");

        let stdout = pump(
            child.stdout.take(),
            Arc::clone(host),
            OutputStream::Stdout,
            output.clone(),
        );
        let stderr = pump(
            child.stderr.take(),
            Arc::clone(host),
            OutputStream::Stderr,
            output,
        );

        // Dropping this future kills the child (kill_on_drop)
        let execution = async move {
            let (stdout, stderr) = tokio::join!(stdout, stderr);
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let (stdout, stderr, status) = tokio::select! {
            done = execution => done,
            _ = ctx.token.cancelled() => {
                debug!(host = %host.name, "Cancelled, killing command");
                return infra(HostError::Cancelled { started: true });
            }
        };

        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => return infra(HostError::Io(e.to_string())),
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return infra(HostError::Io(e.to_string())),
        };

        let result = match status.code() {
            Some(code) => HostResult::new(host.name.clone(), code),
            None => HostResult::new(host.name.clone(), INFRA_EXIT_STATUS)
                .with_error(HostError::Io(format!("command {status}"))),
        };
        trace!(host = %host.name, exit_status = result.exit_status, "Command completed");
        result
            .with_output(stdout, stderr)
            .with_timing(started_at, Utc::now())
    }

    fn set_connect_timeout(&self, timeout: Duration) {
        *self.connect_timeout.write() = timeout;
    }

    fn connect_timeout(&self) -> Duration {
        *self.connect_timeout.read()
    }
}

/// Forward each line of `reader` to `sink` as it arrives and return everything read
async fn pump<R>(
    reader: Option<R>,
    host: Arc<Host>,
    stream: OutputStream,
    sink: Option<OutputSink>,
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        captured.extend_from_slice(&line);
        if let Some(sink) = &sink {
            let _ = sink.send(OutputLine {
                host: Arc::clone(&host),
                stream,
                data: line.clone(),
            });
        }
    }
    Ok(captured)
}
