//! External process lifecycle.
//!
//! [`ExtractorProcess`] wraps a spawned child with the three operations the
//! pipeline needs: start it, wait for it under a wall-clock limit, and kill
//! it. Killing is unconditional (`SIGKILL` on unix) with no grace period.
//!
//! Standard output and error are drained on background tasks from the
//! moment the child starts, so a chatty process can never block on a full
//! pipe while the watchdog is waiting for it.

use std::io::Result as IoResult;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long to wait for the pipe readers once the child has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured result of a process that exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Time from spawn to exit.
    pub elapsed: Duration,
}

/// How a bounded wait ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The process exited before the limit.
    Exited(ProcessOutput),
    /// The limit elapsed and the process was killed.
    TimedOut {
        /// Time from spawn until the kill completed.
        elapsed: Duration,
    },
}

/// A running child process with captured output.
#[derive(Debug)]
pub struct ExtractorProcess {
    child: Child,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
    started: Instant,
}

impl ExtractorProcess {
    /// Spawn `command` with stdin closed and stdout/stderr captured.
    ///
    /// The child is killed if this value is dropped before it exits.
    pub fn start(mut command: Command) -> IoResult<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        Ok(Self {
            child,
            stdout,
            stderr,
            started: Instant::now(),
        })
    }

    /// OS process id, while the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit, killing it if `limit` elapses first.
    pub async fn wait_with_timeout(mut self, limit: Duration) -> IoResult<ProcessOutcome> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                let elapsed = self.started.elapsed();
                let stdout = collect(self.stdout).await;
                let stderr = collect(self.stderr).await;
                Ok(ProcessOutcome::Exited(ProcessOutput {
                    status,
                    stdout,
                    stderr,
                    elapsed,
                }))
            }
            Err(_) => {
                log::warn!(
                    "Process {:?} exceeded {limit:?}; killing it",
                    self.child.id()
                );
                self.force_terminate().await;
                self.stdout.abort();
                self.stderr.abort();
                Ok(ProcessOutcome::TimedOut {
                    elapsed: self.started.elapsed(),
                })
            }
        }
    }

    /// Kill the child immediately and reap it.
    pub async fn force_terminate(&mut self) {
        if let Err(error) = self.child.kill().await {
            log::warn!("Failed to kill process {:?}: {error}", self.child.id());
        }
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(error) = pipe.read_to_end(&mut buffer).await {
                log::debug!("Error reading process output: {error}");
            }
        }
        buffer
    })
}

async fn collect(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, handle).await {
        Ok(Ok(buffer)) => buffer,
        Ok(Err(error)) => {
            log::debug!("Output reader task failed: {error}");
            Vec::new()
        }
        Err(_) => Vec::new(),
    }
}
