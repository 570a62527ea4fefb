//! MCP server process spawning and teardown.
//!
//! A [`ServerProcess`] owns exactly one child for one request/response
//! exchange. Stderr is consumed by a background task from the moment of
//! spawn, which lets the reader wait for the startup banner and lets the
//! reaper hand back diagnostics once the child is gone.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Stderr line Context7 prints once it is ready to accept requests.
pub const STARTUP_BANNER: &str = "Context7 Documentation MCP Server running on stdio";

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the stderr collector after the child is gone.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The server executable was not found.
    #[error("MCP server command not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied running MCP server command: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(command: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(command.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Stderr text and exit status gathered after the child has been reaped.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Everything the child wrote to stderr.
    pub stderr: String,
    /// Exit status, if the child could be waited on.
    pub exit_status: Option<ExitStatus>,
}

impl Diagnostics {
    /// Stderr lines other than the benign startup banner.
    pub fn error_lines(&self) -> impl Iterator<Item = &str> {
        self.stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains(STARTUP_BANNER))
    }

    /// Returns true if stderr carried anything besides the startup banner.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_lines().next().is_some()
    }

    /// Returns true if the startup banner was the only thing on stderr.
    #[must_use]
    pub fn banner_only(&self) -> bool {
        self.stderr.contains(STARTUP_BANNER) && !self.has_errors()
    }

    /// Log stderr content: the banner at debug level, anything else as a warning.
    pub fn log(&self) {
        if self.stderr.trim().is_empty() {
            return;
        }
        if self.has_errors() {
            let errors: Vec<&str> = self.error_lines().collect();
            tracing::warn!(stderr = %errors.join("\n"), "MCP server reported errors");
        } else {
            tracing::debug!(stderr = %self.stderr.trim(), "Server startup message (already handled)");
        }
    }
}

/// Background reader that owns the child's stderr.
#[derive(Debug)]
struct StderrCollector {
    banner_rx: Option<oneshot::Receiver<()>>,
    task: JoinHandle<String>,
}

impl StderrCollector {
    fn spawn(stderr: tokio::process::ChildStderr) -> Self {
        let (banner_tx, banner_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut banner_tx = Some(banner_tx);
            let mut collected = String::new();
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();

            // Keep draining until EOF, whatever the bytes look like.
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed reading server stderr");
                        break;
                    }
                }
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.contains(STARTUP_BANNER) {
                    if let Some(tx) = banner_tx.take() {
                        let _ = tx.send(());
                    }
                }
                collected.push_str(line);
                collected.push('\n');
            }

            collected
        });

        Self {
            banner_rx: Some(banner_rx),
            task,
        }
    }
}

/// A running MCP server process.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    stderr: Option<StderrCollector>,
}

impl ServerProcess {
    /// Spawn `command` with `args`, piping stdin, stdout and stderr.
    ///
    /// The child is killed if the handle is dropped without being reaped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, SpawnError> {
        tracing::debug!(command = %command, args = ?args, "Starting MCP server process");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpawnError::from_io(command, e))?;

        let stderr = child.stderr.take().map(StderrCollector::spawn);

        Ok(Self { child, stderr })
    }

    /// Take ownership of the stdin handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Returns true once the child has exited (or can no longer be queried).
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.try_wait(), Ok(None))
    }

    /// Wait up to `timeout` for the startup banner on stderr.
    ///
    /// Returns false if the banner did not show up in time or stderr closed
    /// first. Only the first call can observe the banner.
    pub async fn wait_for_banner(&mut self, timeout: Duration) -> bool {
        let Some(rx) = self.stderr.as_mut().and_then(|c| c.banner_rx.take()) else {
            return false;
        };
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Already reaped
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(pid, "Process did not terminate gracefully, killing");
                self.child.kill().await
            }
        }
    }

    /// Tear the child down and collect its stderr.
    ///
    /// A child that already exited is only waited on; otherwise it gets
    /// SIGTERM, `grace` to exit, then SIGKILL. Never fails: termination
    /// problems are logged and the diagnostics are returned regardless.
    pub async fn reap(mut self, grace: Duration) -> Diagnostics {
        tracing::debug!(pid = ?self.id(), "Terminating MCP server process");

        if !self.has_exited() {
            if let Err(e) = self.graceful_terminate(grace).await {
                tracing::warn!(error = %e, "Failed to terminate MCP server process");
            }
        }

        let exit_status = match self.child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to wait on MCP server process");
                None
            }
        };

        let stderr = match self.stderr.take() {
            Some(collector) => drain_stderr(collector).await,
            None => String::new(),
        };

        Diagnostics {
            stderr,
            exit_status,
        }
    }
}

async fn drain_stderr(collector: StderrCollector) -> String {
    let mut task = collector.task;
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Stderr collector failed");
            String::new()
        }
        Err(_) => {
            // Something else still holds the pipe open
            tracing::debug!("Stderr still open after exit, giving up on it");
            task.abort();
            String::new()
        }
    }
}
