//! Streaming reader for newline-delimited JSON on the server's stdout.
//!
//! The server interleaves log objects, progress objects and the final payload
//! with no framing beyond newlines. The reader decodes every line it can,
//! skips what it cannot, and stops as soon as a line looks like a final
//! answer (see [`is_terminal`]), the process exits, or the deadline passes.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdout;
use tokio::time::{Instant, MissedTickBehavior};

use super::process::ServerProcess;

/// Interval between liveness checks while waiting for output.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the startup banner.
pub const STARTUP_WAIT: Duration = Duration::from_secs(5);

/// Upper bound on the final stdout drain after the process exits.
const FINAL_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 4096;

/// Characters of a line shown in debug logs.
const PREVIEW_LEN: usize = 100;

/// Stand-in for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `timeout` from now, clamped when it cannot be represented.
#[must_use]
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + timeout.min(FAR_FUTURE))
}

/// Result of one request/response exchange at the transport level.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The last JSON value decoded before the read loop stopped.
    Success(Value),
    /// The deadline passed without any decodable output.
    Timeout,
    /// The process finished without any decodable output.
    NoResponse,
    /// Reading from or writing to the process failed.
    TransportError(String),
}

impl TransportOutcome {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The response value, if any.
    #[must_use]
    pub fn into_response(self) -> Option<Value> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Returns true if a decoded value looks like the server's final answer.
#[must_use]
pub fn is_terminal(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key("result") || map.contains_key("library"))
}

/// Pick the response: the most recently decoded value wins.
#[must_use]
pub fn select_response(mut responses: Vec<Value>) -> Option<Value> {
    responses.pop()
}

/// Whether the reader should keep going after a batch of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminal,
}

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A terminal response was decoded.
    Terminal,
    /// The process exited or closed stdout.
    Exited,
    /// The deadline passed.
    Deadline,
    /// An I/O error on the process pipes.
    Io(String),
}

/// Splits raw stdout bytes into lines and decodes each line as JSON.
#[derive(Debug, Default)]
pub struct LineAccumulator {
    buffer: Vec<u8>,
    responses: Vec<Value>,
    malformed: usize,
}

impl LineAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every complete line in the buffer.
    ///
    /// Stops at the first terminal line; anything after it stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Flow {
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.decode_line(&line) == Flow::Terminal {
                return Flow::Terminal;
            }
        }

        Flow::Continue
    }

    /// Decode whatever is left in the buffer as a final, unterminated line.
    pub fn finish(&mut self) -> Flow {
        if self.buffer.is_empty() {
            return Flow::Continue;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest)
    }

    fn decode_line(&mut self, raw: &[u8]) -> Flow {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return Flow::Continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                tracing::debug!(json = %preview(line), "Parsed JSON line");
                let terminal = is_terminal(&value);
                self.responses.push(value);
                if terminal {
                    tracing::debug!("Received complete response");
                    Flow::Terminal
                } else {
                    Flow::Continue
                }
            }
            Err(e) => {
                self.malformed += 1;
                tracing::debug!(error = %e, line = %preview(line), "Skipping non-JSON line");
                Flow::Continue
            }
        }
    }

    /// Values decoded so far, in arrival order.
    #[must_use]
    pub fn responses(&self) -> &[Value] {
        &self.responses
    }

    /// Number of non-empty lines that failed to decode.
    #[must_use]
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    #[must_use]
    pub fn into_responses(self) -> Vec<Value> {
        self.responses
    }
}

fn preview(line: &str) -> String {
    if line.chars().count() <= PREVIEW_LEN {
        line.to_string()
    } else {
        let head: String = line.chars().take(PREVIEW_LEN).collect();
        format!("{head}...")
    }
}

/// Everything the read loop collected, plus why it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadReport {
    pub responses: Vec<Value>,
    pub stop: StopReason,
}

impl ReadReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            responses: Vec::new(),
            stop: StopReason::Io(message.into()),
        }
    }

    /// Collapse into a transport outcome.
    #[must_use]
    pub fn into_outcome(self) -> TransportOutcome {
        match select_response(self.responses) {
            Some(value) => TransportOutcome::Success(value),
            None => match self.stop {
                StopReason::Deadline => TransportOutcome::Timeout,
                StopReason::Io(message) => TransportOutcome::TransportError(message),
                StopReason::Terminal | StopReason::Exited => TransportOutcome::NoResponse,
            },
        }
    }
}

/// Read `stdout` until a terminal line, process exit, or `deadline`.
///
/// `has_exited` is polled every [`POLL_INTERVAL`], so exit is noticed even
/// when something else keeps the pipe open.
pub async fn read_until_terminal<R, F>(
    stdout: &mut R,
    mut has_exited: F,
    deadline: Instant,
) -> ReadReport
where
    R: AsyncRead + Unpin,
    F: FnMut() -> bool,
{
    let mut acc = LineAccumulator::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    let stop = loop {
        tokio::select! {
            biased;

            () = &mut expired => {
                tracing::debug!("Deadline reached while waiting for response");
                break StopReason::Deadline;
            }
            read = stdout.read(&mut chunk) => match read {
                Ok(0) => {
                    tracing::debug!("Server closed stdout");
                    break match acc.finish() {
                        Flow::Terminal => StopReason::Terminal,
                        Flow::Continue => StopReason::Exited,
                    };
                }
                Ok(n) => {
                    if acc.push(&chunk[..n]) == Flow::Terminal {
                        break StopReason::Terminal;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed reading server stdout");
                    break StopReason::Io(e.to_string());
                }
            },
            _ = ticker.tick() => {
                if has_exited() {
                    tracing::debug!("Process terminated");
                    break match drain_remaining(stdout, &mut acc).await {
                        Flow::Terminal => StopReason::Terminal,
                        Flow::Continue => StopReason::Exited,
                    };
                }
            }
        }
    };

    if acc.malformed_lines() > 0 {
        tracing::debug!(count = acc.malformed_lines(), "Skipped malformed lines");
    }

    ReadReport {
        responses: acc.into_responses(),
        stop,
    }
}

/// One bounded pass over whatever stdout still holds after exit.
async fn drain_remaining<R>(stdout: &mut R, acc: &mut LineAccumulator) -> Flow
where
    R: AsyncRead + Unpin,
{
    let drain_deadline = Instant::now() + FINAL_DRAIN_TIMEOUT;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match tokio::time::timeout_at(drain_deadline, stdout.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if acc.push(&chunk[..n]) == Flow::Terminal {
                    return Flow::Terminal;
                }
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Error draining stdout after exit");
                break;
            }
            Err(_) => {
                tracing::debug!("Stdout still open after exit, stopping drain");
                break;
            }
        }
    }

    acc.finish()
}

/// Send `request_line` to the server and read its response.
///
/// Stdin is closed after the request so servers that wait for EOF start
/// answering. The caller owns teardown: the process is left as-is.
pub async fn read_response(
    process: &mut ServerProcess,
    request_line: &str,
    deadline: Instant,
) -> ReadReport {
    match tokio::time::timeout_at(deadline, send_request(process, request_line)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!("Server closed stdin before reading the request");
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to send request to MCP server");
            return ReadReport::failed(format!("failed to send request: {e}"));
        }
        Err(_) => {
            tracing::warn!("Deadline reached while sending request");
            return ReadReport {
                responses: Vec::new(),
                stop: StopReason::Deadline,
            };
        }
    }

    let Some(stdout) = process.take_stdout() else {
        return ReadReport::failed("process stdout not available");
    };
    let mut stdout = BufReader::new(stdout);

    let banner_wait = STARTUP_WAIT.min(deadline.saturating_duration_since(Instant::now()));
    wait_for_startup(process, &mut stdout, banner_wait).await;

    read_until_terminal(&mut stdout, || process.has_exited(), deadline).await
}

/// Best-effort wait for the startup banner.
///
/// Output showing up on stdout first ends the wait; nothing is consumed.
async fn wait_for_startup(
    process: &mut ServerProcess,
    stdout: &mut BufReader<ChildStdout>,
    limit: Duration,
) {
    tokio::select! {
        seen = process.wait_for_banner(limit) => {
            if seen {
                tracing::info!("Server startup message detected");
            } else {
                tracing::warn!("No server startup message detected, proceeding anyway");
            }
        }
        _ = stdout.fill_buf() => {
            tracing::debug!("Output available before startup message");
        }
    }
}

async fn send_request(process: &mut ServerProcess, line: &str) -> std::io::Result<()> {
    let mut stdin = process.take_stdin().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "process stdin not available")
    })?;

    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    // Dropping stdin closes the pipe
    drop(stdin);
    Ok(())
}
