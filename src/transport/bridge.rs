//! One request, one child process, one response.
//!
//! [`communicate`] ties the launcher, reader and reaper together. The reaper
//! runs at a single point after the read future completes; the read path
//! reports failures as values, and `kill_on_drop` covers unwinding.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServerConfig;

use super::process::{Diagnostics, ServerProcess, SpawnError, DEFAULT_TERMINATE_TIMEOUT};
use super::reader::{deadline_after, read_response, StopReason, TransportOutcome};
use super::request::{EncodingError, ToolRequest};
use super::state::{ExchangeState, ExchangeStateMachine};

/// Failures that abort a bridge call before any exchange happens.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start MCP server: {0}")]
    Spawn(#[from] SpawnError),
    #[error("Failed to encode request: {0}")]
    Encoding(#[from] EncodingError),
}

/// Report of a completed bridge call.
#[derive(Debug)]
pub struct Exchange {
    pub outcome: TransportOutcome,
    pub diagnostics: Diagnostics,
    /// Process ID of the child that served the request.
    pub pid: Option<u32>,
    pub state: ExchangeState,
}

/// Spawn `command`, send `request`, and read the response within `timeout`.
///
/// The child is terminated and waited on before this returns.
///
/// # Errors
///
/// Returns `BridgeError` if the request cannot be encoded or the process
/// cannot be spawned. Every other failure is reported in the outcome.
pub async fn communicate(
    command: &str,
    args: &[String],
    request: &ToolRequest,
    timeout: Duration,
) -> Result<Exchange, BridgeError> {
    let mut machine = ExchangeStateMachine::new();
    let line = request.encode()?;

    machine.transition(ExchangeState::Spawning);
    let mut process = ServerProcess::spawn(command, args)?;
    let pid = process.id();
    let deadline = deadline_after(timeout);

    tracing::debug!(request = %line.trim_end(), "Sending request");
    machine.transition(ExchangeState::AwaitingResponse);
    let report = read_response(&mut process, &line, deadline).await;

    machine.transition(match report.stop {
        StopReason::Terminal => ExchangeState::Terminal,
        StopReason::Deadline => ExchangeState::TimedOut,
        StopReason::Exited => ExchangeState::ProcessExited,
        StopReason::Io(_) => ExchangeState::Failed,
    });

    machine.transition(ExchangeState::Reaping);
    let diagnostics = process.reap(DEFAULT_TERMINATE_TIMEOUT).await;
    diagnostics.log();
    machine.transition(ExchangeState::Done);

    let outcome = report.into_outcome();
    match &outcome {
        TransportOutcome::Success(_) => {}
        TransportOutcome::Timeout => {
            tracing::error!(
                tool = %request.tool(),
                timeout_secs = timeout.as_secs(),
                "No valid response received before timeout"
            );
        }
        TransportOutcome::NoResponse => {
            tracing::error!(tool = %request.tool(), "No valid response received");
        }
        TransportOutcome::TransportError(message) => {
            tracing::error!(tool = %request.tool(), error = %message, "Error communicating with MCP server");
        }
    }
    if !outcome.is_success() && diagnostics.banner_only() {
        tracing::warn!(
            "Only received startup message. The server might be working but not producing output. Check your request parameters."
        );
    }

    Ok(Exchange {
        outcome,
        diagnostics,
        pid,
        state: machine.state(),
    })
}

/// Sends a tool request somewhere and returns the transport outcome.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Run one request/response exchange.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` for spawn and encoding failures only.
    async fn call(
        &self,
        request: &ToolRequest,
        timeout: Duration,
    ) -> Result<TransportOutcome, BridgeError>;
}

/// Transport that spawns a fresh server process per request.
#[derive(Debug, Clone)]
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
}

impl StdioTransport {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn call(
        &self,
        request: &ToolRequest,
        timeout: Duration,
    ) -> Result<TransportOutcome, BridgeError> {
        let exchange = communicate(&self.command, &self.args, request, timeout).await?;
        Ok(exchange.outcome)
    }
}
