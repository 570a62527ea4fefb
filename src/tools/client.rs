//! Library name resolution and documentation fetching.

use std::time::Duration;

use serde::Serialize;

use crate::config::ServerConfig;
use crate::transport::{BridgeError, StdioTransport, ToolRequest, ToolTransport};

use super::{NormalizedDocBundle, RawToolResult};

/// Tool that maps a library name to a Context7-compatible ID.
pub const RESOLVE_TOOL: &str = "resolve-library-id";

/// Tool that returns documentation for a library ID.
pub const DOCS_TOOL: &str = "get-library-docs";

/// Smallest token budget ever requested from the server.
pub const MIN_TOKENS: u32 = 5000;

/// Separator that marks a string as an already-resolved identifier.
const ID_SEPARATOR: char = '/';

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveArgs<'a> {
    library_name: &'a str,
}

#[derive(Serialize)]
struct DocsArgs<'a> {
    #[serde(rename = "context7CompatibleLibraryID")]
    library_id: &'a str,
    topic: &'a str,
    tokens: u32,
}

/// Returns true if `input` already looks like `org/library`.
#[must_use]
pub fn is_library_id(input: &str) -> bool {
    input.contains(ID_SEPARATOR)
}

/// Strip a trailing `.js` so `next.js` resolves like `next`.
#[must_use]
pub fn normalize_library_name(name: &str) -> &str {
    match name.strip_suffix(".js") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}

/// Client for the two documentation tools.
#[derive(Debug, Clone)]
pub struct DocsClient<T> {
    transport: T,
    timeout: Duration,
}

impl DocsClient<StdioTransport> {
    /// Client for a configured server, with an optional timeout override in seconds.
    #[must_use]
    pub fn from_config(config: &ServerConfig, timeout_override: Option<u64>) -> Self {
        Self::new(
            StdioTransport::from_config(config),
            config.timeout(timeout_override),
        )
    }
}

impl<T: ToolTransport> DocsClient<T> {
    #[must_use]
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve a library name to a canonical identifier.
    ///
    /// Returns `Ok(None)` when the server gives no usable answer.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` if the server cannot be started or the request
    /// cannot be encoded.
    pub async fn resolve_name(&self, library_name: &str) -> Result<Option<String>, BridgeError> {
        let name = normalize_library_name(library_name);
        if name != library_name {
            tracing::info!(from = %library_name, to = %name, "Normalized library name");
        }

        tracing::info!(
            "Using timeout of {} seconds for resolution",
            self.timeout.as_secs()
        );

        let request = ToolRequest::from_args(RESOLVE_TOOL, &ResolveArgs { library_name: name })?;
        let outcome = self.transport.call(&request, self.timeout).await?;

        let Some(response) = outcome.into_response() else {
            tracing::error!(library = %library_name, "No response received when resolving library ID");
            return Ok(None);
        };

        let id = RawToolResult::from(response.clone()).library_id();
        if id.is_none() {
            tracing::error!(library = %library_name, "Invalid response format when resolving library ID");
            tracing::debug!(response = %response, "Unexpected resolve response");
        }
        Ok(id)
    }

    /// Fetch documentation for a library ID or name.
    ///
    /// Names without a `/` are resolved first; if that fails the original
    /// input is used as-is. `tokens` is raised to [`MIN_TOKENS`].
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` if the server cannot be started or the request
    /// cannot be encoded.
    pub async fn fetch_docs(
        &self,
        library: &str,
        topic: &str,
        tokens: u32,
    ) -> Result<Option<NormalizedDocBundle>, BridgeError> {
        let library_id = self.resolve_if_needed(library).await;
        let tokens = tokens.max(MIN_TOKENS);

        if topic.is_empty() {
            tracing::info!(library = %library_id, "Fetching documentation");
        } else {
            tracing::info!(library = %library_id, topic = %topic, "Fetching documentation");
        }

        let request = ToolRequest::from_args(
            DOCS_TOOL,
            &DocsArgs {
                library_id: &library_id,
                topic,
                tokens,
            },
        )?;

        let outcome = self.transport.call(&request, self.timeout).await?;
        match outcome.into_response() {
            Some(response) => Ok(Some(NormalizedDocBundle::from(response))),
            None => {
                tracing::error!("No valid response received from the server");
                Ok(None)
            }
        }
    }

    async fn resolve_if_needed(&self, library: &str) -> String {
        if is_library_id(library) {
            return library.to_string();
        }

        tracing::info!(library = %library, "Resolving library ID");
        match self.resolve_name(library).await {
            Ok(Some(id)) => {
                tracing::info!(library = %library, id = %id, "Resolved library ID");
                id
            }
            Ok(None) => {
                tracing::warn!(library = %library, "Could not resolve library ID. Using original");
                library.to_string()
            }
            Err(e) => {
                tracing::warn!(library = %library, error = %e, "Error resolving library ID. Using original");
                library.to_string()
            }
        }
    }
}
