//! Configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the server used when none is requested.
pub const DEFAULT_SERVER: &str = "context7";

/// How to launch one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable to run.
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Response timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whether the server is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_command() -> String {
    "npx".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-y".to_string(), "@upstash/context7-mcp@latest".to_string()]
}

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout: default_timeout(),
            enabled: default_enabled(),
        }
    }
}

impl ServerConfig {
    /// Effective timeout: `override_secs` if given, otherwise the configured one.
    ///
    /// Zero means "not set" and falls through to the default.
    #[must_use]
    pub fn timeout(&self, override_secs: Option<u64>) -> Duration {
        let secs = override_secs
            .filter(|&secs| secs > 0)
            .or(Some(self.timeout).filter(|&secs| secs > 0))
            .unwrap_or_else(default_timeout);
        Duration::from_secs(secs)
    }
}

/// Top-level client configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Servers keyed by name.
    #[serde(rename = "mcpServers", default = "default_servers")]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

fn default_servers() -> BTreeMap<String, ServerConfig> {
    BTreeMap::from([(DEFAULT_SERVER.to_string(), ServerConfig::default())])
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mcp_servers: default_servers(),
        }
    }
}

impl ClientConfig {
    /// Config for `name`, falling back to the Context7 defaults.
    #[must_use]
    pub fn server(&self, name: &str) -> ServerConfig {
        if let Some(server) = self.mcp_servers.get(name) {
            return server.clone();
        }
        tracing::debug!(server = %name, "Server not configured, using defaults");
        ServerConfig::default()
    }
}
