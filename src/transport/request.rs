//! Tool invocation requests written to the server's stdin.

use serde::Serialize;
use serde_json::{Map, Value};

/// Error type for request encoding.
#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    /// Tool name was empty.
    #[error("Tool name must not be empty")]
    EmptyToolName,
    /// Arguments could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A single tool invocation: `{"tool": ..., "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRequest {
    tool: String,
    args: Map<String, Value>,
}

impl ToolRequest {
    /// Create a request for `tool` with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::EmptyToolName` if `tool` is empty.
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Result<Self, EncodingError> {
        let tool = tool.into();
        if tool.trim().is_empty() {
            return Err(EncodingError::EmptyToolName);
        }
        Ok(Self { tool, args })
    }

    /// Build a request from any serializable argument struct.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the tool name is empty or `args` does not
    /// serialize to a JSON object.
    pub fn from_args<A: Serialize>(tool: impl Into<String>, args: &A) -> Result<Self, EncodingError> {
        let args = match serde_json::to_value(args)? {
            Value::Object(map) => map,
            other => {
                return Err(EncodingError::Serialize(serde::ser::Error::custom(format!(
                    "tool arguments must be a JSON object, got {other}"
                ))))
            }
        };
        Self::new(tool, args)
    }

    /// Tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Tool arguments.
    #[must_use]
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Serialize to a single JSON line terminated by `\n`.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::Serialize` if serialization fails.
    pub fn encode(&self) -> Result<String, EncodingError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
