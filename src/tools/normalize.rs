//! Shaping raw tool results into the output envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw tool result, as handed up by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RawToolResult {
    /// A JSON object.
    Mapping(Map<String, Value>),
    /// A plain string.
    Text(String),
    /// Anything else (arrays, numbers, booleans, null).
    Opaque(Value),
}

impl From<Value> for RawToolResult {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Mapping(map),
            Value::String(text) => Self::Text(text),
            other => Self::Opaque(other),
        }
    }
}

impl RawToolResult {
    /// Re-read a text result as a mapping when it holds a JSON object.
    #[must_use]
    pub fn reparse_text(self) -> Self {
        match self {
            Self::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Self::Mapping(map),
                _ => Self::Text(text),
            },
            other => other,
        }
    }

    /// Extract the identifier from a `resolve-library-id` result.
    ///
    /// Accepts `{"result": "org/lib"}` and `{"result": {"libraryId": "org/lib"}}`.
    #[must_use]
    pub fn library_id(self) -> Option<String> {
        let Self::Mapping(map) = self.reparse_text() else {
            return None;
        };

        match map.get("result")? {
            Value::String(id) => Some(id.clone()),
            Value::Object(inner) => inner
                .get("libraryId")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Documentation envelope printed for Aider.
///
/// Always serializes all five fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDocBundle {
    pub content: String,
    pub library: String,
    pub snippets: Vec<String>,
    pub total_tokens: u64,
    pub last_updated: String,
}

impl NormalizedDocBundle {
    /// Normalize a `get-library-docs` result, defaulting missing fields.
    #[must_use]
    pub fn from_raw(raw: RawToolResult) -> Self {
        match raw.reparse_text() {
            RawToolResult::Mapping(map) => Self::from_mapping(map),
            RawToolResult::Text(text) => Self {
                content: text,
                ..Self::default()
            },
            RawToolResult::Opaque(value) => Self {
                content: pretty(&value),
                ..Self::default()
            },
        }
    }

    fn from_mapping(map: Map<String, Value>) -> Self {
        let content = match map.get("content") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(parts)) if parts.iter().any(|p| p.get("text").is_some()) => {
                text_parts(parts)
            }
            _ => pretty(&Value::Object(map.clone())),
        };

        let library = map
            .get("library")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let snippets = map
            .get("snippets")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total_tokens = map
            .get("totalTokens")
            .and_then(Value::as_u64)
            .unwrap_or_default();

        let last_updated = map
            .get("lastUpdated")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            content,
            library,
            snippets,
            total_tokens,
            last_updated,
        }
    }
}

impl From<Value> for NormalizedDocBundle {
    fn from(value: Value) -> Self {
        Self::from_raw(RawToolResult::from(value))
    }
}

/// Join the `text` fields of MCP content parts.
fn text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
