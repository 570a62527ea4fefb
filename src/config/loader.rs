//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::ClientConfig;

/// Directory holding the config file, relative to the cwd or home directory.
pub const CONFIG_DIR: &str = ".aider-mcp-client";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: ./.aider-mcp-client/config.json
        search_paths.push(PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        // 2. Home directory: ~/.aider-mcp-client/config.json
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(CONFIG_DIR).join(CONFIG_FILE));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Create a config loader over an explicit list of paths.
    #[must_use]
    pub fn with_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load configuration from the first usable file, or return defaults.
    ///
    /// A file that exists but cannot be read or parsed is skipped with a
    /// warning and the next location is tried.
    #[must_use]
    pub fn load(&self) -> ClientConfig {
        for path in self.search_paths.iter().filter(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "Loading config file");
            match Self::load_from_path(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(error = %e, "Skipping config file"),
            }
        }

        tracing::info!("No config file found. Using default Context7 server configuration.");
        ClientConfig::default()
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}
