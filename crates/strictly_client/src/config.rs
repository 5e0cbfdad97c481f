//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Environment variable overriding [`ClientConfig::server_url`].
pub const SERVER_URL_VAR: &str = "STRICTLY_SERVER_URL";
/// Environment variable overriding [`ClientConfig::token_path`].
pub const TOKEN_PATH_VAR: &str = "STRICTLY_TOKEN_PATH";

/// Settings for the sync engine and CLI.
///
/// Poll periods are in milliseconds; 0 disables polling.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL, without the `/api` prefix.
    server_url: String,
    /// File holding the persisted session token.
    token_path: PathBuf,
    /// Game view poll period.
    game_poll_ms: u64,
    /// Lobby poll period.
    lobby_poll_ms: u64,
    /// Per-request timeout.
    request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            token_path: PathBuf::from(".strictly_token"),
            game_poll_ms: 2000,
            lobby_poll_ms: 5000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(server_url = %config.server_url, "Config loaded");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Loads `path` if given, else defaults, then applies the environment.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    /// Applies [`SERVER_URL_VAR`] and [`TOKEN_PATH_VAR`] if set.
    pub fn with_env(self) -> Self {
        self.with_overrides(
            std::env::var(SERVER_URL_VAR).ok(),
            std::env::var(TOKEN_PATH_VAR).ok().map(PathBuf::from),
        )
    }

    /// Replaces the server URL and token path where given. Blank values
    /// are ignored.
    pub fn with_overrides(mut self, server_url: Option<String>, token_path: Option<PathBuf>) -> Self {
        if let Some(url) = server_url.filter(|url| !url.trim().is_empty()) {
            debug!(%url, "Server URL overridden");
            self.server_url = url.trim().to_string();
        }
        if let Some(path) = token_path.filter(|path| !path.as_os_str().is_empty()) {
            debug!(path = %path.display(), "Token path overridden");
            self.token_path = path;
        }
        self
    }

    /// Game view poll period, `None` when disabled.
    pub fn game_interval(&self) -> Option<Duration> {
        poll_interval(self.game_poll_ms)
    }

    /// Lobby poll period, `None` when disabled.
    pub fn lobby_interval(&self) -> Option<Duration> {
        poll_interval(self.lobby_poll_ms)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Converts a millisecond period to a poll interval; 0 means disabled.
pub fn poll_interval(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
