//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Environment variable overriding [`SyncConfig::database_path`].
pub const ENV_DATABASE: &str = "TICTACTOE_DB";
/// Environment variable overriding [`SyncConfig::identity_path`].
pub const ENV_IDENTITY: &str = "TICTACTOE_IDENTITY";
/// Environment variable overriding [`SyncConfig::poll_interval_ms`].
pub const ENV_POLL_MS: &str = "TICTACTOE_POLL_MS";

/// Settings for a client process.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct SyncConfig {
    /// SQLite database holding the shared game records.
    #[serde(default = "default_database_path")]
    database_path: String,

    /// File storing this client's anonymous identity.
    #[serde(default = "default_identity_path")]
    identity_path: PathBuf,

    /// How often a subscription re-reads the record, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,

    /// Tracing filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    log_filter: String,
}

fn default_database_path() -> String {
    "tictactoe.db".to_string()
}

fn default_identity_path() -> PathBuf {
    PathBuf::from(".tictactoe_identity")
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            identity_path: default_identity_path(),
            poll_interval_ms: default_poll_interval_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the effective configuration.
    ///
    /// Starts from `path` if given (defaults otherwise), then applies
    /// environment overrides. A `.env` file is honoured if present.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        info!(database = %config.database_path, poll_ms = config.poll_interval_ms, "Config resolved");
        Ok(config)
    }

    /// Applies overrides looked up through `lookup` (normally the environment).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = db;
        }
        if let Some(identity) = lookup(ENV_IDENTITY) {
            self.identity_path = PathBuf::from(identity);
        }
        if let Some(poll) = lookup(ENV_POLL_MS) {
            self.poll_interval_ms = poll
                .parse()
                .map_err(|e| ConfigError::new(format!("Invalid {}: {}", ENV_POLL_MS, e)))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::new("poll_interval_ms must be positive".to_string()));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::new("database_path must not be empty".to_string()));
        }
        if is_in_memory_database(&self.database_path) {
            return Err(ConfigError::new(format!(
                "database_path {} names an in-memory database, which is not shared between connections",
                self.database_path
            )));
        }
        Ok(())
    }
}

/// True for SQLite paths that open a private in-memory database.
pub(crate) fn is_in_memory_database(path: &str) -> bool {
    let path = path.trim();
    path == ":memory:" || path.starts_with("file::memory:") || path.contains("mode=memory")
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
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
