//! Server configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`, `PARLEY_CONFIG`, or
//!    `<config_dir>/parley/parleyd.toml` when present)
//! 3. `PARLEY_HOST` / `PARLEY_PORT` environment variables
//! 4. Command-line flags (applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use parley_protocol::{DEFAULT_PORT, MAX_LINE_LENGTH};

/// Environment variable overriding the bind host.
pub const HOST_ENV: &str = "PARLEY_HOST";

/// Environment variable overriding the listening port.
pub const PORT_ENV: &str = "PARLEY_PORT";

/// Default bind host (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default number of concurrent participants.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 50;

/// Static configuration for a chat server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Concurrent session capacity; further connections wait at accept
    pub max_participants: usize,

    /// Longest accepted line in bytes, terminator included
    pub max_line_length: usize,

    /// Per-line socket write timeout
    pub write_timeout_secs: u64,

    /// Depth of each connection's outbound queue
    pub outbound_buffer: usize,

    /// How long shutdown waits for in-flight sessions
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            max_line_length: MAX_LINE_LENGTH,
            write_timeout_secs: 10,
            outbound_buffer: 256,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a file (if any) and the process environment.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used only when a file is present there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = Self::from_toml_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parses configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies `PARLEY_HOST` / `PARLEY_PORT` overrides using `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV) {
            self.host = host;
        }

        if let Some(value) = lookup(PORT_ENV) {
            self.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: PORT_ENV,
                value,
            })?;
        }

        Ok(())
    }

    /// Rejects values that would leave the server unable to serve anyone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_participants == 0 {
            return Err(ConfigError::Invalid(
                "max_participants must be at least 1".to_string(),
            ));
        }
        if self.max_participants > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_participants must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be at least 1".to_string(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "outbound_buffer must be at least 1".to_string(),
            ));
        }
        // Bounded mpsc channels are backed by a semaphore of the same size.
        if self.outbound_buffer > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "outbound_buffer must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }

    /// Returns `host:port` for display and binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Returns `<config_dir>/parley/parleyd.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parley").join("parleyd.toml"))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
