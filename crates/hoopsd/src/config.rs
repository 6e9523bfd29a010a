//! Relay configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `HOOPS_*` environment variables. The daemon binary applies CLI flags last
//! and calls [`RelayConfig::validate`] before binding.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 5634
//! write_timeout_ms = 2000
//! shutdown_timeout_ms = 5000
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use hoops_protocol::DEFAULT_PORT;

use crate::hub::DEFAULT_DISPATCH_BUFFER;
use crate::registry::DEFAULT_MAX_CONNECTIONS;

/// Environment variable overriding the bind host.
pub const ENV_HOST: &str = "HOOPS_HOST";
/// Environment variable overriding the bind port.
pub const ENV_PORT: &str = "HOOPS_PORT";
/// Environment variable overriding the per-send timeout in milliseconds.
pub const ENV_WRITE_TIMEOUT_MS: &str = "HOOPS_WRITE_TIMEOUT_MS";

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for delivering one frame to one connection
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Upper bound for draining a closing connection
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Frames queued per connection before sends start waiting
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Notifications queued ahead of the hub dispatcher
    #[serde(default = "default_dispatch_buffer")]
    pub dispatch_buffer: usize,

    /// Maximum number of registered connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Inbound frames larger than this are dropped
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl RelayConfig {
    /// Loads configuration from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; the default path is optional. Environment
    /// overrides are applied on top, but validation is left to the caller so
    /// CLI flags can still be layered.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Reads a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses TOML; missing fields take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Returns `<config dir>/hoops/relay.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hoops").join("relay.toml"))
    }

    /// Applies `HOOPS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = parse_env(ENV_PORT, &port)?;
        }
        if let Some(ms) = lookup(ENV_WRITE_TIMEOUT_MS) {
            self.write_timeout_ms = parse_env(ENV_WRITE_TIMEOUT_MS, &ms)?;
        }
        Ok(())
    }

    /// Host and port in the form accepted by `TcpListener::bind`.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate relay configuration
    ///
    /// Port 0 is rejected here; tests that need an ephemeral port build the
    /// config directly and skip validation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.write_timeout_ms == 0 {
            return Err(ValidationError::ZeroValue("write_timeout_ms"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ValidationError::ZeroValue("shutdown_timeout_ms"));
        }
        if self.outbound_buffer == 0 {
            return Err(ValidationError::ZeroValue("outbound_buffer"));
        }
        if self.dispatch_buffer == 0 {
            return Err(ValidationError::ZeroValue("dispatch_buffer"));
        }
        if self.max_connections == 0 {
            return Err(ValidationError::ZeroValue("max_connections"));
        }
        if self.max_message_size == 0 {
            return Err(ValidationError::ZeroValue("max_message_size"));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            write_timeout_ms: default_write_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
            dispatch_buffer: default_dispatch_buffer(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_write_timeout_ms() -> u64 {
    2_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_dispatch_buffer() -> usize {
    DEFAULT_DISPATCH_BUFFER
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_max_message_size() -> usize {
    64 * 1024
}

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}
