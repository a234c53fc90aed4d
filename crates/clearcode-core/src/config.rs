//! Configuration for clearcode.
//!
//! Loaded from `clearcode.yml` in the workspace root. Every field is optional;
//! an empty file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::report::RetryPolicy;

/// Default config file name, looked up in the workspace root.
pub const DEFAULT_CONFIG_FILE: &str = "clearcode.yml";

/// Environment variable that replaces `server.base_url`.
pub const SERVER_URL_ENV: &str = "CLEARCODE_SERVER_URL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearcodeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub flush: FlushConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub bindings: BindingsConfig,
}

/// Collector endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL; API paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Seconds between flush cycles.
    #[serde(default = "default_flush_interval")]
    pub interval_seconds: u64,
}

fn default_flush_interval() -> u64 {
    60
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_flush_interval(),
        }
    }
}

/// Limits for external `git`/`gh` queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,
}

fn default_command_timeout() -> u64 {
    5
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_command_timeout(),
        }
    }
}

/// Report queue and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per payload. 1 means no retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> u64 {
    500
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingsConfig {
    /// Bindings file; relative paths resolve against the workspace root.
    #[serde(default = "default_bindings_path")]
    pub path: PathBuf,
}

fn default_bindings_path() -> PathBuf {
    PathBuf::from(".clearcode/bindings.json")
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            path: default_bindings_path(),
        }
    }
}

impl ClearcodeConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        Self::parse_yaml(&content)
    }

    /// Parses configuration from a YAML string.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty or comment-only document parses as null, not an empty map.
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_value(value)?;
        debug!(
            base_url = %config.server.base_url,
            flush_interval = config.flush.interval_seconds,
            max_attempts = config.delivery.max_attempts,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(SERVER_URL_ENV)
            && !url.trim().is_empty()
        {
            debug!(env = SERVER_URL_ENV, value = %url, "Overriding server.base_url");
            self.server.base_url = url.trim().to_string();
        }
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.server.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "server.base_url".to_string(),
                reason: format!("expected an http:// or https:// URL, got '{base_url}'"),
            });
        }
        let positive = [
            ("server.request_timeout_seconds", self.server.request_timeout_seconds),
            ("flush.interval_seconds", self.flush.interval_seconds),
            ("commands.timeout_seconds", self.commands.timeout_seconds),
            ("delivery.max_attempts", u64::from(self.delivery.max_attempts)),
            ("delivery.queue_capacity", self.delivery.queue_capacity as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.commands.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.delivery.max_attempts,
            initial_backoff: Duration::from_millis(self.delivery.initial_backoff_ms),
        }
    }

    /// Bindings file location for `workspace_root`.
    pub fn bindings_path(&self, workspace_root: &Path) -> PathBuf {
        if self.bindings.path.is_absolute() {
            self.bindings.path.clone()
        } else {
            workspace_root.join(&self.bindings.path)
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}
