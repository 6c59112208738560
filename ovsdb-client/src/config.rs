//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via OVSDB_CONFIG or --config)
//! 3. Environment variables

use ovsdb_core::{FieldPolicy, OPEN_VSWITCH_DB};
use ovsdb_protocol::{CodecConfig, DEFAULT_MAX_FRAME_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default capacity of the reader to worker queue.
pub const DEFAULT_WORKER_QUEUE: usize = 1024;

/// Default capacity of the connection event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest JSON-RPC document accepted, in bytes.
    pub max_frame_length: usize,
    /// Capacity of the queue between the read task and the worker.
    pub worker_queue: usize,
    /// Capacity of the broadcast channel behind `subscribe()`.
    pub event_capacity: usize,
    /// Handling of columns whose value fails to decode.
    pub field_policy: FieldPolicy,
    /// Database for updates whose monitor id was never registered.
    pub default_database: String,
    /// Seconds to wait for a call's response.
    pub request_timeout_secs: u64,
    /// Value codec settings.
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            worker_queue: DEFAULT_WORKER_QUEUE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            field_policy: FieldPolicy::SkipField,
            default_database: OPEN_VSWITCH_DB.to_string(),
            request_timeout_secs: 30,
            codec: CodecConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    ///
    /// `path` takes precedence over `OVSDB_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("OVSDB_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = lookup("OVSDB_MAX_FRAME_LENGTH").and_then(|v| v.parse().ok()) {
            self.max_frame_length = n;
        }

        if let Some(n) = lookup("OVSDB_WORKER_QUEUE").and_then(|v| v.parse().ok()) {
            self.worker_queue = n;
        }

        if let Some(n) = lookup("OVSDB_EVENT_CAPACITY").and_then(|v| v.parse().ok()) {
            self.event_capacity = n;
        }

        if let Some(policy) = lookup("OVSDB_FIELD_POLICY") {
            match policy.to_lowercase().as_str() {
                "skip_field" => self.field_policy = FieldPolicy::SkipField,
                "abort_message" => self.field_policy = FieldPolicy::AbortMessage,
                other => tracing::warn!("ignoring unknown OVSDB_FIELD_POLICY '{}'", other),
            }
        }

        if let Some(bare) = lookup("OVSDB_BARE_SINGLETON_SETS") {
            self.codec.bare_singleton_sets = bare == "1" || bare.to_lowercase() == "true";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_length == 0 {
            return Err(ConfigError::Validation(
                "max_frame_length must be greater than zero".into(),
            ));
        }
        if self.worker_queue == 0 {
            return Err(ConfigError::Validation(
                "worker_queue must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_capacity must be greater than zero".into(),
            ));
        }
        if self.codec.max_depth == 0 {
            return Err(ConfigError::Validation(
                "codec.max_depth must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, String),
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::Parse(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Validation(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}
