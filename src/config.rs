use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Server configuration.
///
/// Every field has a default, so a YAML file only needs to name the
/// values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,
    /// Directory that request targets are resolved against.
    pub doc_root: PathBuf,
    /// Ceiling on simultaneously open client connections.
    pub max_connections: usize,
    /// Maximum readiness events handled per wake-up.
    pub max_events: usize,
    /// Number of worker threads processing requests.
    pub worker_threads: usize,
    /// Ceiling on queued, not yet processed requests.
    pub max_requests: usize,
    /// Period of the timer tick. Idle connections are evicted after
    /// three ticks without activity.
    pub tick_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            doc_root: PathBuf::from("resources"),
            max_connections: 65535,
            max_events: 10000,
            worker_threads: 8,
            max_requests: 10000,
            tick_interval_ms: 5000,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// Reads the YAML file named by `LANTERN_CONFIG` when it is set, then
    /// applies `LANTERN_DOC_ROOT` on top.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var_os("LANTERN_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(root) = std::env::var_os("LANTERN_DOC_ROOT") {
            cfg.doc_root = PathBuf::from(root);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1"));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid("max_requests must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid("max_events must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// How long a connection may stay silent before its timer fires.
    pub fn idle_timeout(&self) -> Duration {
        self.tick_interval() * 3
    }
}
