//! Error types shared across the crate.
//!
//! HTTP-level failures are not errors in this sense: they are
//! [`HttpCode`](crate::http::parser::HttpCode) outcomes that end up as
//! error responses on the wire.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one thread")]
    NoWorkers,

    #[error("task queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("task queue is full")]
    QueueFull,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
