//! Error types for the supervisor.
//!
//! Structural failures (bad configuration, missing executable, port
//! exhaustion) abort a start attempt and are returned to the caller.
//! Telemetry failures are transient and have their own type,
//! [`crate::api::TelemetryError`], which the poll loop only ever logs.

use std::path::PathBuf;

use crate::pool_url::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to launch {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free local port for the miner API: {0}")]
    PortAllocation(#[source] std::io::Error),

    #[error("miner exited abnormally: {0}")]
    ProcessExit(String),

    #[error("config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config encoding: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("no user config directory on this platform")]
    NoConfigDir,

    #[error("failed to list devices: {0}")]
    DeviceList(String),
}
