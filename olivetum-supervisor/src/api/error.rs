//! Error types for the miner status API.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failure of a single status request.
///
/// None of these stop the poll loop; the next tick simply tries again.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Could not connect (miner not up yet, wrong port).
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Connect or request/response exchange took too long.
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection closed before a full response line arrived.
    #[error("connection closed before response")]
    Closed,

    /// Response is not the expected JSON.
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The miner answered with a non-null `error` member.
    #[error("api error: {0}")]
    Api(String),

    /// Response has neither `result` nor `error`.
    #[error("response without result")]
    MissingResult,

    /// `result` has fewer entries than the format requires.
    #[error("unexpected stat format ({0} items)")]
    ShortResult(usize),
}

/// Result type for status API operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
