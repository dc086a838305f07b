//! Client for the miner's JSON status API.
//!
//! The miner is started with `--api-bind 127.0.0.1:-<port>` (negative port:
//! read-only API). [`StatusClient`] speaks the line-oriented protocol,
//! [`Poller`] drives it on a fixed interval and reports through
//! [`TelemetryEvent`]s.

pub mod client;
pub mod error;
pub mod messages;
pub mod poller;

pub use client::StatusClient;
pub use error::{TelemetryError, TelemetryResult};
pub use messages::{GpuSensors, TelemetrySample};
pub use poller::{Poller, StatSource, TelemetryEvent, DEFAULT_POLL_INTERVAL};
