//! Supervisor and telemetry engine for an external Olivetumhash GPU miner.
//!
//! The crate launches the miner, captures its output into a bounded log,
//! polls its status API, and keeps a rolling hash-rate chart. Frontends
//! drive it through [`supervisor::Supervisor`].

pub mod api;
pub mod chart;
pub mod config;
pub mod daemon;
pub mod devices;
pub mod error;
pub mod logs;
pub mod pool_url;
pub mod supervisor;
pub mod tracing;
pub mod types;
