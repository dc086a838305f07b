//! Miner log capture with bounded memory.
//!
//! Raw stdout/stderr lines go through [`sanitize`], a drop-on-full queue
//! ([`LogSink`] / [`LogPipeline`]), and end up in a fixed-capacity
//! [`RingLog`] that the display side reads by index.

mod pipeline;
mod ring;
mod sanitize;

pub use pipeline::{
    log_pipeline, log_pipeline_with, LogPipeline, LogSink, FLUSH_INTERVAL, QUEUE_CAPACITY,
};
pub use ring::{RingLog, DEFAULT_CAPACITY};
pub use sanitize::sanitize;
