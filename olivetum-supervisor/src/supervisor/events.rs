//! Events published by the supervisor.
//!
//! A frontend is a pure subscriber: it receives [`Event`]s from the channel
//! returned by [`Supervisor::new`](super::Supervisor::new) and queries the
//! supervisor for anything else.

use crate::api::TelemetryEvent;
use crate::config::Backend;

#[derive(Debug)]
pub enum Event {
    Lifecycle(LifecycleEvent),
    Telemetry(TelemetryEvent),
}

/// Process lifecycle transitions and notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The miner process was spawned.
    Started {
        pid: Option<u32>,
        api_port: u16,
        backend: Backend,
    },

    /// Informational, e.g. a start request while already running.
    Notice(String),

    /// Exited after a stop request, or with a success status.
    StoppedNormally,

    /// Exited on its own with a failure; carries the exit detail.
    StoppedWithError(String),
}

impl From<LifecycleEvent> for Event {
    fn from(event: LifecycleEvent) -> Self {
        Event::Lifecycle(event)
    }
}

impl From<TelemetryEvent> for Event {
    fn from(event: TelemetryEvent) -> Self {
        Event::Telemetry(event)
    }
}
