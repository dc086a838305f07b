//! Periodic status polling.
//!
//! The [`Poller`] issues one request per tick and forwards the outcome as a
//! [`TelemetryEvent`]. It never stops on errors; only its cancellation token
//! ends it. Events are handed off with `try_send`, so a slow consumer costs
//! samples, not ticks.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::{TelemetryError, TelemetryResult};
use super::messages::TelemetrySample;
use crate::tracing::prelude::*;

/// Default time between two status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Something that can produce a status sample on demand.
#[async_trait]
pub trait StatSource: Send + Sync {
    async fn fetch(&self) -> TelemetryResult<TelemetrySample>;
}

/// Outcome of one poll tick.
#[derive(Debug)]
pub enum TelemetryEvent {
    Sample(TelemetrySample),
    PollError(TelemetryError),
}

pub struct Poller<S> {
    source: S,
    interval: Duration,
    events: mpsc::Sender<TelemetryEvent>,
}

impl<S: StatSource> Poller<S> {
    pub fn new(source: S, interval: Duration, events: mpsc::Sender<TelemetryEvent>) -> Self {
        Self {
            source,
            interval,
            events,
        }
    }

    /// Poll until `cancel` fires or the event receiver goes away.
    ///
    /// The first request goes out one interval after the call.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.source.fetch() => match result {
                    Ok(sample) => TelemetryEvent::Sample(sample),
                    Err(e) => {
                        trace!(error = %e, "Status poll failed");
                        TelemetryEvent::PollError(e)
                    }
                },
            };

            match self.events.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Telemetry consumer lagging, dropping poll result");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
        trace!("Poller exiting");
    }
}
