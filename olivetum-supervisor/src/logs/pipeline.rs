//! Ingestion path between miner output readers and the ring log.
//!
//! Producers (stream readers, the supervisor, the telemetry dispatcher) hand
//! lines to a [`LogSink`], which enqueues them on a bounded channel without
//! ever waiting. When the queue is full the line is dropped and counted: log
//! completeness is best effort under sustained overload, never something the
//! rest of the system relies on.
//!
//! A single [`LogPipeline`] task drains the queue into the [`RingLog`] and, at
//! most once per flush interval and only if something changed, bumps a flush
//! generation on a `watch` channel. Displays wait on that instead of redrawing
//! per line.
//!
//! Resets bypass the queue: they bump a shared counter, and queued lines
//! pushed under an older count are discarded rather than stored.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{sanitize, RingLog};
use crate::tracing::prelude::*;

/// Lines that may be queued ahead of the ring before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 4096;

/// Minimum time between two flush notifications.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// A line tagged with the reset generation it was pushed under.
#[derive(Debug)]
struct LogLine {
    generation: u64,
    text: String,
}

/// Non-blocking handle for feeding the log.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogLine>,
    dropped: Arc<AtomicU64>,
    resets: Arc<AtomicU64>,
}

impl LogSink {
    /// Sanitize `text` and enqueue each of its lines.
    ///
    /// Embedded newlines split the text, so `"\nStopping miner...\n"` yields
    /// an empty line, the message, and another empty line.
    pub fn push(&self, text: &str) {
        let clean = sanitize(text);
        let generation = self.resets.load(Ordering::Acquire);
        for line in clean.split('\n') {
            self.enqueue(LogLine {
                generation,
                text: line.to_string(),
            });
        }
    }

    /// Clear the ring before the next line is stored. Lines pushed before the
    /// reset and still queued are discarded. Never lost to a full queue.
    pub fn reset(&self) {
        self.resets.fetch_add(1, Ordering::AcqRel);
    }

    /// Lines discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, line: LogLine) {
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total.is_power_of_two() {
                    debug!(dropped = total, "Log queue full, dropping miner output");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Consumer side of the log queue.
pub struct LogPipeline {
    rx: mpsc::Receiver<LogLine>,
    resets: Arc<AtomicU64>,
    /// Reset generation the ring currently reflects.
    generation: u64,
    ring: Arc<RingLog>,
    flush_tx: watch::Sender<u64>,
    flush_interval: Duration,
}

/// Create a sink/pipeline pair feeding `ring`.
///
/// The returned `watch::Receiver` observes the flush generation.
pub fn log_pipeline(ring: Arc<RingLog>) -> (LogSink, LogPipeline, watch::Receiver<u64>) {
    log_pipeline_with(ring, QUEUE_CAPACITY, FLUSH_INTERVAL)
}

/// Like [`log_pipeline`] with explicit queue capacity and flush interval.
pub fn log_pipeline_with(
    ring: Arc<RingLog>,
    queue_capacity: usize,
    flush_interval: Duration,
) -> (LogSink, LogPipeline, watch::Receiver<u64>) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let (flush_tx, flush_rx) = watch::channel(0);
    let resets = Arc::new(AtomicU64::new(0));
    let sink = LogSink {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
        resets: Arc::clone(&resets),
    };
    let pipeline = LogPipeline {
        rx,
        resets,
        generation: 0,
        ring,
        flush_tx,
        flush_interval,
    };
    (sink, pipeline, flush_rx)
}

impl LogPipeline {
    /// Drain the queue until shutdown or until every sink is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut dirty = false;
        loop {
            tokio::select! {
                biased;

                line = self.rx.recv() => match line {
                    Some(line) => {
                        dirty |= self.apply_reset();
                        // Backlog from before the last reset
                        if line.generation >= self.generation {
                            self.ring.append(line.text);
                            dirty = true;
                        }
                    }
                    None => break,
                },

                _ = ticker.tick() => {
                    dirty |= self.apply_reset();
                    if dirty {
                        dirty = false;
                        self.bump();
                    }
                }

                _ = shutdown.cancelled() => break,
            }
        }

        if self.apply_reset() || dirty {
            self.bump();
        }
        trace!("Log pipeline exiting");
    }

    /// Clear the ring if a reset happened since the last check.
    fn apply_reset(&mut self) -> bool {
        let requested = self.resets.load(Ordering::Acquire);
        if requested == self.generation {
            return false;
        }
        self.generation = requested;
        self.ring.clear();
        true
    }

    fn bump(&self) {
        self.flush_tx.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_and_counts() {
        let ring = Arc::new(RingLog::new(100));
        let (sink, pipeline, mut flush_rx) =
            log_pipeline_with(Arc::clone(&ring), 2, FLUSH_INTERVAL);

        for i in 0..5 {
            sink.push(&format!("line {}", i));
        }
        assert_eq!(sink.dropped(), 3);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(shutdown.clone()));

        flush_rx.changed().await.unwrap();
        assert_eq!(ring.lines(), vec!["line 0", "line 1"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_is_coalesced() {
        let ring = Arc::new(RingLog::new(1000));
        let (sink, pipeline, mut flush_rx) = log_pipeline(Arc::clone(&ring));

        for i in 0..100 {
            sink.push(&format!("burst {}", i));
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(shutdown.clone()));

        flush_rx.changed().await.unwrap();
        assert_eq!(*flush_rx.borrow_and_update(), 1);
        assert_eq!(ring.len(), 100);

        // Nothing new: no further notifications
        tokio::time::sleep(FLUSH_INTERVAL * 5).await;
        assert!(!flush_rx.has_changed().unwrap());

        sink.push("late");
        flush_rx.changed().await.unwrap();
        assert_eq!(*flush_rx.borrow_and_update(), 2);
        assert_eq!(ring.at(100).as_deref(), Some("late"));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_sanitizes_and_splits() {
        let ring = Arc::new(RingLog::new(10));
        let (sink, pipeline, mut flush_rx) = log_pipeline(Arc::clone(&ring));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(shutdown.clone()));

        sink.push("\x1b[31mred\x1b[0m\r\nsecond");
        flush_rx.changed().await.unwrap();
        assert_eq!(ring.lines(), vec!["red", "second"]);

        sink.reset();
        sink.push("after reset");
        flush_rx.changed().await.unwrap();
        assert_eq!(ring.lines(), vec!["after reset"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_survives_full_queue() {
        let ring = Arc::new(RingLog::new(100));
        let (sink, pipeline, mut flush_rx) =
            log_pipeline_with(Arc::clone(&ring), 2, FLUSH_INTERVAL);
        ring.append("previous run");

        sink.push("backlog 1");
        sink.push("backlog 2");
        sink.reset();
        sink.push("Starting: miner");
        assert_eq!(sink.dropped(), 1);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(pipeline.run(shutdown.clone()));

        flush_rx.changed().await.unwrap();
        assert!(ring.is_empty(), "{:?}", ring.lines());

        sink.push("fresh");
        flush_rx.changed().await.unwrap();
        assert_eq!(ring.lines(), vec!["fresh"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_pipeline_ends_when_sinks_dropped() {
        let ring = Arc::new(RingLog::new(10));
        let (sink, pipeline, flush_rx) = log_pipeline(Arc::clone(&ring));
        sink.push("last words");
        drop(sink);

        pipeline.run(CancellationToken::new()).await;
        assert_eq!(ring.lines(), vec!["last words"]);
        assert_eq!(*flush_rx.borrow(), 1);
    }
}
