//! Console frontend: run one miner until it exits or a signal arrives.
//!
//! Captured miner output is echoed through tracing under the
//! [`MINER_TARGET`] target as the log pipeline flushes it, and every status
//! sample is summarized on one line.

use tokio::sync::{mpsc, watch};

use crate::api::{TelemetryEvent, TelemetrySample};
use crate::config::WorkerConfig;
use crate::logs::RingLog;
use crate::supervisor::{Event, LifecycleEvent, Supervisor, SupervisorSettings};
use crate::tracing::{prelude::*, MINER_TARGET};

/// The main daemon.
pub struct Daemon {
    settings: SupervisorSettings,
    config: WorkerConfig,
}

impl Daemon {
    pub fn new(settings: SupervisorSettings, config: WorkerConfig) -> Self {
        Self { settings, config }
    }

    /// Start the miner and stay with it until it exits or we are told to
    /// stop.
    ///
    /// A miner exiting on its own with a failure is returned as an error.
    pub async fn run(self) -> anyhow::Result<()> {
        let (supervisor, mut events) = Supervisor::new(self.settings);
        let logs = supervisor.logs();
        let mut flushes = supervisor.log_flushes();
        let mut echo = LogEcho::default();

        if let Err(e) = supervisor.start(self.config).await {
            supervisor.shutdown().await;
            return Err(e.into());
        }
        info!("Started.");
        info!("For debugging, set RUST_LOG=olivetum_supervisor=debug or trace.");

        let outcome = follow(&mut events, &mut flushes, &logs, &mut echo).await;

        // Either way the supervisor is torn down
        supervisor.shutdown().await;
        echo.drain(&logs);
        let dropped = supervisor.dropped_log_lines();
        if dropped > 0 {
            warn!(dropped, "Miner output lines were dropped");
        }
        info!("Exiting.");

        match outcome? {
            Exit::Signal | Exit::Normal => Ok(()),
            Exit::Failed(detail) => Err(crate::error::Error::ProcessExit(detail).into()),
        }
    }
}

enum Exit {
    Signal,
    Normal,
    Failed(String),
}

async fn follow(
    events: &mut mpsc::Receiver<Event>,
    flushes: &mut watch::Receiver<u64>,
    logs: &RingLog,
    echo: &mut LogEcho,
) -> anyhow::Result<Exit> {
    let mut sigint = signal(Kind::Interrupt)?;
    let mut sigterm = signal(Kind::Terminate)?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
                return Ok(Exit::Signal);
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
                return Ok(Exit::Signal);
            }
            changed = flushes.changed() => {
                if changed.is_err() {
                    return Ok(Exit::Normal);
                }
                echo.drain(logs);
            }
            event = events.recv() => match event {
                Some(Event::Lifecycle(LifecycleEvent::StoppedNormally)) => return Ok(Exit::Normal),
                Some(Event::Lifecycle(LifecycleEvent::StoppedWithError(detail))) => {
                    return Ok(Exit::Failed(detail));
                }
                Some(Event::Lifecycle(LifecycleEvent::Started { pid, api_port, backend })) => {
                    info!(?pid, api_port, %backend, "Miner running");
                }
                Some(Event::Lifecycle(LifecycleEvent::Notice(notice))) => info!("{}", notice),
                Some(Event::Telemetry(TelemetryEvent::Sample(sample))) => log_sample(&sample),
                // Already in the miner log
                Some(Event::Telemetry(TelemetryEvent::PollError(_))) => {}
                None => return Ok(Exit::Normal),
            }
        }
    }
}

fn log_sample(sample: &TelemetrySample) {
    let temps: Vec<String> = sample
        .sensors
        .iter()
        .map(|s| format!("{}C/{}%", s.temp_c, s.fan_percent))
        .collect();
    info!(
        hashrate = %sample.hashrate(),
        accepted = sample.accepted,
        rejected = sample.rejected,
        invalid = sample.invalid,
        gpus = sample.per_gpu_khs.len(),
        sensors = %temps.join(" "),
        pool = %sample.pool,
        "Status"
    );
}

/// Tracks how much of the ring has been echoed.
#[derive(Default)]
struct LogEcho {
    seen: u64,
}

impl LogEcho {
    fn drain(&mut self, logs: &RingLog) {
        let (lines, seen) = logs.lines_since(self.seen);
        self.seen = seen;
        for line in lines.iter().filter(|l| !l.is_empty()) {
            info!(target: MINER_TARGET, "{}", line);
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Interrupt,
    Terminate,
}

#[cfg(unix)]
struct Signal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Signal {
    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(unix)]
fn signal(kind: Kind) -> std::io::Result<Signal> {
    use tokio::signal::unix::{self, SignalKind};
    let kind = match kind {
        Kind::Interrupt => SignalKind::interrupt(),
        Kind::Terminate => SignalKind::terminate(),
    };
    unix::signal(kind).map(Signal)
}

#[cfg(not(unix))]
struct Signal(Kind);

#[cfg(not(unix))]
impl Signal {
    async fn recv(&mut self) -> Option<()> {
        match self.0 {
            Kind::Interrupt => tokio::signal::ctrl_c().await.ok(),
            Kind::Terminate => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
fn signal(kind: Kind) -> std::io::Result<Signal> {
    Ok(Signal(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_only_reports_new_lines() {
        let logs = RingLog::new(3);
        let mut echo = LogEcho::default();

        logs.append("a");
        logs.append("b");
        echo.drain(&logs);
        assert_eq!(echo.seen, 2);

        logs.append("c");
        logs.append("d");
        logs.append("e");
        echo.drain(&logs);
        assert_eq!(echo.seen, 5);

        echo.drain(&logs);
        assert_eq!(echo.seen, 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_miner_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let miner = dir.path().join("fake-miner");
        std::fs::write(&miner, "#!/bin/sh\necho 'no GPU'\nexit 2\n").unwrap();
        std::fs::set_permissions(&miner, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = WorkerConfig {
            wallet_address: "0x00112233445566778899aabbccddeeff00112233".into(),
            backend: crate::config::Backend::OpenCl,
            ..Default::default()
        };
        let err = Daemon::new(SupervisorSettings::new(&miner), config)
            .run()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit status: 2"), "{}", err);
    }
}
