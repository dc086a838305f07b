//! Miner process supervision.
//!
//! The [`Supervisor`] owns at most one miner process. State transitions are
//! serialized by one async mutex:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |                                  ^
//!               +---------- (launch failed) -------+
//! ```
//!
//! Each running instance gets its own cancellation token (a child of the
//! supervisor's shutdown token) and its own task tracker holding the two
//! output readers, the status poller, and the telemetry dispatcher. The
//! waiter task joins that tracker before the instance is cleared, so no task
//! of an old instance outlives it.
//!
//! Only the waiter touches the process: stopping asks it to send SIGINT, which
//! it does only while the child has not been reaped, and arms a grace timer.
//! When the timer fires and the same instance (by id) is still registered,
//! its token is cancelled and the waiter kills the process.

pub mod args;
pub mod events;
pub mod port;

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use strum::Display;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::api::{Poller, StatusClient, TelemetryEvent, DEFAULT_POLL_INTERVAL};
use crate::chart::RollingChart;
use crate::config::{Backend, WorkerConfig};
use crate::devices::resolve_backend;
use crate::error::{Error, Result};
use crate::logs::{log_pipeline, LogSink, RingLog};
use crate::pool_url::build_pool_url;
use crate::tracing::prelude::*;

pub use args::build_args;
pub use events::{Event, LifecycleEvent};
pub use port::allocate_api_port;

/// Default wait between SIGINT and the forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// How long the waiter lets output readers drain after the process exits.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest chunk of output stored as one line; longer runs are split.
const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Capacity of the event channel handed to the frontend.
const EVENT_QUEUE: usize = 256;

/// Capacity of the per-instance telemetry channel.
const TELEMETRY_QUEUE: usize = 16;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Runtime knobs.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Miner executable.
    pub miner_path: PathBuf,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
    /// Host the status client connects to; the miner binds loopback.
    pub api_host: IpAddr,
    pub log_capacity: usize,
    pub chart_capacity: usize,
}

impl SupervisorSettings {
    pub fn new(miner_path: impl Into<PathBuf>) -> Self {
        Self {
            miner_path: miner_path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
            api_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            log_capacity: crate::logs::DEFAULT_CAPACITY,
            chart_capacity: crate::chart::DEFAULT_CAPACITY,
        }
    }

    /// Defaults, overridden by the environment.
    ///
    /// # Environment Variables
    ///
    /// - `OLIVETUM_POLL_INTERVAL_MS`: status poll interval (default: 2000)
    /// - `OLIVETUM_STOP_GRACE_SECS`: SIGINT to kill delay (default: 5)
    pub fn from_env(miner_path: impl Into<PathBuf>) -> Self {
        let mut settings = Self::new(miner_path);
        if let Some(ms) = env::var("OLIVETUM_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
        {
            settings.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env::var("OLIVETUM_STOP_GRACE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            settings.stop_grace = Duration::from_secs(secs);
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A miner was already running; nothing was done.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Stop initiated (or already in progress).
    Stopping,
    /// Nothing was running.
    NotRunning,
}

/// Snapshot of the supervisor for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: RunState,
    pub pid: Option<u32>,
    pub api_port: Option<u16>,
    pub backend: Option<Backend>,
    pub config: Option<WorkerConfig>,
}

/// The registered running instance.
struct Instance {
    id: u64,
    pid: Option<u32>,
    api_port: u16,
    backend: Backend,
    config: WorkerConfig,
    lifetime: CancellationToken,
    /// Cancelled to have the waiter send SIGINT.
    interrupt: CancellationToken,
    stop_requested: bool,
    /// The process is reaped; its tasks are still winding down.
    exited: bool,
}

struct State {
    run_state: RunState,
    instance: Option<Instance>,
}

struct Shared {
    settings: SupervisorSettings,
    state: Mutex<State>,
    state_tx: watch::Sender<RunState>,
    logs: Arc<RingLog>,
    sink: LogSink,
    flush_rx: watch::Receiver<u64>,
    chart: Arc<RollingChart>,
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

/// Owner of the miner process.
///
/// Cheap to clone; clones share the same process and state.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create a supervisor and the receiver of its events.
    ///
    /// Must be called within a Tokio runtime: the log pipeline task is
    /// spawned here.
    pub fn new(settings: SupervisorSettings) -> (Self, mpsc::Receiver<Event>) {
        let logs = Arc::new(RingLog::new(settings.log_capacity));
        let (sink, pipeline, flush_rx) = log_pipeline(Arc::clone(&logs));
        let chart = Arc::new(RollingChart::new(settings.chart_capacity));
        let (events, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (state_tx, _) = watch::channel(RunState::Stopped);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(pipeline.run(shutdown.clone()));

        let shared = Arc::new(Shared {
            settings,
            state: Mutex::new(State {
                run_state: RunState::Stopped,
                instance: None,
            }),
            state_tx,
            logs,
            sink,
            flush_rx,
            chart,
            events,
            shutdown,
            tracker,
            next_id: AtomicU64::new(1),
        });
        (Self { shared }, events_rx)
    }

    /// Launch the miner with `config`.
    ///
    /// Validation, port allocation, and spawn failures are returned and leave
    /// the supervisor stopped. Starting while a miner runs is not an error:
    /// it yields [`StartOutcome::AlreadyRunning`] and a notice event.
    pub async fn start(&self, config: WorkerConfig) -> Result<StartOutcome> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if state.instance.is_some() {
            info!("Start requested while the miner is running");
            shared.emit(LifecycleEvent::Notice("Miner already running".into()));
            return Ok(StartOutcome::AlreadyRunning);
        }

        shared.set_state(&mut state, RunState::Starting);
        match self.launch(config).await {
            Ok(instance) => {
                info!(
                    pid = ?instance.pid,
                    api_port = instance.api_port,
                    backend = %instance.backend,
                    "Miner started"
                );
                shared.emit(LifecycleEvent::Started {
                    pid: instance.pid,
                    api_port: instance.api_port,
                    backend: instance.backend,
                });
                state.instance = Some(instance);
                shared.set_state(&mut state, RunState::Running);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                warn!(error = %e, "Miner start failed");
                shared.set_state(&mut state, RunState::Stopped);
                Err(e)
            }
        }
    }

    /// Everything from validation to spawning the instance tasks. Called
    /// with the state lock held.
    async fn launch(&self, config: WorkerConfig) -> Result<Instance> {
        let shared = &self.shared;
        let settings = &shared.settings;

        let pool_url = build_pool_url(&config)?;
        let api_port = allocate_api_port(settings.api_host).await?;
        let backend = resolve_backend(&settings.miner_path, config.backend).await;
        let args = build_args(&config, backend, &pool_url, api_port);

        shared.sink.reset();
        shared.sink.push(&format!(
            "Starting: {} {}\n\n",
            settings.miner_path.display(),
            args.join(" ")
        ));

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let lifetime = shared.shutdown.child_token();
        let interrupt = CancellationToken::new();

        let mut child = Command::new(&settings.miner_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                path: settings.miner_path.clone(),
                source,
            })?;
        let pid = child.id();

        let tasks = TaskTracker::new();
        if let Some(stdout) = child.stdout.take() {
            tasks.spawn(forward_lines(stdout, shared.sink.clone(), lifetime.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tasks.spawn(forward_lines(stderr, shared.sink.clone(), lifetime.clone()));
        }

        let poll_cancel = lifetime.child_token();
        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_QUEUE);
        let client = StatusClient::new(SocketAddr::new(settings.api_host, api_port));
        tasks.spawn(Poller::new(client, settings.poll_interval, telemetry_tx).run(poll_cancel.clone()));
        tasks.spawn(dispatch_telemetry(
            telemetry_rx,
            Arc::clone(&shared.chart),
            shared.sink.clone(),
            shared.events.clone(),
        ));
        tasks.close();

        shared.tracker.spawn(wait_for_exit(
            Arc::clone(shared),
            id,
            child,
            lifetime.clone(),
            interrupt.clone(),
            poll_cancel,
            tasks,
        ));

        Ok(Instance {
            id,
            pid,
            api_port,
            backend,
            config,
            lifetime,
            interrupt,
            stop_requested: false,
            exited: false,
        })
    }

    /// Ask the miner to exit.
    ///
    /// Sends SIGINT and kills the process if it is still the same instance
    /// after the grace period. Returns once the stop is initiated; the exit
    /// itself is reported by a lifecycle event.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        let Some(instance) = state.instance.as_mut().filter(|i| !i.exited) else {
            return Ok(StopOutcome::NotRunning);
        };
        if instance.stop_requested {
            return Ok(StopOutcome::Stopping);
        }
        instance.stop_requested = true;
        let id = instance.id;
        let lifetime = instance.lifetime.clone();
        let pid = instance.pid;

        shared.sink.push("\nStopping miner...\n");
        info!(?pid, "Stopping miner");
        instance.interrupt.cancel();

        shared.tracker.spawn(grace_kill(
            Arc::clone(shared),
            id,
            lifetime,
            shared.settings.stop_grace,
        ));
        shared.set_state(&mut state, RunState::Stopping);
        Ok(StopOutcome::Stopping)
    }

    pub async fn state(&self) -> RunState {
        self.shared.state.lock().await.run_state
    }

    /// Watch channel following every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.shared.state_tx.subscribe()
    }

    pub async fn status(&self) -> SupervisorStatus {
        let state = self.shared.state.lock().await;
        let instance = state.instance.as_ref();
        SupervisorStatus {
            state: state.run_state,
            pid: instance.and_then(|i| i.pid),
            api_port: instance.map(|i| i.api_port),
            backend: instance.map(|i| i.backend),
            config: instance.map(|i| i.config.clone()),
        }
    }

    /// Captured miner output.
    pub fn logs(&self) -> Arc<RingLog> {
        Arc::clone(&self.shared.logs)
    }

    /// Receiver bumped at most once per flush interval when the log changed.
    pub fn log_flushes(&self) -> watch::Receiver<u64> {
        self.shared.flush_rx.clone()
    }

    /// Lines dropped because the log queue was full.
    pub fn dropped_log_lines(&self) -> u64 {
        self.shared.sink.dropped()
    }

    pub fn chart(&self) -> Arc<RollingChart> {
        Arc::clone(&self.shared.chart)
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.shared.settings
    }

    /// Stop the miner, wait for it (bounded by the grace period), then cancel
    /// and join every remaining task.
    pub async fn shutdown(&self) {
        if let Ok(StopOutcome::Stopping) = self.stop().await {
            let mut state_rx = self.subscribe_state();
            let limit = self.shared.settings.stop_grace + READER_DRAIN_TIMEOUT + Duration::from_secs(1);
            let stopped = tokio::time::timeout(limit, state_rx.wait_for(|s| *s == RunState::Stopped));
            if stopped.await.is_err() {
                warn!("Miner did not stop in time, cancelling");
            }
        }
        self.shared.shutdown.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        debug!("Supervisor shut down");
    }
}

impl Shared {
    fn set_state(&self, state: &mut State, run_state: RunState) {
        state.run_state = run_state;
        self.state_tx.send_replace(run_state);
    }

    fn emit(&self, event: impl Into<Event>) {
        emit(&self.events, event.into());
    }
}

/// Hand an event to the frontend without waiting. A frontend that dropped
/// its receiver simply gets nothing.
fn emit(events: &mpsc::Sender<Event>, event: Event) {
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        warn!(?event, "Event queue full, dropping event");
    }
}

/// SIGINT the child if it has not been reaped yet. `child.id()` is `None`
/// after reaping, so a recycled pid is never signalled.
#[cfg(unix)]
fn interrupt(child: &Child, lifetime: &CancellationToken) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGINT) {
        debug!(pid, error = %e, "SIGINT failed, killing instead");
        lifetime.cancel();
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child, lifetime: &CancellationToken) {
    lifetime.cancel();
}

/// Feed one output stream into the log, line by line. Lines longer than
/// [`MAX_LINE_BYTES`] are stored in pieces.
async fn forward_lines<R>(stream: R, sink: LogSink, lifetime: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut buf) => read,
            _ = lifetime.cancelled() => break,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                sink.push(line.strip_suffix('\n').unwrap_or(&line));
            }
            Err(e) => {
                debug!(error = %e, "Miner output read failed");
                break;
            }
        }
    }
}

/// Apply poll results one at a time, in order, off the polling loop.
async fn dispatch_telemetry(
    mut rx: mpsc::Receiver<TelemetryEvent>,
    chart: Arc<RollingChart>,
    sink: LogSink,
    events: mpsc::Sender<Event>,
) {
    while let Some(event) = rx.recv().await {
        match &event {
            TelemetryEvent::Sample(sample) => chart.add(sample.total_mhs()),
            TelemetryEvent::PollError(e) => {
                // The API may simply not be up yet
                debug!(error = %e, "Status poll failed");
                sink.push(&format!("[api] {}", e));
            }
        }
        emit(&events, Event::Telemetry(event));
    }
}

/// Wait for the process to exit, tear the instance down, and report.
async fn wait_for_exit(
    shared: Arc<Shared>,
    id: u64,
    mut child: Child,
    lifetime: CancellationToken,
    interrupt_requested: CancellationToken,
    poll_cancel: CancellationToken,
    tasks: TaskTracker,
) {
    let mut killed = false;
    let mut interrupted = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = lifetime.cancelled() => {
                killed = true;
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Kill failed");
                }
                break child.wait().await;
            }
            _ = interrupt_requested.cancelled(), if !interrupted => {
                interrupted = true;
                interrupt(&child, &lifetime);
            }
        }
    };

    // Reaped: from here on nothing may signal this pid
    {
        let mut state = shared.state.lock().await;
        if let Some(instance) = state.instance.as_mut().filter(|i| i.id == id) {
            instance.exited = true;
            instance.pid = None;
            shared.set_state(&mut state, RunState::Stopping);
        }
    }

    poll_cancel.cancel();
    if tokio::time::timeout(READER_DRAIN_TIMEOUT, tasks.wait()).await.is_err() {
        debug!("Output readers still open after exit, cancelling");
    }
    lifetime.cancel();
    tasks.wait().await;

    let mut state = shared.state.lock().await;
    let requested = match state.instance.as_ref() {
        Some(instance) if instance.id == id => instance.stop_requested,
        _ => false,
    };
    if state.instance.as_ref().is_some_and(|i| i.id == id) {
        state.instance = None;
        shared.set_state(&mut state, RunState::Stopped);
    }
    shared.chart.reset();

    let event = match classify_exit(status, requested || killed) {
        Ok(()) => {
            info!("Miner stopped");
            shared.sink.push("\n[exit] miner stopped\n");
            LifecycleEvent::StoppedNormally
        }
        Err(detail) => {
            warn!(%detail, "Miner exited abnormally");
            shared.sink.push(&format!("\n[exit] {}\n", detail));
            LifecycleEvent::StoppedWithError(detail)
        }
    };
    shared.emit(event);
}

/// Normal when the exit was asked for or the status is success; otherwise
/// the exit detail.
fn classify_exit(status: std::io::Result<ExitStatus>, requested: bool) -> std::result::Result<(), String> {
    match status {
        Ok(_) if requested => Ok(()),
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(status.to_string()),
        Err(e) => Err(format!("wait failed: {}", e)),
    }
}

/// Kill the instance `id` if it is still registered after `grace`.
async fn grace_kill(shared: Arc<Shared>, id: u64, lifetime: CancellationToken, grace: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(grace) => {}
        _ = lifetime.cancelled() => return,
    }
    let state = shared.state.lock().await;
    if let Some(instance) = state.instance.as_ref().filter(|i| i.id == id) {
        warn!(pid = ?instance.pid, "Miner ignored SIGINT, killing");
        instance.lifetime.cancel();
    }
}
