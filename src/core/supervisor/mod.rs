//! Keeps a fixed set of worker processes alive.
//!
//! The supervisor spawns workers in declaration order, polls them with
//! `try_wait` from a single monitor task, restarts them according to their
//! restart policy, and on shutdown sends a graceful termination followed by
//! a hard kill once the shared grace deadline passes.

mod types;

pub use types::{
    RestartMode, ShutdownSummary, SupervisorError, SupervisorSettings, WorkerPhase, WorkerSpec,
    WorkerState,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::platform::{NativePlatform, Platform};

/// Stand-in deadline for a backoff too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Worker {
    spec: WorkerSpec,
    state: WorkerState,
    child: Option<Child>,
    spawned_at: Option<Instant>,
    restart_at: Option<Instant>,
}

impl Worker {
    fn new(spec: WorkerSpec) -> Self {
        let state = WorkerState::new(&spec.name);
        Self {
            spec,
            state,
            child: None,
            spawned_at: None,
            restart_at: None,
        }
    }

    fn spawn(&mut self, log_dir: Option<&Path>) -> Result<(), SupervisorError> {
        let spawn_failed = |source| SupervisorError::SpawnFailed {
            worker: self.spec.name.clone(),
            source,
        };

        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spec.cwd {
            cmd.current_dir(cwd);
        }
        match log_dir {
            Some(dir) => {
                let log_file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(format!("{}.log", self.spec.name)))
                    .map_err(spawn_failed)?;
                cmd.stdout(log_file.try_clone().map_err(spawn_failed)?)
                    .stderr(log_file);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(spawn_failed)?;
        self.state.pid = child.id();
        self.state.phase = WorkerPhase::Running;
        self.state.started_at = Some(Utc::now());
        self.state.next_restart_at = None;
        self.child = Some(child);
        self.spawned_at = Some(Instant::now());
        self.restart_at = None;
        info!(
            "Worker [{}] running (PID {})",
            self.spec.name,
            self.state.pid.unwrap_or_default()
        );
        Ok(())
    }

    /// Record an exit and decide what happens next.
    fn on_exit(&mut self, status: ExitStatus, now: Instant) {
        self.child = None;
        self.state.pid = None;
        self.state.last_exit_code = status.code();
        let policy = &self.spec.restart;

        let clean = status.success();
        if policy.mode == RestartMode::Never || (policy.mode == RestartMode::OnFailure && clean) {
            info!("Worker [{}] exited ({}); not restarting", self.spec.name, status);
            self.state.phase = WorkerPhase::Exited;
            return;
        }

        let ran_for = self
            .spawned_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        let attempt = if ran_for >= policy.stable_after() {
            self.state.rapid_failures = 0;
            1
        } else {
            self.state.rapid_failures += 1;
            self.state.rapid_failures
        };
        warn!(
            "Worker [{}] exited ({}) after {:.1}s",
            self.spec.name,
            status,
            ran_for.as_secs_f64()
        );
        self.schedule_restart(attempt, now);
    }

    fn schedule_restart(&mut self, attempt: u32, now: Instant) {
        let policy = &self.spec.restart;
        if policy.gives_up_after(self.state.rapid_failures) {
            error!(
                "Worker [{}] failed {} times in a row; giving up",
                self.spec.name, self.state.rapid_failures
            );
            self.state.phase = WorkerPhase::GaveUp;
            self.state.next_restart_at = None;
            self.restart_at = None;
            return;
        }
        let delay = policy.backoff_for(attempt);
        self.state.phase = WorkerPhase::Restarting;
        self.restart_at = Some(now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE));
        self.state.next_restart_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
    }

    fn restart(&mut self, log_dir: Option<&Path>, now: Instant) {
        self.state.restart_count += 1;
        if let Err(e) = self.spawn(log_dir) {
            error!("{}", e);
            self.state.rapid_failures += 1;
            let attempt = self.state.rapid_failures;
            self.schedule_restart(attempt, now);
        }
    }
}

/// Process supervisor over a fixed worker registry.
pub struct Supervisor {
    settings: SupervisorSettings,
    workers: Mutex<Vec<Worker>>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl Supervisor {
    pub fn new(specs: Vec<WorkerSpec>, settings: SupervisorSettings) -> Self {
        Self {
            settings,
            workers: Mutex::new(specs.into_iter().map(Worker::new).collect()),
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        }
    }

    fn log_dir(&self) -> Option<&Path> {
        self.settings.log_dir.as_deref()
    }

    /// Spawn every worker in order. If any spawn fails, the workers already
    /// running are shut down again and the supervisor is left stopped.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStopped);
        }
        if let Some(dir) = self.log_dir() {
            std::fs::create_dir_all(dir).map_err(|source| SupervisorError::SpawnFailed {
                worker: "<log dir>".to_string(),
                source,
            })?;
        }

        let count = self.workers.lock().await.len();
        for idx in 0..count {
            let delay = {
                let mut workers = self.workers.lock().await;
                if self.stopped.load(Ordering::SeqCst) {
                    return Err(SupervisorError::AlreadyStopped);
                }
                let worker = &mut workers[idx];
                if let Err(e) = worker.spawn(self.settings.log_dir.as_deref()) {
                    drop(workers);
                    error!("{}; unwinding started workers", e);
                    self.stop().await;
                    return Err(e);
                }
                worker.spec.start_delay()
            };
            if idx + 1 < count && !delay.is_zero() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Err(SupervisorError::AlreadyStopped),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        info!("Supervisor started {} worker(s)", count);
        Ok(())
    }

    /// One non-blocking pass over all workers. Returns how long until the next
    /// scheduled restart, if any.
    pub async fn tick(&self) -> Option<Duration> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let mut workers = self.workers.lock().await;
        let now = Instant::now();
        let mut next_due: Option<Instant> = None;

        for worker in workers.iter_mut() {
            if worker.state.phase == WorkerPhase::Running {
                let exited = match worker.child.as_mut().map(Child::try_wait) {
                    Some(Ok(Some(status))) => Some(status),
                    Some(Ok(None)) => None,
                    Some(Err(e)) => {
                        warn!("Could not poll worker [{}]: {}", worker.spec.name, e);
                        None
                    }
                    None => None,
                };
                if let Some(status) = exited {
                    worker.on_exit(status, now);
                }
            }

            if worker.state.phase == WorkerPhase::Restarting {
                match worker.restart_at {
                    Some(at) if at > now => {
                        next_due = Some(next_due.map_or(at, |n| n.min(at)));
                    }
                    _ => {
                        worker.restart(self.settings.log_dir.as_deref(), now);
                        if let Some(at) = worker.restart_at {
                            next_due = Some(next_due.map_or(at, |n| n.min(at)));
                        }
                    }
                }
            }
        }

        next_due.map(|at| at.saturating_duration_since(now))
    }

    /// Poll until shutdown. Sleeps `poll_interval` between ticks, or less when
    /// a restart is due sooner.
    pub async fn monitor_loop(&self) {
        info!(
            "Supervisor monitor running (poll every {:?})",
            self.settings.poll_interval
        );
        while !self.shutdown.is_cancelled() {
            let wait = match self.tick().await {
                Some(due) => due.min(self.settings.poll_interval),
                None => self.settings.poll_interval,
            };
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!("Supervisor monitor exited");
    }

    /// Terminate every live worker. Only the first call does anything; later
    /// calls return an empty summary.
    pub async fn stop(&self) -> ShutdownSummary {
        let mut summary = ShutdownSummary::default();
        if self.stopped.swap(true, Ordering::SeqCst) {
            return summary;
        }
        self.shutdown.cancel();

        let mut workers = self.workers.lock().await;
        for worker in workers.iter_mut() {
            if let (Some(_), Some(pid)) = (&worker.child, worker.state.pid)
                && let Err(source) = NativePlatform::terminate_process(pid)
            {
                let err = SupervisorError::TerminateFailed {
                    worker: worker.spec.name.clone(),
                    source,
                };
                warn!("{}", err);
                summary.signal_failures.push(err);
            }
        }

        let grace = self.settings.grace_period;
        let deadline = Instant::now() + grace;
        for worker in workers.iter_mut() {
            if let Some(mut child) = worker.child.take() {
                match tokio::time::timeout_at(deadline, child.wait()).await {
                    Ok(Ok(status)) => {
                        worker.state.last_exit_code = status.code();
                        summary.stopped.push(worker.spec.name.clone());
                    }
                    Ok(Err(e)) => {
                        warn!("Waiting on worker [{}] failed: {}", worker.spec.name, e);
                        summary.stopped.push(worker.spec.name.clone());
                    }
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!("Could not kill worker [{}]: {}", worker.spec.name, e);
                        }
                        let err = SupervisorError::ShutdownTimeout {
                            worker: worker.spec.name.clone(),
                            grace,
                        };
                        warn!("{}", err);
                        summary.timeouts.push(err);
                    }
                }
            }
            worker.state.phase = WorkerPhase::Stopped;
            worker.state.pid = None;
            worker.state.next_restart_at = None;
            worker.restart_at = None;
        }

        info!(
            "Supervisor stopped ({} clean, {} forced)",
            summary.stopped.len(),
            summary.timeouts.len()
        );
        summary
    }

    pub async fn status(&self) -> Vec<WorkerState> {
        self.workers
            .lock()
            .await
            .iter()
            .map(|w| w.state.clone())
            .collect()
    }
}

/// Runs a [`Supervisor`] inside the daemon lifecycle: starts the workers and
/// the monitor task, then stops both on shutdown.
pub struct SupervisorService {
    supervisor: Arc<Supervisor>,
    monitor: Option<JoinHandle<()>>,
}

impl SupervisorService {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            monitor: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for SupervisorService {
    async fn on_start(&mut self) -> Result<()> {
        self.supervisor.start().await?;
        let supervisor = self.supervisor.clone();
        self.monitor = Some(tokio::spawn(async move {
            supervisor.monitor_loop().await;
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        let summary = self.supervisor.stop().await;
        for timeout in &summary.timeouts {
            warn!("Shutdown: {}", timeout);
        }
        if let Some(handle) = self.monitor.take() {
            handle.await?;
        }
        Ok(())
    }
}
