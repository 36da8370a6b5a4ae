use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker '{worker}': {source}")]
    SpawnFailed {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker '{worker}' did not exit within {grace:?}; killed")]
    ShutdownTimeout { worker: String, grace: Duration },

    #[error("failed to signal worker '{worker}': {source}")]
    TerminateFailed {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("supervisor has already been stopped")]
    AlreadyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    #[default]
    Always,
    OnFailure,
    Never,
}

fn default_max_rapid_failures() -> u32 {
    5
}

fn default_backoff_initial_secs() -> f64 {
    1.0
}

fn default_backoff_max_secs() -> f64 {
    60.0
}

fn default_stable_after_secs() -> f64 {
    30.0
}

/// Non-positive and NaN values mean no delay; anything too large for a
/// `Duration` saturates.
pub(crate) fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default)]
    pub mode: RestartMode,
    /// Consecutive rapid failures before the worker is given up on. Zero
    /// means never give up.
    #[serde(default = "default_max_rapid_failures")]
    pub max_rapid_failures: u32,
    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: f64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
    /// A run at least this long resets the rapid-failure count.
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: f64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            mode: RestartMode::default(),
            max_rapid_failures: default_max_rapid_failures(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            stable_after_secs: default_stable_after_secs(),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart attempt `attempt` (1-based). The first restart is
    /// immediate; later ones double from `backoff_initial` up to `backoff_max`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 2).min(20);
        secs(self.backoff_initial_secs)
            .saturating_mul(factor)
            .min(secs(self.backoff_max_secs))
    }

    pub fn stable_after(&self) -> Duration {
        secs(self.stable_after_secs)
    }

    pub fn gives_up_after(&self, rapid_failures: u32) -> bool {
        self.max_rapid_failures > 0 && rapid_failures >= self.max_rapid_failures
    }
}

/// Static launch descriptor for one supervised process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Pause after this worker is spawned before the next one is.
    #[serde(default)]
    pub start_delay_secs: f64,
    #[serde(default)]
    pub restart: RestartPolicy,
}

impl WorkerSpec {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            start_delay_secs: 0.0,
            restart: RestartPolicy::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    pub fn start_delay(&self) -> Duration {
        secs(self.start_delay_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Starting,
    Running,
    Exited,
    Restarting,
    Stopped,
    GaveUp,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerPhase::Starting => "starting",
            WorkerPhase::Running => "running",
            WorkerPhase::Exited => "exited",
            WorkerPhase::Restarting => "restarting",
            WorkerPhase::Stopped => "stopped",
            WorkerPhase::GaveUp => "gave_up",
        };
        f.write_str(s)
    }
}

/// Runtime view of one worker, as reported by `Supervisor::status`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerState {
    pub name: String,
    pub phase: WorkerPhase,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub rapid_failures: u32,
    pub next_restart_at: Option<DateTime<Utc>>,
}

impl WorkerState {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            phase: WorkerPhase::Starting,
            pid: None,
            started_at: None,
            restart_count: 0,
            last_exit_code: None,
            rapid_failures: 0,
            next_restart_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == WorkerPhase::Running
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    /// Directory receiving `<worker>.log`. Output is discarded when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
            log_dir: None,
        }
    }
}

/// Outcome of `Supervisor::stop`.
#[derive(Debug, Default)]
pub struct ShutdownSummary {
    /// Workers that exited within the grace period.
    pub stopped: Vec<String>,
    /// Workers that had to be killed, as `SupervisorError::ShutdownTimeout`.
    pub timeouts: Vec<SupervisorError>,
    pub signal_failures: Vec<SupervisorError>,
}
