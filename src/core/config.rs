use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::core::consolidator::ConsolidatorConfig;
use crate::core::store::{TrackKind, TrackRegistry};
use crate::core::supervisor::{SupervisorSettings, WorkerSpec};
use crate::platform::{NativePlatform, Platform};

pub const CONFIG_FILE_NAME: &str = "trackd.toml";

const NAME_PATTERN: &str = "^[a-z][a-z0-9_]{0,63}$";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackdConfig {
    /// Data root; the platform default (or `TRACKD_DATA_DIR`) when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub consolidator: ConsolidatorConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_tracks")]
    pub tracks: Vec<TrackConfig>,

    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Bearer token for admin routes. Without one, admin routes only answer
    /// when the API is bound to loopback.
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Six-field cron expression for the daemon's periodic cleanup.
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    pub kind: TrackKind,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    17900
}
fn default_poll_interval_secs() -> f64 {
    30.0
}
fn default_grace_period_secs() -> f64 {
    5.0
}
fn default_keep_days() -> u32 {
    7
}
fn default_log_level() -> String {
    "info".to_string()
}

fn default_tracks() -> Vec<TrackConfig> {
    [
        ("alpha_discovery", TrackKind::Discovery),
        ("market_analysis", TrackKind::Market),
        ("sentiment_analysis", TrackKind::Sentiment),
        ("technical_analysis", TrackKind::Technical),
        ("risk_assessment", TrackKind::Risk),
        ("deep_research", TrackKind::Research),
    ]
    .into_iter()
    .map(|(name, kind)| TrackConfig {
        name: name.to_string(),
        kind,
    })
    .collect()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            admin_token: None,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            schedule: None,
            keep_days: default_keep_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TrackdConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            api: ApiConfig::default(),
            consolidator: ConsolidatorConfig::default(),
            supervisor: SupervisorConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
            tracks: default_tracks(),
            workers: Vec::new(),
        }
    }
}

impl TrackdConfig {
    pub fn default_path() -> PathBuf {
        NativePlatform::data_dir().join(CONFIG_FILE_NAME)
    }

    /// Load and validate `path`. A missing file yields the defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No {} found at {}, using defaults.", CONFIG_FILE_NAME, path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: TrackdConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        info!(
            "Loaded config: {} track(s), {} worker(s), api={}:{}",
            config.tracks.len(),
            config.workers.len(),
            config.api.host,
            config.api.port
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let name_re =
            Regex::new(NAME_PATTERN).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.tracks.is_empty() {
            return Err(ConfigError::Invalid("at least one track is required".into()));
        }
        let mut seen = HashSet::new();
        for track in &self.tracks {
            if !name_re.is_match(&track.name) {
                return Err(ConfigError::Invalid(format!(
                    "track name '{}' must match {}",
                    track.name, NAME_PATTERN
                )));
            }
            if !seen.insert(track.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate track '{}'",
                    track.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if !name_re.is_match(&worker.name) {
                return Err(ConfigError::Invalid(format!(
                    "worker name '{}' must match {}",
                    worker.name, NAME_PATTERN
                )));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate worker '{}'",
                    worker.name
                )));
            }
            if worker.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "worker '{}' has an empty command",
                    worker.name
                )));
            }
        }

        for (label, value) in [
            ("supervisor.poll_interval_secs", self.supervisor.poll_interval_secs),
            ("supervisor.grace_period_secs", self.supervisor.grace_period_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a positive number of seconds",
                    label
                )));
            }
        }

        if let Some(schedule) = &self.retention.schedule
            && schedule.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "retention.schedule must not be empty when set".into(),
            ));
        }
        Ok(())
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(NativePlatform::data_dir)
    }

    pub fn registry(&self) -> TrackRegistry {
        let mut registry = TrackRegistry::new();
        for track in &self.tracks {
            registry.register(track.name.clone(), track.kind);
        }
        registry
    }

    pub fn supervisor_settings(&self, data_dir: &Path) -> SupervisorSettings {
        SupervisorSettings {
            poll_interval: Duration::try_from_secs_f64(self.supervisor.poll_interval_secs)
                .unwrap_or(Duration::from_secs(30)),
            grace_period: Duration::try_from_secs_f64(self.supervisor.grace_period_secs)
                .unwrap_or(Duration::from_secs(5)),
            log_dir: Some(data_dir.join("logs")),
        }
    }
}
