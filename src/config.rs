//! Daemon configuration loading from environment variables.
//!
//! All configuration values are loaded from `THUMBD_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `THUMBD_LIFO_THREADS` | 0 | Foreground pool threads (0 = one per processor) |
//! | `THUMBD_THRESHOLD` | 20 | Elements per request routed to the small pool |
//! | `THUMBD_THRESHOLD_THREADS` | 2 | Threads in each threshold pool |
//! | `THUMBD_WORKER_TIMEOUT` | 60 | Seconds to wait for one worker invocation |
//! | `THUMBD_DEFAULT_SCHEDULER` | foreground | Scheduler for unknown/empty names |
//! | `THUMBD_LOG_LEVEL` | info | Log filter |
//! | `THUMBD_LOG_FORMAT` | json | `json` or `pretty` |
//! | `THUMBD_LOG_FILE` | (unset) | Append logs to this file instead of stderr |
//! | `THUMBD_OVERRIDES` | (unset) | Preferred-worker overrides file (TOML) |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{ThresholdConfig, DEFAULT_THRESHOLD};
use crate::telemetry::{LogConfig, LogFormat, LogSink};
use crate::worker::WorkerId;

pub const FOREGROUND: &str = "foreground";
pub const BACKGROUND: &str = "background";
pub const THRESHOLD: &str = "threshold";

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub lifo_threads: usize,
    pub threshold: usize,
    pub threshold_threads: usize,
    pub worker_timeout_secs: u64,
    pub default_scheduler: String,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<PathBuf>,
    pub overrides_path: Option<PathBuf>,
}

/// All daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Foreground pool size, 0 = one thread per processor.
    pub lifo_threads: usize,
    pub threshold: ThresholdConfig,
    pub worker_timeout: Duration,
    pub default_scheduler: String,
    pub log: LogConfig,
    pub overrides_path: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            lifo_threads: 0,
            threshold: ThresholdConfig::default(),
            worker_timeout: Duration::from_secs(60),
            default_scheduler: FOREGROUND.to_string(),
            log: LogConfig::default(),
            overrides_path: None,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a non-empty string env var.
fn parse_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load_threshold_config() -> ThresholdConfig {
    let threshold = parse_usize("THUMBD_THRESHOLD", DEFAULT_THRESHOLD);
    let threads = parse_usize("THUMBD_THRESHOLD_THREADS", 2);
    ThresholdConfig {
        threshold: threshold.max(1),
        threads_per_pool: threads.clamp(1, 64),
    }
}

fn load_log_config() -> LogConfig {
    let level = parse_string("THUMBD_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let format = parse_string("THUMBD_LOG_FORMAT")
        .and_then(|f| LogFormat::from_name(&f))
        .unwrap_or_default();
    let sink = parse_string("THUMBD_LOG_FILE").map_or(LogSink::Stderr, |p| LogSink::File(p.into()));
    LogConfig { format, level, sink }
}

fn load_default_scheduler() -> String {
    match parse_string("THUMBD_DEFAULT_SCHEDULER") {
        Some(name) if [FOREGROUND, BACKGROUND, THRESHOLD].contains(&name.as_str()) => name,
        _ => FOREGROUND.to_string(),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let lifo_threads = parse_usize("THUMBD_LIFO_THREADS", 0).min(256);
    let timeout_secs = parse_u64("THUMBD_WORKER_TIMEOUT", 60).max(1);

    EnvConfig {
        lifo_threads,
        threshold: load_threshold_config(),
        worker_timeout: Duration::from_secs(timeout_secs),
        default_scheduler: load_default_scheduler(),
        log: load_log_config(),
        overrides_path: parse_string("THUMBD_OVERRIDES").map(PathBuf::from),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            lifo_threads: self.lifo_threads,
            threshold: self.threshold.threshold,
            threshold_threads: self.threshold.threads_per_pool,
            worker_timeout_secs: self.worker_timeout.as_secs(),
            default_scheduler: self.default_scheduler.clone(),
            log_level: self.log.level.clone(),
            log_format: self.log.format.name().to_string(),
            log_file: match &self.log.sink {
                LogSink::Stderr => None,
                LogSink::File(path) => Some(path.clone()),
            },
            overrides_path: self.overrides_path.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Administrator overrides of the registry's natural ordering.
///
/// ```toml
/// [preferred]
/// "file-image/png" = "pixbuf"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Overrides {
    /// Hash key -> preferred worker id.
    #[serde(default)]
    pub preferred: BTreeMap<String, String>,
}

impl Overrides {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Entries ready for [`crate::registry::Registry::apply_preferred`].
    pub fn into_preferred(self) -> impl Iterator<Item = (String, WorkerId)> {
        self.preferred.into_iter().map(|(key, id)| (key, WorkerId::new(id)))
    }
}

/// Read and parse an overrides file.
pub fn load_overrides(path: &Path) -> Result<Overrides, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    Overrides::parse(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}
