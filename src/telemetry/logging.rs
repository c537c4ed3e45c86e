//! Daemon log output.
//!
//! `thumbd` usually runs under a session manager that captures stderr, so
//! that is the default sink. A log file is opened in append mode to survive
//! daemon restarts.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for journald and log shippers.
    #[default]
    Json,
    /// Multi-line human output for running `thumbd serve` in a terminal.
    Pretty,
}

impl LogFormat {
    /// Parse a format name; unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogSink {
    #[default]
    Stderr,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `info` or `thumbd_core::scheduler=debug`.
    pub level: String,
    pub sink: LogSink,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { format: LogFormat::Json, level: "info".to_string(), sink: LogSink::Stderr }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter {directives:?}: {reason}")]
    InvalidFilter { directives: String, reason: String },
    #[error("Cannot open log file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the process-wide subscriber. Call once, before the daemon starts.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter {
        directives: config.level.clone(),
        reason: e.to_string(),
    })?;
    let writer = make_writer(&config.sink)?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_writer(writer)).try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn make_writer(sink: &LogSink) -> Result<BoxMakeWriter, LogError> {
    match sink {
        LogSink::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
        LogSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LogError::FileOpen { path: path.clone(), source })?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
    }
}
