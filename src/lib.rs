//! thumbd core
//!
//! Request scheduling for a thumbnail generation daemon. Clients queue
//! batches of URIs; each URI is matched to the best registered worker and
//! the batch is handed to one of several scheduling policies, which report
//! progress back as per-request events.
//!
//! # Components
//!
//! - [`registry`]: workers indexed by URI scheme and MIME type, ranked
//! - [`scheduler`]: LIFO, grouped and threshold policies over thread pools
//! - [`dispatch`]: builds requests from client submissions and routes them
//! - [`cache`]: the thumbnail cache contract consulted before any work
//!
//! The transport layer (message bus, client tracking) sits outside this
//! crate and consumes the [`scheduler::EventReceiver`] returned by
//! [`Daemon::new`].

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use cache::ThumbnailCache;
use dispatch::{DispatchError, Dispatcher};
use registry::Registry;
use scheduler::{
    event_channel, EventReceiver, GroupedScheduler, LifoScheduler, Scheduler, SchedulerDeps,
    Signals, ThreadPoolError, ThresholdConfig, ThresholdScheduler,
};

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Foreground pool size, 0 = one thread per processor.
    pub lifo_threads: usize,
    pub threshold: ThresholdConfig,
    pub worker_timeout: Duration,
    pub default_scheduler: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            lifo_threads: 0,
            threshold: ThresholdConfig::default(),
            worker_timeout: Duration::from_secs(60),
            default_scheduler: config::FOREGROUND.to_string(),
        }
    }
}

impl From<&config::EnvConfig> for DaemonConfig {
    fn from(env: &config::EnvConfig) -> Self {
        Self {
            lifo_threads: env.lifo_threads,
            threshold: env.threshold.clone(),
            worker_timeout: env.worker_timeout,
            default_scheduler: env.default_scheduler.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to start scheduler pool: {0}")]
    Pool(#[from] ThreadPoolError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// The thumbnail daemon instance.
pub struct Daemon {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
}

impl Daemon {
    /// Build the registry, the `foreground`, `background` and `threshold`
    /// schedulers and the dispatcher. All scheduler events arrive on the
    /// returned receiver.
    pub fn new(
        config: DaemonConfig,
        cache: Arc<dyn ThumbnailCache>,
    ) -> Result<(Self, EventReceiver), DaemonError> {
        let (events, rx) = event_channel();
        let deps = SchedulerDeps {
            cache: cache.clone(),
            events: events.clone(),
            worker_timeout: config.worker_timeout,
        };

        let schedulers: Vec<Arc<dyn Scheduler>> = vec![
            Arc::new(LifoScheduler::new(config::FOREGROUND, config.lifo_threads, deps.clone())?),
            Arc::new(GroupedScheduler::new(config::BACKGROUND, deps.clone())?),
            Arc::new(ThresholdScheduler::new(config::THRESHOLD, config.threshold, deps)?),
        ];

        let registry = Arc::new(Registry::new());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            cache,
            schedulers,
            &config.default_scheduler,
            Signals::new(events),
        )?;

        tracing::info!(
            schedulers = ?dispatcher.get_schedulers(),
            default_scheduler = dispatcher.default_scheduler(),
            "daemon ready"
        );
        Ok((Self { registry, dispatcher }, rx))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop every scheduler; live requests still receive `finished`.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn daemon_exposes_three_schedulers() {
        let config = DaemonConfig { lifo_threads: 1, ..Default::default() };
        let (daemon, _rx) = Daemon::new(config, Arc::new(MemoryCache::new())).unwrap();
        assert_eq!(
            daemon.dispatcher().get_schedulers(),
            vec!["foreground", "background", "threshold"]
        );
        assert_eq!(daemon.dispatcher().default_scheduler(), "foreground");
        assert!(daemon.registry().is_empty());
        daemon.shutdown();
    }

    #[test]
    fn unknown_default_scheduler_is_rejected() {
        let config = DaemonConfig {
            lifo_threads: 1,
            default_scheduler: "nonexistent".into(),
            ..Default::default()
        };
        let result = Daemon::new(config, Arc::new(MemoryCache::new()));
        assert!(matches!(
            result,
            Err(DaemonError::Dispatch(DispatchError::NoScheduler(_)))
        ));
    }
}
