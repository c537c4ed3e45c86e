//! Size-split scheduler: small and large requests get separate pools.

use std::path::Path;
use std::sync::Arc;

use super::context::{SchedulerContext, SchedulerDeps};
use super::lifo;
use super::request::{Request, RequestHandle};
use super::thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolError};
use super::Scheduler;

/// Default split point in elements per request.
pub const DEFAULT_THRESHOLD: usize = 20;

#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Requests with at most this many elements use the small pool.
    pub threshold: usize,
    /// Threads in each pool.
    pub threads_per_pool: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD, threads_per_pool: 2 }
    }
}

/// Which pool a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Small,
    Large,
}

/// Keeps one huge batch from starving many small ones and vice versa.
///
/// Both pools are stack ordered and process requests like the LIFO
/// scheduler. Pool threads are named `<name>-small-<n>` and
/// `<name>-large-<n>`.
pub struct ThresholdScheduler {
    ctx: Arc<SchedulerContext>,
    small: ThreadPool,
    large: ThreadPool,
    threshold: usize,
}

impl ThresholdScheduler {
    pub fn new(
        name: &str,
        config: ThresholdConfig,
        deps: SchedulerDeps,
    ) -> Result<Self, ThreadPoolError> {
        let threads = config.threads_per_pool.max(1);
        let small = ThreadPool::new(ThreadPoolConfig::interactive(&format!("{name}-small"), threads))?;
        let large = ThreadPool::new(ThreadPoolConfig::interactive(&format!("{name}-large"), threads))?;
        tracing::info!(
            scheduler = name,
            threshold = config.threshold,
            threads_per_pool = threads,
            "threshold scheduler ready"
        );
        Ok(Self {
            ctx: Arc::new(SchedulerContext::new(name, deps)),
            small,
            large,
            threshold: config.threshold,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Pool for a request with `elements` URIs.
    pub fn pool_for(&self, elements: usize) -> PoolKind {
        if elements <= self.threshold {
            PoolKind::Small
        } else {
            PoolKind::Large
        }
    }
}

impl Scheduler for ThresholdScheduler {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn push(&self, request: Request) {
        let kind = self.pool_for(request.len());
        tracing::debug!(handle = %request.handle(), elements = request.len(), pool = ?kind, "routing request");
        let pool = match kind {
            PoolKind::Small => &self.small,
            PoolKind::Large => &self.large,
        };
        lifo::submit(&self.ctx, pool, request);
    }

    fn dequeue(&self, handle: RequestHandle) -> bool {
        self.ctx.dequeue(handle)
    }

    fn cancel_by_mount(&self, mount_root: &Path) -> usize {
        self.ctx.cancel_by_mount(mount_root)
    }

    fn live_requests(&self) -> usize {
        self.ctx.live.len()
    }

    fn shutdown(&self) {
        let pending = self.ctx.live.unqueue_all();
        tracing::info!(scheduler = %self.ctx.name, pending, "scheduler shutting down");
        self.small.shutdown();
        self.large.shutdown();
    }
}
