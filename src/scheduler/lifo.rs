//! Interactive scheduler: newest request first, results streamed per URI.

use std::path::Path;
use std::sync::Arc;

use super::context::{SchedulerContext, SchedulerDeps};
use super::request::{Request, RequestHandle};
use super::thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolError};
use super::Scheduler;

/// Low-latency scheduler for requests a user is waiting on.
///
/// One stack-ordered pool: a request pushed last is picked up first, so the
/// folder currently on screen wins over the ones scrolled past.
pub struct LifoScheduler {
    ctx: Arc<SchedulerContext>,
    pool: ThreadPool,
}

impl LifoScheduler {
    /// `threads == 0` sizes the pool to the number of processors.
    pub fn new(name: &str, threads: usize, deps: SchedulerDeps) -> Result<Self, ThreadPoolError> {
        let pool = ThreadPool::new(ThreadPoolConfig::interactive(name, threads))?;
        tracing::info!(scheduler = name, threads = pool.num_threads(), "LIFO scheduler ready");
        Ok(Self { ctx: Arc::new(SchedulerContext::new(name, deps)), pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }
}

impl Scheduler for LifoScheduler {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn push(&self, request: Request) {
        submit(&self.ctx, &self.pool, request);
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
        self.pool.shutdown();
    }
}

/// Admit `request` and queue it on `pool` for per-URI processing.
pub(super) fn submit(ctx: &Arc<SchedulerContext>, pool: &ThreadPool, request: Request) {
    let request = ctx.admit(request);
    let task_ctx = ctx.clone();
    let task_request = request.clone();
    if let Err(e) = pool.submit(Box::new(move || process(&task_ctx, &task_request))) {
        tracing::warn!(scheduler = %ctx.name, handle = %request.handle(), error = %e, "request refused");
        ctx.reject(&request);
    }
}

/// Process one request, reporting every URI as soon as it is done.
///
/// Cache hits go out as one batch after triage. Misses are then handled in
/// reverse triage order, one worker invocation each.
pub(super) fn process(ctx: &SchedulerContext, request: &Request) {
    ctx.run_request(request, || run(ctx, request));
}

fn run(ctx: &SchedulerContext, request: &Request) -> usize {
    let triage = ctx.triage(request);
    if request.should_stop() {
        tracing::debug!(handle = %request.handle(), "request dequeued during triage");
        return 0;
    }
    let cached = triage
        .cached
        .iter()
        .map(|&i| request.elements()[i].uri().to_string())
        .collect();
    ctx.signals.ready(request.handle(), request.origin(), cached);

    let mut failed = 0usize;
    for &index in triage.missing.iter().rev() {
        if request.should_stop() {
            tracing::debug!(handle = %request.handle(), "request dequeued mid-processing");
            break;
        }
        let element = &request.elements()[index];
        if element.is_cancelled() {
            continue;
        }

        match ctx.run_element(element) {
            Some(Ok(())) => {
                ctx.signals
                    .ready(request.handle(), request.origin(), vec![element.uri().to_string()]);
                // One worker per URI: nothing else may touch this element now.
                element.cancel();
            }
            Some(Err(err)) => {
                failed += 1;
                ctx.signals.error(
                    request.handle(),
                    request.origin(),
                    vec![element.uri().to_string()],
                    err.code,
                    err.message,
                );
            }
            None => {}
        }
    }
    failed
}
