//! Background scheduler: one low-priority thread, results reported per request.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::context::{SchedulerContext, SchedulerDeps};
use super::request::{Request, RequestHandle};
use super::thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolError};
use super::Scheduler;
use crate::error::ErrorCode;

/// Bulk scheduler that trades latency for fewer messages to the caller.
///
/// All results of a request are accumulated and sent as at most one `ready`
/// and one `error` event once every element was attempted.
pub struct GroupedScheduler {
    inner: Arc<Inner>,
    pool: ThreadPool,
}

struct Inner {
    ctx: SchedulerContext,
    priority_lowered: AtomicBool,
}

impl GroupedScheduler {
    pub fn new(name: &str, deps: SchedulerDeps) -> Result<Self, ThreadPoolError> {
        let pool = ThreadPool::new(ThreadPoolConfig::exclusive(name))?;
        tracing::info!(scheduler = name, "grouped scheduler ready");
        Ok(Self {
            inner: Arc::new(Inner {
                ctx: SchedulerContext::new(name, deps),
                priority_lowered: AtomicBool::new(false),
            }),
            pool,
        })
    }
}

impl Scheduler for GroupedScheduler {
    fn name(&self) -> &str {
        &self.inner.ctx.name
    }

    fn push(&self, request: Request) {
        let request = self.inner.ctx.admit(request);
        let inner = self.inner.clone();
        let task_request = request.clone();
        let submitted = self.pool.submit(Box::new(move || {
            if !inner.priority_lowered.swap(true, Ordering::AcqRel) {
                lower_thread_priority();
            }
            process(&inner.ctx, &task_request);
        }));
        if let Err(e) = submitted {
            tracing::warn!(handle = %request.handle(), error = %e, "request refused");
            self.inner.ctx.reject(&request);
        }
    }

    fn dequeue(&self, handle: RequestHandle) -> bool {
        self.inner.ctx.dequeue(handle)
    }

    fn cancel_by_mount(&self, mount_root: &Path) -> usize {
        self.inner.ctx.cancel_by_mount(mount_root)
    }

    fn live_requests(&self) -> usize {
        self.inner.ctx.live.len()
    }

    fn shutdown(&self) {
        let pending = self.inner.ctx.live.unqueue_all();
        tracing::info!(scheduler = %self.inner.ctx.name, pending, "scheduler shutting down");
        self.pool.shutdown();
    }
}

/// Failures collected over one request.
#[derive(Debug, Default)]
struct FailureBatch {
    uris: Vec<String>,
    code: Option<ErrorCode>,
    messages: Vec<String>,
}

impl FailureBatch {
    fn push(&mut self, uri: &str, code: ErrorCode, message: String) {
        self.uris.push(uri.to_string());
        self.code.get_or_insert(code);
        self.messages.push(message);
    }
}

fn process(ctx: &SchedulerContext, request: &Request) {
    ctx.run_request(request, || run(ctx, request));
}

/// Attempt every miss, then flush one `ready` and at most one `error`.
///
/// A request stopped during triage reports nothing. One stopped later still
/// flushes what was gathered before the stop.
fn run(ctx: &SchedulerContext, request: &Request) -> usize {
    let triage = ctx.triage(request);
    if request.should_stop() {
        tracing::debug!(handle = %request.handle(), "request dequeued during triage");
        return 0;
    }
    let mut ready: Vec<String> = triage
        .cached
        .iter()
        .map(|&i| request.elements()[i].uri().to_string())
        .collect();
    let mut failures = FailureBatch::default();

    for &index in &triage.missing {
        if request.should_stop() {
            break;
        }
        let element = &request.elements()[index];
        if element.is_cancelled() {
            continue;
        }
        match ctx.run_element(element) {
            Some(Ok(())) => ready.push(element.uri().to_string()),
            Some(Err(err)) => failures.push(element.uri(), err.code, err.message),
            None => {}
        }
    }

    let failed = failures.uris.len();
    ctx.signals.ready(request.handle(), request.origin(), ready);
    if let Some(code) = failures.code {
        // The first failure's code stands in for the whole batch.
        ctx.signals.error(
            request.handle(),
            request.origin(),
            failures.uris,
            code,
            failures.messages.join("\n"),
        );
    }
    failed
}

/// Drop the calling thread to low CPU and idle I/O priority.
#[cfg(unix)]
fn lower_thread_priority() {
    const NICE_LEVEL: libc::c_int = 10;

    // SAFETY: setpriority only reads its scalar arguments; `who == 0` targets
    // the calling thread on Linux and the calling process elsewhere.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, NICE_LEVEL) };
    if rc != 0 {
        tracing::debug!(error = %std::io::Error::last_os_error(), "failed to lower CPU priority");
    }

    #[cfg(target_os = "linux")]
    {
        const IOPRIO_WHO_PROCESS: libc::c_int = 1;
        const IOPRIO_CLASS_IDLE: libc::c_int = 3;
        const IOPRIO_CLASS_SHIFT: libc::c_int = 13;

        // SAFETY: ioprio_set takes three integers and touches no memory.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_ioprio_set,
                IOPRIO_WHO_PROCESS,
                0 as libc::c_int,
                IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT,
            )
        };
        if rc != 0 {
            tracing::debug!(error = %std::io::Error::last_os_error(), "failed to lower I/O priority");
        }
    }

    tracing::debug!("background thread priority lowered");
}

#[cfg(not(unix))]
fn lower_thread_priority() {
    tracing::debug!("thread priority adjustment not supported on this platform");
}
