//! State and per-element routines shared by every scheduling policy.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::event::{EventSender, Signals};
use super::live::LiveRequests;
use super::request::{Element, Request, RequestHandle, Target};
use crate::cache::ThumbnailCache;
use crate::error::{ErrorCode, ThumbnailError};
use crate::telemetry::{self, RequestSpan};
use crate::worker::{Completion, WaitResult, WorkerJob, WorkerOutcome};

/// Collaborators every scheduler needs.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub cache: Arc<dyn ThumbnailCache>,
    pub events: EventSender,
    /// Bound on waiting for one worker invocation.
    pub worker_timeout: Duration,
}

/// Result of sorting a request's elements into cache hits and misses.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Triage {
    /// Indices of fresh elements, in submission order.
    pub cached: Vec<usize>,
    /// Indices of elements needing work, in submission order.
    pub missing: Vec<usize>,
}

pub(crate) struct SchedulerContext {
    pub name: String,
    pub cache: Arc<dyn ThumbnailCache>,
    pub signals: Signals,
    pub worker_timeout: Duration,
    pub live: LiveRequests,
}

impl SchedulerContext {
    pub(crate) fn new(name: &str, deps: SchedulerDeps) -> Self {
        Self {
            name: name.to_string(),
            cache: deps.cache,
            signals: Signals::new(deps.events),
            worker_timeout: deps.worker_timeout,
            live: LiveRequests::default(),
        }
    }

    /// Take ownership of a pushed request and register it as live.
    pub(crate) fn admit(&self, request: Request) -> Arc<Request> {
        let bound = request.attach(&self.name);
        assert!(bound, "request {} already belongs to a scheduler", request.handle());

        telemetry::record_request_pushed(&self.name, request.len());
        let request = Arc::new(request);
        self.live.insert(request.clone());
        tracing::debug!(
            scheduler = %self.name,
            handle = %request.handle(),
            elements = request.len(),
            "request queued"
        );
        request
    }

    /// Emit `started` unless the request was stopped before it ran.
    pub(crate) fn begin(&self, request: &Request) -> bool {
        if request.should_stop() {
            tracing::debug!(handle = %request.handle(), "request skipped before start");
            return false;
        }
        self.signals.started(request.handle(), request.origin());
        true
    }

    /// Start `request`, run `body` on it and emit `finished` no matter what.
    ///
    /// `body` returns the number of failed elements. A panic escaping it is
    /// logged and ends the request early.
    pub(crate) fn run_request<F>(&self, request: &Request, body: F)
    where
        F: FnOnce() -> usize,
    {
        let span = RequestSpan::new(request.handle(), &self.name, request.len());
        let _entered = span.enter();

        if self.begin(request) {
            match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(failed) => span.record_outcome(failed),
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::error!(handle = %request.handle(), reason = %reason, "request processing panicked");
                    span.record_panic(&reason);
                }
            }
        }
        self.finish(request);
    }

    /// Drop the request from the live table and emit its `finished` event.
    pub(crate) fn finish(&self, request: &Request) {
        self.live.remove(request.handle());
        self.signals.finished(request.handle(), request.origin());
    }

    /// Pool refused the request: finish it without processing.
    pub(crate) fn reject(&self, request: &Request) {
        request.mark_unqueued();
        self.finish(request);
    }

    pub(crate) fn dequeue(&self, handle: RequestHandle) -> bool {
        let found = self.live.dequeue(handle);
        if found {
            telemetry::record_dequeue(&self.name);
            tracing::debug!(scheduler = %self.name, %handle, "request dequeued");
        }
        found
    }

    pub(crate) fn cancel_by_mount(&self, mount_root: &Path) -> usize {
        let cancelled = self.live.cancel_by_mount(mount_root);
        if cancelled > 0 {
            tracing::debug!(
                scheduler = %self.name,
                mount = %mount_root.display(),
                cancelled,
                "elements cancelled for unmount"
            );
        }
        cancelled
    }

    /// Sort the live elements into cache hits and misses.
    ///
    /// Cancelled elements are skipped; a stopped request ends triage early.
    /// Rejected elements go straight to the miss list without a cache lookup.
    pub(crate) fn triage(&self, request: &Request) -> Triage {
        let mut triage = Triage::default();
        for (index, element) in request.elements().iter().enumerate() {
            if request.should_stop() {
                break;
            }
            if element.is_cancelled() {
                continue;
            }
            if matches!(element.target(), Target::Rejected(_)) {
                triage.missing.push(index);
                continue;
            }
            let info = element.info();
            if self.cache.needs_update(info.uri(), info.flavor(), info.mtime()) {
                triage.missing.push(index);
            } else {
                triage.cached.push(index);
            }
        }
        telemetry::record_cache_hits(&self.name, triage.cached.len());
        triage
    }

    /// Produce a thumbnail for one cache miss.
    ///
    /// `None` means the element was cancelled while its worker ran and no
    /// outcome should be reported.
    pub(crate) fn run_element(&self, element: &Element) -> Option<Result<(), ThumbnailError>> {
        let info = element.info();
        let worker = match element.target() {
            Target::Rejected(err) => return Some(Err(err.clone())),
            Target::Unsupported => return Some(Err(ThumbnailError::unsupported(info.uri()))),
            Target::Worker(worker) => worker,
        };

        let (completion, wait) = Completion::pair();
        let job = WorkerJob {
            uri: info.uri().to_string(),
            mime_type: info.mime_type().to_string(),
            flavor: info.flavor(),
            cancel: element.cancel_token().clone(),
        };
        tracing::debug!(worker = %worker.id(), uri = info.uri(), "invoking worker");
        element.set_waiter(Some(wait.waker()));
        let invoked = panic::catch_unwind(AssertUnwindSafe(|| worker.invoke(job, completion)));
        if let Err(payload) = invoked {
            element.set_waiter(None);
            let reason = panic_message(payload.as_ref());
            tracing::error!(worker = %worker.id(), uri = info.uri(), reason = %reason, "worker panicked");
            telemetry::record_element_outcome(&self.name, false);
            return Some(Err(ThumbnailError::new(
                ErrorCode::Internal,
                format!("Thumbnailer \"{}\" panicked: {reason}", worker.id()),
            )));
        }

        let waited = wait.wait(self.worker_timeout, element.cancel_token());
        element.set_waiter(None);
        if element.is_cancelled() && matches!(waited, WaitResult::Outcome(_)) {
            tracing::debug!(uri = info.uri(), "outcome for cancelled element dropped");
            return None;
        }

        let result = match waited {
            WaitResult::Outcome(WorkerOutcome::Ready(thumbnail)) => {
                match self.cache.save(info.uri(), info.flavor(), &thumbnail, info.mtime()) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        tracing::warn!(uri = info.uri(), error = %e, "cache write failed");
                        Err(ThumbnailError::new(ErrorCode::SaveFailed, e.to_string()))
                    }
                }
            }
            WaitResult::Outcome(WorkerOutcome::Failed(err)) => Err(err),
            WaitResult::TimedOut => {
                tracing::warn!(
                    worker = %worker.id(),
                    uri = info.uri(),
                    timeout_secs = self.worker_timeout.as_secs_f64(),
                    "worker did not respond"
                );
                Err(ThumbnailError::new(
                    ErrorCode::ConnectionFailed,
                    format!(
                        "Thumbnailer \"{}\" did not respond within {:?}",
                        worker.id(),
                        self.worker_timeout
                    ),
                ))
            }
            WaitResult::Cancelled => {
                tracing::debug!(uri = info.uri(), "element cancelled during invocation");
                return None;
            }
        };

        telemetry::record_element_outcome(&self.name, result.is_ok());
        Some(result)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
