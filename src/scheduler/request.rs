//! Thumbnail request: a batch of URIs with their chosen workers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::ThumbnailError;
use crate::registry::FileInfo;
use crate::worker::{WaitWaker, Worker};

static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Caller-visible identifier of an in-flight request. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestHandle(u32);

impl RequestHandle {
    /// Allocate the next process-unique handle, skipping zero on wrap.
    pub fn allocate() -> Self {
        loop {
            let h = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
            if h != 0 {
                return Self(h);
            }
        }
    }

    /// Wrap a handle received from a client; zero means "no handle".
    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the client that submitted a request; results are routed back to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Origin(Arc<str>);

impl Origin {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What will handle one element.
#[derive(Debug, Clone)]
pub enum Target {
    Worker(Arc<dyn Worker>),
    /// No worker supports the URI scheme / MIME type.
    Unsupported,
    /// Refused before scheduling (e.g. the source is a thumbnail itself).
    Rejected(ThumbnailError),
}

impl From<Option<Arc<dyn Worker>>> for Target {
    fn from(worker: Option<Arc<dyn Worker>>) -> Self {
        worker.map_or(Self::Unsupported, Self::Worker)
    }
}

/// One URI of a request.
#[derive(Debug)]
pub struct Element {
    info: FileInfo,
    target: Target,
    cancel: CancellationToken,
    /// Set while a pool thread waits on this element's worker.
    waiter: Mutex<Option<WaitWaker>>,
}

impl Element {
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn uri(&self) -> &str {
        self.info.uri()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(waker) = self.waiter.lock().as_ref() {
            waker.wake();
        }
    }

    /// Register (`Some`) or clear (`None`) the wait to wake on cancellation.
    pub(crate) fn set_waiter(&self, waker: Option<WaitWaker>) {
        *self.waiter.lock() = waker;
    }
}

/// A unit of work owned by exactly one scheduler.
///
/// Elements are fixed at construction. The `dequeued` and `unqueued` flags
/// are only set by the owning scheduler while it holds its live-request lock.
pub struct Request {
    handle: RequestHandle,
    elements: Vec<Element>,
    origin: Origin,
    dequeued: AtomicBool,
    unqueued: AtomicBool,
    scheduler: OnceLock<String>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("handle", &self.handle)
            .field("origin", &self.origin)
            .field("elements", &self.elements.len())
            .field("dequeued", &self.is_dequeued())
            .finish()
    }
}

impl Request {
    /// Build a request with a freshly allocated handle.
    pub fn new(entries: Vec<(FileInfo, Target)>, origin: Origin) -> Self {
        let elements = entries
            .into_iter()
            .map(|(info, target)| Element {
                info,
                target,
                cancel: CancellationToken::new(),
                waiter: Mutex::new(None),
            })
            .collect();
        Self {
            handle: RequestHandle::allocate(),
            elements,
            origin,
            dequeued: AtomicBool::new(false),
            unqueued: AtomicBool::new(false),
            scheduler: OnceLock::new(),
        }
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Name of the owning scheduler, once pushed.
    pub fn scheduler(&self) -> Option<&str> {
        self.scheduler.get().map(String::as_str)
    }

    pub fn is_dequeued(&self) -> bool {
        self.dequeued.load(Ordering::Acquire)
    }

    pub fn is_unqueued(&self) -> bool {
        self.unqueued.load(Ordering::Acquire)
    }

    /// True once the request must not process further elements.
    pub fn should_stop(&self) -> bool {
        self.is_dequeued() || self.is_unqueued()
    }

    /// Bind the request to its scheduler. Returns false if already bound.
    pub(crate) fn attach(&self, scheduler: &str) -> bool {
        self.scheduler.set(scheduler.to_string()).is_ok()
    }

    /// Stop the request and cancel every element. Idempotent.
    pub(crate) fn mark_dequeued(&self) {
        self.dequeued.store(true, Ordering::Release);
        self.cancel_all();
    }

    /// Like [`Request::mark_dequeued`], for requests dropped at shutdown.
    pub(crate) fn mark_unqueued(&self) {
        self.unqueued.store(true, Ordering::Release);
        self.cancel_all();
    }

    /// Cancel the elements matching `predicate`, leaving the others alive.
    /// Returns how many elements were newly cancelled.
    pub fn cancel_element_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&FileInfo) -> bool,
    {
        let mut cancelled = 0;
        for element in &self.elements {
            if !element.is_cancelled() && predicate(&element.info) {
                element.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    fn cancel_all(&self) {
        for element in &self.elements {
            element.cancel();
        }
    }
}
