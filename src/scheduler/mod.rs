//! Request scheduling for the thumbnail daemon.
//!
//! A [`Scheduler`] owns the requests pushed to it, runs them on its own
//! thread pools and reports progress as [`SchedulerEvent`]s. Three policies
//! are provided:
//!
//! - [`LifoScheduler`]: interactive, newest request first, per-URI results
//! - [`GroupedScheduler`]: background, one low-priority thread, batched results
//! - [`ThresholdScheduler`]: separate pools for small and large requests

mod context;
mod event;
mod grouped;
mod lifo;
mod live;
mod request;
mod thread_pool;
mod threshold;

use std::path::Path;

pub use context::SchedulerDeps;
pub use event::{event_channel, EventReceiver, EventSender, SchedulerEvent, Signals};
pub use grouped::GroupedScheduler;
pub use lifo::LifoScheduler;
pub use request::{Element, Origin, Request, RequestHandle, Target};
pub use thread_pool::{
    QueueOrder, Task, ThreadPool, ThreadPoolConfig, ThreadPoolError, ThreadPoolStats,
};
pub use threshold::{PoolKind, ThresholdConfig, ThresholdScheduler, DEFAULT_THRESHOLD};

/// A named request dispatcher.
///
/// Every pushed request produces exactly one `finished` event, after all
/// other events for its handle.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Take ownership of `request` and queue it. `started` is emitted when
    /// processing actually begins.
    fn push(&self, request: Request);

    /// Stop the live request with `handle`. A queued request is skipped, a
    /// running one stops before its next element. Returns false if the
    /// handle is not live here.
    fn dequeue(&self, handle: RequestHandle) -> bool;

    /// Cancel every live element located under `mount_root`; the rest of
    /// each request continues. Returns the number of cancelled elements.
    ///
    /// Only `file://` URIs have a local path to compare. Remote URIs are
    /// never matched, whatever their URL path looks like.
    fn cancel_by_mount(&self, mount_root: &Path) -> usize;

    /// Requests pushed but not yet finished.
    fn live_requests(&self) -> usize;

    /// Stop accepting work. Queued requests finish without processing.
    fn shutdown(&self);
}
