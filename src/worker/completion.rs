//! One-shot completion handed to a worker for a single invocation.
//!
//! The pool thread blocks on [`CompletionWait::wait`] until the worker
//! resolves the completion, the bound expires, or the element's
//! cancellation token fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cache::Thumbnail;
use crate::error::{ErrorCode, ThumbnailError};

/// Fallback re-check of the cancellation token for cancels that bypass the
/// element's [`WaitWaker`] (e.g. a worker cancelling its own job token).
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Terminal outcome of one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Ready(Thumbnail),
    Failed(ThumbnailError),
}

/// What the waiting pool thread observed.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    Outcome(WorkerOutcome),
    TimedOut,
    Cancelled,
}

struct Slot {
    outcome: Mutex<Option<WorkerOutcome>>,
    resolved: Condvar,
}

/// Worker side of the one-shot.
pub struct Completion {
    slot: Option<Arc<Slot>>,
}

/// Scheduler side of the one-shot.
pub struct CompletionWait {
    slot: Arc<Slot>,
}

impl Completion {
    /// Create a connected completion/wait pair.
    pub fn pair() -> (Completion, CompletionWait) {
        let slot = Arc::new(Slot { outcome: Mutex::new(None), resolved: Condvar::new() });
        (Completion { slot: Some(slot.clone()) }, CompletionWait { slot })
    }

    pub fn ready(mut self, thumbnail: Thumbnail) {
        self.resolve(WorkerOutcome::Ready(thumbnail));
    }

    pub fn error(mut self, code: ErrorCode, message: impl Into<String>) {
        self.resolve(WorkerOutcome::Failed(ThumbnailError::new(code, message)));
    }

    fn resolve(&mut self, outcome: WorkerOutcome) {
        if let Some(slot) = self.slot.take() {
            *slot.outcome.lock() = Some(outcome);
            slot.resolved.notify_all();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.resolve(WorkerOutcome::Failed(ThumbnailError::new(
            ErrorCode::Internal,
            "Worker finished without reporting a result",
        )));
    }
}

/// Wakes a blocked [`CompletionWait::wait`] so it re-checks cancellation.
#[derive(Clone)]
pub struct WaitWaker {
    slot: Arc<Slot>,
}

impl WaitWaker {
    pub fn wake(&self) {
        // Notify under the slot lock so a waiter between its cancellation
        // check and `wait_for` cannot miss it.
        let _outcome = self.slot.outcome.lock();
        self.slot.resolved.notify_all();
    }
}

impl std::fmt::Debug for WaitWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WaitWaker")
    }
}

impl CompletionWait {
    /// Handle for waking this wait from the thread that cancels the job.
    pub fn waker(&self) -> WaitWaker {
        WaitWaker { slot: self.slot.clone() }
    }

    /// Block until an outcome arrives, `timeout` elapses or `cancel` fires.
    ///
    /// An outcome that is already present wins over cancellation.
    pub fn wait(self, timeout: Duration, cancel: &CancellationToken) -> WaitResult {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.slot.outcome.lock();
        loop {
            if let Some(o) = outcome.take() {
                return WaitResult::Outcome(o);
            }
            if cancel.is_cancelled() {
                return WaitResult::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitResult::TimedOut;
            }
            let slice = (deadline - now).min(CANCEL_POLL);
            self.slot.resolved.wait_for(&mut outcome, slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn thumb() -> Thumbnail {
        Thumbnail { width: 2, height: 2, has_alpha: true, pixels: vec![0; 16] }
    }

    #[test]
    fn synchronous_resolution() {
        let (completion, wait) = Completion::pair();
        completion.ready(thumb());
        let result = wait.wait(Duration::from_secs(1), &CancellationToken::new());
        assert_eq!(result, WaitResult::Outcome(WorkerOutcome::Ready(thumb())));
    }

    #[test]
    fn resolution_from_another_thread() {
        let (completion, wait) = Completion::pair();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            completion.error(ErrorCode::InvalidFormat, "bad header");
        });
        let result = wait.wait(Duration::from_secs(2), &CancellationToken::new());
        t.join().unwrap();
        match result {
            WaitResult::Outcome(WorkerOutcome::Failed(e)) => {
                assert_eq!(e.code, ErrorCode::InvalidFormat);
                assert_eq!(e.message, "bad header");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dropped_completion_reports_internal_error() {
        let (completion, wait) = Completion::pair();
        drop(completion);
        match wait.wait(Duration::from_secs(1), &CancellationToken::new()) {
            WaitResult::Outcome(WorkerOutcome::Failed(e)) => assert_eq!(e.code, ErrorCode::Internal),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn times_out_when_unresolved() {
        let (completion, wait) = Completion::pair();
        let start = Instant::now();
        let result = wait.wait(Duration::from_millis(50), &CancellationToken::new());
        assert_eq!(result, WaitResult::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
        drop(completion);
    }

    #[test]
    fn cancellation_interrupts_wait() {
        let (completion, wait) = Completion::pair();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.cancel();
        });
        let start = Instant::now();
        let result = wait.wait(Duration::from_secs(10), &cancel);
        t.join().unwrap();
        assert_eq!(result, WaitResult::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        drop(completion);
    }

    #[test]
    fn waker_interrupts_wait_promptly() {
        let (completion, wait) = Completion::pair();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let waker = wait.waker();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.cancel();
            waker.wake();
        });
        let start = Instant::now();
        let result = wait.wait(Duration::from_secs(10), &cancel);
        t.join().unwrap();
        assert_eq!(result, WaitResult::Cancelled);
        assert!(start.elapsed() < CANCEL_POLL);
        drop(completion);
    }
}
