//! Live request table of one scheduler, keyed by handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::request::{Request, RequestHandle};

/// Requests a scheduler owns from `push` until their `finished` event.
///
/// The table's mutex is the "scheduler lock": request flags are only
/// flipped while it is held.
#[derive(Default)]
pub(crate) struct LiveRequests {
    requests: Mutex<HashMap<RequestHandle, Arc<Request>>>,
}

impl LiveRequests {
    pub(crate) fn insert(&self, request: Arc<Request>) {
        let handle = request.handle();
        let previous = self.requests.lock().insert(handle, request);
        assert!(previous.is_none(), "request handle {handle} collided with a live request");
    }

    pub(crate) fn remove(&self, handle: RequestHandle) -> Option<Arc<Request>> {
        self.requests.lock().remove(&handle)
    }

    /// Mark the request with `handle` dequeued. Returns false if not live.
    pub(crate) fn dequeue(&self, handle: RequestHandle) -> bool {
        let requests = self.requests.lock();
        match requests.get(&handle) {
            Some(request) => {
                request.mark_dequeued();
                true
            }
            None => false,
        }
    }

    /// Cancel every element located under `mount_root`. Returns the count.
    pub(crate) fn cancel_by_mount(&self, mount_root: &Path) -> usize {
        let requests = self.requests.lock();
        requests
            .values()
            .map(|r| r.cancel_element_if(|info| info.is_under(mount_root)))
            .sum()
    }

    /// Mark every live request unqueued (shutdown).
    pub(crate) fn unqueue_all(&self) -> usize {
        let requests = self.requests.lock();
        for request in requests.values() {
            request.mark_unqueued();
        }
        requests.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.lock().len()
    }
}
