//! Dispatch glue between the transport layer and the schedulers.
//!
//! Builds requests from client submissions, picks each URI's worker through
//! the registry and routes the request to the named scheduler.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{Flavor, ThumbnailCache};
use crate::error::{ErrorCode, ThumbnailError};
use crate::registry::{FileInfo, Registry};
use crate::scheduler::{Origin, Request, RequestHandle, Scheduler, Signals, Target};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{uris} URIs but {mime_types} MIME types")]
    LengthMismatch { uris: usize, mime_types: usize },

    #[error("No URIs to thumbnail")]
    EmptyRequest,

    #[error("No scheduler named \"{0}\" is configured")]
    NoScheduler(String),
}

/// One client `queue` call.
#[derive(Debug, Clone)]
pub struct Submission {
    pub uris: Vec<String>,
    pub mime_types: Vec<String>,
    /// Flavor name, e.g. `normal` or `large`.
    pub flavor: String,
    /// Scheduler name; empty or unknown selects the default.
    pub scheduler: String,
    /// Dequeue this handle first (0 = none).
    pub handle_to_dequeue: u32,
    pub origin: Origin,
}

/// Entry point for client operations.
pub struct Dispatcher {
    registry: Arc<Registry>,
    cache: Arc<dyn ThumbnailCache>,
    schedulers: Vec<Arc<dyn Scheduler>>,
    default_scheduler: String,
    signals: Signals,
}

impl Dispatcher {
    /// `default_scheduler` must name one of `schedulers`.
    pub fn new(
        registry: Arc<Registry>,
        cache: Arc<dyn ThumbnailCache>,
        schedulers: Vec<Arc<dyn Scheduler>>,
        default_scheduler: &str,
        signals: Signals,
    ) -> Result<Self, DispatchError> {
        if !schedulers.iter().any(|s| s.name() == default_scheduler) {
            return Err(DispatchError::NoScheduler(default_scheduler.to_string()));
        }
        Ok(Self {
            registry,
            cache,
            schedulers,
            default_scheduler: default_scheduler.to_string(),
            signals,
        })
    }

    /// Queue a batch of URIs and return the new request's handle.
    ///
    /// An unknown flavor is answered right away with `started`, one
    /// `error` covering every URI, and `finished`.
    pub fn queue(&self, submission: Submission) -> Result<RequestHandle, DispatchError> {
        if submission.uris.len() != submission.mime_types.len() {
            return Err(DispatchError::LengthMismatch {
                uris: submission.uris.len(),
                mime_types: submission.mime_types.len(),
            });
        }
        if submission.uris.is_empty() {
            return Err(DispatchError::EmptyRequest);
        }

        if let Some(previous) = RequestHandle::from_raw(submission.handle_to_dequeue) {
            self.dequeue(previous);
        }

        let Some(flavor) = Flavor::from_name(&submission.flavor) else {
            return Ok(self.reject_flavor(submission));
        };

        let infos: Vec<FileInfo> = submission
            .uris
            .iter()
            .zip(&submission.mime_types)
            .map(|(uri, mime)| FileInfo::new(uri.as_str(), mime.as_str(), flavor))
            .collect();
        let candidates = self.registry.resolve_candidates(&infos);

        let entries: Vec<(FileInfo, Target)> = infos
            .into_iter()
            .zip(candidates)
            .map(|(info, workers)| {
                let target = if self.cache.is_thumbnail(info.uri()) {
                    Target::Rejected(ThumbnailError::is_thumbnail(info.uri()))
                } else {
                    Target::from(workers.into_iter().next())
                };
                (info, target)
            })
            .collect();

        let request = Request::new(entries, submission.origin);
        let handle = request.handle();
        let scheduler = self.scheduler(&submission.scheduler);
        tracing::debug!(
            %handle,
            scheduler = scheduler.name(),
            flavor = %flavor,
            elements = request.len(),
            "dispatching request"
        );
        scheduler.push(request);
        Ok(handle)
    }

    /// Dequeue `handle` on every scheduler. Returns true if any knew it.
    pub fn dequeue(&self, handle: RequestHandle) -> bool {
        self.schedulers
            .iter()
            .fold(false, |found, s| s.dequeue(handle) || found)
    }

    /// Cancel every `file://` element under `mount_root`, across all schedulers.
    pub fn cancel_by_mount(&self, mount_root: &Path) -> usize {
        self.schedulers.iter().map(|s| s.cancel_by_mount(mount_root)).sum()
    }

    pub fn get_schedulers(&self) -> Vec<String> {
        self.schedulers.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn get_flavors(&self) -> Vec<String> {
        Flavor::ALL.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn get_supported(&self) -> (Vec<String>, Vec<String>) {
        self.registry.get_supported()
    }

    pub fn default_scheduler(&self) -> &str {
        &self.default_scheduler
    }

    pub fn shutdown(&self) {
        for scheduler in &self.schedulers {
            scheduler.shutdown();
        }
    }

    fn scheduler(&self, name: &str) -> &Arc<dyn Scheduler> {
        let find = |n: &str| self.schedulers.iter().find(|s| s.name() == n);
        match find(name) {
            Some(s) => s,
            None => {
                if !name.is_empty() {
                    tracing::debug!(requested = name, "unknown scheduler, using default");
                }
                // `new` guarantees the default exists.
                find(&self.default_scheduler).unwrap_or(&self.schedulers[0])
            }
        }
    }

    fn reject_flavor(&self, submission: Submission) -> RequestHandle {
        let handle = RequestHandle::allocate();
        let origin = &submission.origin;
        tracing::debug!(%handle, flavor = %submission.flavor, "unsupported flavor");
        self.signals.started(handle, origin);
        self.signals.error(
            handle,
            origin,
            submission.uris,
            ErrorCode::UnsupportedFlavor,
            format!("Unsupported thumbnail flavor \"{}\"", submission.flavor),
        );
        self.signals.finished(handle, origin);
        handle
    }
}
