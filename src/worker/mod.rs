//! Worker capability interface.
//!
//! Workers are the codec wrappers that turn one source URI into pixel data.
//! They live outside the scheduling core; the core only ranks them, hands
//! them a job plus a one-shot [`Completion`], and waits for the outcome.

mod completion;
mod location;

use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::Flavor;

pub use completion::{Completion, CompletionWait, WaitResult, WaitWaker, WorkerOutcome};
pub use location::LocationFilter;

/// Stable identity of a worker, used for dedup and preferred overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// How a worker came to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Installed on disk, discovered by scanning descriptor directories.
    Installed { installed_at: SystemTime },
    /// Registered itself at runtime (a foreign thumbnailer).
    Dynamic,
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub uri: String,
    pub mime_type: String,
    pub flavor: Flavor,
    /// Cancelled when the element is dequeued or its mount goes away.
    pub cancel: CancellationToken,
}

/// A thumbnail generator.
///
/// `invoke` may resolve the completion before returning (synchronous
/// workers) or move it to another thread and resolve it later. Exactly one
/// outcome is delivered per invocation; dropping the completion unresolved
/// reports an internal error.
pub trait Worker: Send + Sync {
    fn id(&self) -> &WorkerId;

    /// Hash keys (`"<scheme>-<mime>"`) this worker handles.
    fn hash_keys(&self) -> Vec<String>;

    fn priority(&self) -> i32 {
        0
    }

    fn kind(&self) -> WorkerKind;

    /// Largest source file in bytes, `None` for unbounded.
    fn max_file_size(&self) -> Option<u64> {
        None
    }

    /// Consulted for `file://` sources only; remote URIs skip this check.
    fn supports_location(&self, _path: &Path) -> bool {
        true
    }

    fn invoke(&self, job: WorkerJob, completion: Completion);
}

impl std::fmt::Debug for dyn Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", self.id())
            .field("priority", &self.priority())
            .finish()
    }
}
