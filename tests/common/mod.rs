//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime};

use thumbd_core::cache::{CacheError, Flavor, MemoryCache, Thumbnail, ThumbnailCache};
use thumbd_core::error::ErrorCode;
use thumbd_core::registry::FileInfo;
use thumbd_core::scheduler::{
    event_channel, EventReceiver, Origin, Request, RequestHandle, SchedulerDeps, SchedulerEvent,
    Target,
};
use thumbd_core::worker::{Completion, LocationFilter, Worker, WorkerId, WorkerJob, WorkerKind};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn thumbnail() -> Thumbnail {
    Thumbnail { width: 128, height: 96, has_alpha: false, pixels: vec![0; 128 * 96 * 3] }
}

/// Manually opened latch a worker can block on.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// Invocations that reached the gate so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Block until `n` invocations reached the gate.
    pub fn wait_entered(&self, n: usize) {
        let deadline = std::time::Instant::now() + EVENT_TIMEOUT;
        while self.entered() < n {
            assert!(std::time::Instant::now() < deadline, "gate never reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Block the caller until the gate opens.
    pub fn block(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }

    /// Returns false if `job` was cancelled before the gate opened.
    fn pass(&self, job: &WorkerJob) -> bool {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            if job.cancel.is_cancelled() {
                return false;
            }
            open = self.cv.wait_timeout(open, Duration::from_millis(10)).unwrap().0;
        }
        true
    }

    /// Block until `job` is cancelled.
    fn hold_until_cancelled(&self, job: &WorkerJob) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let deadline = std::time::Instant::now() + EVENT_TIMEOUT;
        while !job.cancel.is_cancelled() {
            assert!(std::time::Instant::now() < deadline, "job never cancelled");
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Fail(ErrorCode, &'static str),
    /// Succeed once the gate opens; report `Cancelled` if the job is cancelled first.
    Gated(Arc<Gate>),
    /// Wait for the job to be cancelled, then report success anyway.
    LateReady(Arc<Gate>),
    /// Keep the completion alive without ever resolving it.
    Hang(Arc<Mutex<Vec<Completion>>>),
    /// Panic inside `invoke`.
    Panic(&'static str),
}

/// Configurable worker that records where and what it was asked to do.
pub struct TestWorker {
    id: WorkerId,
    keys: Vec<String>,
    priority: i32,
    kind: WorkerKind,
    max_file_size: Option<u64>,
    locations: LocationFilter,
    behavior: Behavior,
    pub calls: Mutex<Vec<String>>,
    pub threads: Mutex<Vec<String>>,
}

impl TestWorker {
    pub fn new(id: &str, keys: &[&str]) -> Self {
        Self {
            id: WorkerId::new(id),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            priority: 0,
            kind: WorkerKind::Dynamic,
            max_file_size: None,
            locations: LocationFilter::default(),
            behavior: Behavior::Succeed,
            calls: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn installed(mut self, installed_at: SystemTime) -> Self {
        self.kind = WorkerKind::Installed { installed_at };
        self
    }

    pub fn max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = Some(max);
        self
    }

    pub fn locations(mut self, locations: LocationFilter) -> Self {
        self.locations = locations;
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().unwrap().clone()
    }
}

impl Worker for TestWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    fn hash_keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn kind(&self) -> WorkerKind {
        self.kind
    }

    fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    fn supports_location(&self, path: &std::path::Path) -> bool {
        self.locations.allows(path)
    }

    fn invoke(&self, job: WorkerJob, completion: Completion) {
        self.calls.lock().unwrap().push(job.uri.clone());
        let thread = std::thread::current().name().unwrap_or("unnamed").to_string();
        self.threads.lock().unwrap().push(thread);

        match &self.behavior {
            Behavior::Succeed => completion.ready(thumbnail()),
            Behavior::Fail(code, message) => completion.error(*code, *message),
            Behavior::Gated(gate) => {
                if gate.pass(&job) {
                    completion.ready(thumbnail());
                } else {
                    completion.error(ErrorCode::Cancelled, "cancelled");
                }
            }
            Behavior::LateReady(gate) => {
                gate.hold_until_cancelled(&job);
                completion.ready(thumbnail());
            }
            Behavior::Hang(parked) => parked.lock().unwrap().push(completion),
            Behavior::Panic(message) => panic!("{}", message),
        }
    }
}

/// Cache whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyCache;

impl ThumbnailCache for ReadOnlyCache {
    fn needs_update(&self, _uri: &str, _flavor: Flavor, _mtime: Option<SystemTime>) -> bool {
        true
    }

    fn save(
        &self,
        uri: &str,
        _flavor: Flavor,
        _thumbnail: &Thumbnail,
        _mtime: Option<SystemTime>,
    ) -> Result<(), CacheError> {
        Err(CacheError::WriteFailed { uri: uri.to_string(), reason: "read-only".to_string() })
    }
}

pub fn deps(cache: Arc<dyn ThumbnailCache>) -> (SchedulerDeps, EventReceiver) {
    deps_with_timeout(cache, Duration::from_secs(5))
}

pub fn deps_with_timeout(
    cache: Arc<dyn ThumbnailCache>,
    worker_timeout: Duration,
) -> (SchedulerDeps, EventReceiver) {
    let (events, rx) = event_channel();
    (SchedulerDeps { cache, events, worker_timeout }, rx)
}

pub fn memory_cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new())
}

pub fn info(uri: &str) -> FileInfo {
    FileInfo::new(uri, "image/png", Flavor::Normal)
}

pub fn worker_target(worker: &Arc<TestWorker>) -> Target {
    let worker: Arc<dyn Worker> = worker.clone();
    Target::Worker(worker)
}

/// Build a request where every URI goes to the same target.
pub fn request_for(uris: &[&str], target: &Target) -> Request {
    let entries = uris.iter().map(|u| (info(u), target.clone())).collect();
    Request::new(entries, Origin::new(":1.7"))
}

pub fn request(entries: Vec<(&str, Target)>) -> Request {
    let entries = entries.into_iter().map(|(u, t)| (info(u), t)).collect();
    Request::new(entries, Origin::new(":1.7"))
}

/// Receive events until `finished` arrived for every handle in `handles`.
pub async fn collect_until_finished(
    rx: &mut EventReceiver,
    handles: &[RequestHandle],
) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    let mut pending: Vec<RequestHandle> = handles.to_vec();
    while !pending.is_empty() {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for scheduler events")
            .expect("event channel closed");
        if event.is_finished() {
            pending.retain(|h| *h != event.handle());
        }
        events.push(event);
    }
    events
}

/// Events for `handle` only, in arrival order.
pub fn events_for(events: &[SchedulerEvent], handle: RequestHandle) -> Vec<SchedulerEvent> {
    events.iter().filter(|e| e.handle() == handle).cloned().collect()
}

/// Compact rendering for order assertions, e.g. `ready[a,b]`.
pub fn describe(event: &SchedulerEvent) -> String {
    let short = |uris: &[String]| {
        uris.iter()
            .map(|u| u.rsplit('/').next().unwrap_or(u).trim_end_matches(".png").to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    match event {
        SchedulerEvent::Started { .. } => "started".to_string(),
        SchedulerEvent::Ready { uris, .. } => format!("ready[{}]", short(uris)),
        SchedulerEvent::Error { uris, code, .. } => format!("error[{}]:{}", short(uris), code),
        SchedulerEvent::Finished { .. } => "finished".to_string(),
    }
}

pub fn describe_all(events: &[SchedulerEvent]) -> Vec<String> {
    events.iter().map(describe).collect()
}
