//! Fixed-size OS thread pool backing the schedulers.
//!
//! Each pool owns one shared queue. LIFO pools hand the most recently
//! submitted task to the next free thread, so a newly visible folder is
//! thumbnailed before the ones the user scrolled past.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::context::panic_message;

/// Order in which queued tasks are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// Most recently submitted first.
    Lifo,
    /// Oldest first.
    Fifo,
}

/// Configuration for the thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = one per processor).
    pub num_threads: usize,
    /// Thread name prefix; threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
    pub order: QueueOrder,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0, // Auto-detect
            thread_name_prefix: "thumbd-worker".to_string(),
            order: QueueOrder::Lifo,
            stack_size: 0,
        }
    }
}

impl ThreadPoolConfig {
    /// Stack-ordered pool, one thread per processor unless `threads` is set.
    pub fn interactive(prefix: &str, threads: usize) -> Self {
        Self {
            num_threads: threads,
            thread_name_prefix: prefix.to_string(),
            order: QueueOrder::Lifo,
            stack_size: 0,
        }
    }

    /// Single serialized thread.
    pub fn exclusive(prefix: &str) -> Self {
        Self {
            num_threads: 1,
            thread_name_prefix: prefix.to_string(),
            order: QueueOrder::Fifo,
            stack_size: 0,
        }
    }
}

/// A task to be executed by the thread pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Statistics for thread pool activity.
#[derive(Debug, Default, Clone)]
pub struct ThreadPoolStats {
    pub total_tasks_executed: u64,
    /// Tasks that panicked; their thread kept serving the queue.
    pub tasks_panicked: u64,
    pub queued: usize,
    pub threads_active: usize,
    pub threads_idle: usize,
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    available: Condvar,
    shutdown: AtomicBool,
    active: AtomicUsize,
    executed: AtomicU64,
    panicked: AtomicU64,
    order: QueueOrder,
}

impl Shared {
    fn next(&self, queue: &mut VecDeque<Task>) -> Option<Task> {
        match self.order {
            QueueOrder::Lifo => queue.pop_back(),
            QueueOrder::Fifo => queue.pop_front(),
        }
    }
}

/// Bounded pool of OS threads draining one shared queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
    name: String,
}

impl ThreadPool {
    /// Spawn the pool's threads.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let num_threads = if config.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_threads
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            order: config.order,
        });

        let mut workers = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }
            let shared_clone = shared.clone();
            let handle = builder
                .spawn(move || Self::worker_loop(&shared_clone))
                .map_err(|e| ThreadPoolError::ThreadSpawnFailed(e.to_string()));

            match handle {
                Ok(h) => workers.push(h),
                Err(e) => {
                    // Release the threads spawned so far before bailing out.
                    Self::stop(&shared, &mut workers);
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            pool = %config.thread_name_prefix,
            threads = num_threads,
            order = ?config.order,
            "thread pool started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            num_threads,
            name: config.thread_name_prefix,
        })
    }

    /// Queue a task.
    pub fn submit(&self, task: Task) -> Result<(), ThreadPoolError> {
        let mut queue = self.shared.queue.lock();
        // Checked under the queue lock: `stop` sets the flag before taking it,
        // so a task accepted here is always seen by a draining thread.
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(ThreadPoolError::PoolShutdown);
        }
        queue.push_back(task);
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Worker thread main loop.
    ///
    /// Queued tasks are drained even after shutdown was signalled so every
    /// submitted task runs exactly once.
    fn worker_loop(shared: &Shared) {
        loop {
            let task = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(task) = shared.next(&mut queue) {
                        break task;
                    }
                    if shared.shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                    shared.available.wait(&mut queue);
                }
            };

            shared.active.fetch_add(1, Ordering::SeqCst);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    thread = thread::current().name().unwrap_or("unnamed"),
                    reason = %panic_message(payload.as_ref()),
                    "pool task panicked"
                );
            }
            shared.active.fetch_sub(1, Ordering::SeqCst);
            shared.executed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stop(shared: &Shared, workers: &mut Vec<JoinHandle<()>>) {
        shared.shutdown.store(true, Ordering::SeqCst);
        {
            let _guard = shared.queue.lock();
            shared.available.notify_all();
        }

        let current = thread::current().id();
        for handle in workers.drain(..) {
            // A task may shut down its own pool; never join ourselves.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let active = self.shared.active.load(Ordering::SeqCst);
        ThreadPoolStats {
            total_tasks_executed: self.shared.executed.load(Ordering::Relaxed),
            tasks_panicked: self.shared.panicked.load(Ordering::Relaxed),
            queued: self.shared.queue.lock().len(),
            threads_active: active,
            threads_idle: self.num_threads.saturating_sub(active),
        }
    }

    /// Get number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks, run what is queued, and join all threads.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        Self::stop(&self.shared, &mut workers);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Errors for thread pool operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadPoolError {
    #[error("Thread pool is shut down")]
    PoolShutdown,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawnFailed(String),
}
