//! Scheduler throughput benchmarks.
//!
//! Measures registry resolution and end-to-end request processing on the
//! LIFO and grouped schedulers.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use thumbd_core::cache::{Flavor, MemoryCache, Thumbnail};
use thumbd_core::registry::{FileInfo, Registry};
use thumbd_core::scheduler::{
    event_channel, EventReceiver, GroupedScheduler, LifoScheduler, Origin, Request, Scheduler,
    SchedulerDeps, Target,
};
use thumbd_core::worker::{Completion, Worker, WorkerId, WorkerJob, WorkerKind};

struct InstantWorker {
    id: WorkerId,
    keys: Vec<String>,
    priority: i32,
}

impl InstantWorker {
    fn new(id: &str, keys: &[&str], priority: i32) -> Arc<Self> {
        Arc::new(Self {
            id: WorkerId::new(id),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            priority,
        })
    }
}

impl Worker for InstantWorker {
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
        WorkerKind::Dynamic
    }

    fn invoke(&self, _job: WorkerJob, completion: Completion) {
        completion.ready(Thumbnail { width: 1, height: 1, has_alpha: false, pixels: vec![0; 3] });
    }
}

fn bench_resolve_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_resolve");

    let registry = Registry::new();
    for i in 0..32 {
        let mime = format!("image/x-{i}");
        let key = format!("file-{mime}");
        registry.add(InstantWorker::new(&format!("w{i}"), &[key.as_str(), "file-image/png"], i));
    }

    for batch in [1usize, 16, 256] {
        let infos: Vec<FileInfo> = (0..batch)
            .map(|i| FileInfo::new(format!("file:///bench/{i}.png"), "image/png", Flavor::Normal))
            .collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("png", batch), &infos, |b, infos| {
            b.iter(|| black_box(registry.resolve_candidates(infos)))
        });
    }

    group.finish();
}

fn build_request(worker: &Arc<dyn Worker>, elements: usize, round: usize) -> Request {
    let entries = (0..elements)
        .map(|i| {
            let info =
                FileInfo::new(format!("file:///bench/{round}/{i}.png"), "image/png", Flavor::Normal);
            (info, Target::Worker(worker.clone()))
        })
        .collect();
    Request::new(entries, Origin::new(":1.1"))
}

/// Push `requests` and block until each one finished.
fn run_batch(
    scheduler: &dyn Scheduler,
    rx: &mut EventReceiver,
    worker: &Arc<dyn Worker>,
    requests: usize,
    elements: usize,
    round: usize,
) {
    for r in 0..requests {
        scheduler.push(build_request(worker, elements, round * requests + r));
    }
    let mut finished = 0;
    while finished < requests {
        match rx.blocking_recv() {
            Some(event) if event.is_finished() => finished += 1,
            Some(_) => {}
            None => break,
        }
    }
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_end_to_end");
    group.measurement_time(Duration::from_secs(10));

    let worker: Arc<dyn Worker> = InstantWorker::new("instant", &["file-image/png"], 0);
    let (requests, elements) = (16usize, 8usize);
    group.throughput(Throughput::Elements((requests * elements) as u64));

    let (events, mut rx) = event_channel();
    let deps = SchedulerDeps {
        cache: Arc::new(MemoryCache::new()),
        events,
        worker_timeout: Duration::from_secs(5),
    };
    let lifo = LifoScheduler::new("bench-lifo", 0, deps.clone()).expect("pool");
    let mut round = 0;
    group.bench_function("lifo", |b| {
        b.iter(|| {
            round += 1;
            run_batch(&lifo, &mut rx, &worker, requests, elements, round);
        })
    });
    lifo.shutdown();

    let grouped = GroupedScheduler::new("bench-grouped", deps).expect("pool");
    group.bench_function("grouped", |b| {
        b.iter(|| {
            round += 1;
            run_batch(&grouped, &mut rx, &worker, requests, elements, round);
        })
    });
    grouped.shutdown();

    group.finish();
}

criterion_group!(benches, bench_resolve_candidates, bench_end_to_end);
criterion_main!(benches);
