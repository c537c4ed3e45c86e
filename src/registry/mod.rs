//! Thumbnailer registry: maps `"<scheme>-<mime>"` hash keys to ranked workers.
//!
//! Populated by the plugin discovery layer, read by every scheduler thread.
//! All lookups and mutations go through one mutex; no lookup performs I/O.

mod file_info;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::worker::{Worker, WorkerId, WorkerKind};

pub use file_info::FileInfo;

/// Build a registry hash key.
pub fn hash_key(scheme: &str, mime_type: &str) -> String {
    format!("{scheme}-{mime_type}")
}

/// A worker as stored in one hash key's list.
#[derive(Clone)]
struct Entry {
    worker: Arc<dyn Worker>,
    id: WorkerId,
    priority: i32,
    kind: WorkerKind,
    /// Registration sequence, newer registrations have larger values.
    seq: u64,
}

impl Entry {
    /// `Less` means `self` ranks ahead of `other`.
    fn rank(&self, other: &Entry) -> Ordering {
        other.priority.cmp(&self.priority).then_with(|| match (self.kind, other.kind) {
            (WorkerKind::Dynamic, WorkerKind::Dynamic) => other.seq.cmp(&self.seq),
            (WorkerKind::Dynamic, WorkerKind::Installed { .. }) => Ordering::Less,
            (WorkerKind::Installed { .. }, WorkerKind::Dynamic) => Ordering::Greater,
            (
                WorkerKind::Installed { installed_at: a },
                WorkerKind::Installed { installed_at: b },
            ) => b.cmp(&a).then_with(|| other.seq.cmp(&self.seq)),
        })
    }
}

#[derive(Default)]
struct RegistryState {
    lists: HashMap<String, Vec<Entry>>,
    preferred: HashMap<String, WorkerId>,
    /// Live registration sequence per worker.
    registrations: HashMap<WorkerId, u64>,
    next_seq: u64,
}

impl RegistryState {
    fn remove(&mut self, id: &WorkerId) -> bool {
        let registered = self.registrations.remove(id).is_some();
        let mut removed = false;
        self.lists.retain(|_, list| {
            let before = list.len();
            list.retain(|e| &e.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        registered || removed
    }

    fn lookup(&self, key: &str) -> Vec<Arc<dyn Worker>> {
        let Some(list) = self.lists.get(key) else {
            return Vec::new();
        };
        let preferred = self
            .preferred
            .get(key)
            .and_then(|id| list.iter().find(|e| &e.id == id));

        let mut out = Vec::with_capacity(list.len());
        if let Some(p) = preferred {
            out.push(p.worker.clone());
        }
        out.extend(
            list.iter()
                .filter(|e| preferred.map_or(true, |p| p.id != e.id))
                .map(|e| e.worker.clone()),
        );
        out
    }
}

/// Handle returned by [`Registry::add`].
///
/// A dynamically registered worker keeps this and calls
/// [`Registration::unregister`] when it goes away. Once the worker was
/// removed or re-registered the handle is stale and unregistering is a no-op.
#[derive(Debug)]
pub struct Registration {
    state: Weak<Mutex<RegistryState>>,
    id: WorkerId,
    seq: u64,
}

impl Registration {
    pub fn worker_id(&self) -> &WorkerId {
        &self.id
    }

    /// Remove the worker if this registration is still the live one.
    pub fn unregister(self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let mut state = state.lock();
        if state.registrations.get(&self.id) != Some(&self.seq) {
            return false;
        }
        tracing::debug!(worker = %self.id, "worker unregistered itself");
        state.remove(&self.id)
    }
}

/// Thread-safe registry of thumbnail workers.
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(RegistryState::default())) }
    }

    /// Register `worker` under every hash key it declares.
    ///
    /// Adding a worker whose id is already registered replaces the old
    /// entries.
    pub fn add(&self, worker: Arc<dyn Worker>) -> Registration {
        let id = worker.id().clone();
        let keys: BTreeSet<String> = worker.hash_keys().into_iter().collect();
        let mut state = self.state.lock();

        if state.registrations.contains_key(&id) {
            state.remove(&id);
        }
        let seq = state.next_seq;
        state.next_seq += 1;

        let entry = Entry {
            priority: worker.priority(),
            kind: worker.kind(),
            worker,
            id: id.clone(),
            seq,
        };
        for key in &keys {
            let list = state.lists.entry(key.clone()).or_default();
            let pos = list
                .iter()
                .position(|e| entry.rank(e) == Ordering::Less)
                .unwrap_or(list.len());
            list.insert(pos, entry.clone());
        }
        state.registrations.insert(id.clone(), seq);
        drop(state);

        tracing::debug!(worker = %id, keys = keys.len(), "worker registered");
        Registration { state: Arc::downgrade(&self.state), id, seq }
    }

    /// Remove a worker from every hash key. Returns false if it was unknown.
    pub fn remove(&self, id: &WorkerId) -> bool {
        let removed = self.state.lock().remove(id);
        if removed {
            tracing::debug!(worker = %id, "worker removed");
        }
        removed
    }

    /// Ranked workers for `key`, preferred override first.
    pub fn lookup(&self, key: &str) -> Vec<Arc<dyn Worker>> {
        self.state.lock().lookup(key)
    }

    /// Install (`Some`) or clear (`None`) the preferred worker for `key`.
    ///
    /// The override may name a worker that is not registered (yet); it is
    /// ignored by lookups until such a worker appears under `key`.
    pub fn set_preferred(&self, key: &str, worker: Option<WorkerId>) {
        let mut state = self.state.lock();
        match worker {
            Some(id) => {
                tracing::debug!(key, worker = %id, "preferred worker set");
                state.preferred.insert(key.to_string(), id);
            }
            None => {
                tracing::debug!(key, "preferred worker cleared");
                state.preferred.remove(key);
            }
        }
    }

    /// Install a batch of overrides, e.g. from the overrides file.
    pub fn apply_preferred<I>(&self, overrides: I)
    where
        I: IntoIterator<Item = (String, WorkerId)>,
    {
        for (key, id) in overrides {
            self.set_preferred(&key, Some(id));
        }
    }

    pub fn preferred(&self, key: &str) -> Option<WorkerId> {
        self.state.lock().preferred.get(key).cloned()
    }

    /// Ranked, filtered candidate workers for each input.
    ///
    /// Lists are taken under the lock; size and location filtering happen
    /// afterwards so stat'ing a file never blocks other lookups.
    pub fn resolve_candidates(&self, infos: &[FileInfo]) -> Vec<Vec<Arc<dyn Worker>>> {
        let ranked: Vec<Vec<Arc<dyn Worker>>> = {
            let state = self.state.lock();
            infos.iter().map(|info| state.lookup(&info.hash_key())).collect()
        };

        infos
            .iter()
            .zip(ranked)
            .map(|(info, candidates)| filter_candidates(info, candidates))
            .collect()
    }

    /// Top-ranked worker per hash key, each worker listed once.
    pub fn get_thumbnailers(&self) -> Vec<Arc<dyn Worker>> {
        let state = self.state.lock();
        let mut keys: Vec<&String> = state.lists.keys().collect();
        keys.sort();

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for key in keys {
            if let Some(top) = state.lookup(key).into_iter().next() {
                if seen.insert(top.id().clone()) {
                    out.push(top);
                }
            }
        }
        out
    }

    /// Supported `(scheme, mime)` pairs as two parallel arrays.
    ///
    /// Keys are split at the first `-`; schemes never contain one.
    pub fn get_supported(&self) -> (Vec<String>, Vec<String>) {
        let state = self.state.lock();
        let mut pairs: Vec<(&str, &str)> =
            state.lists.keys().filter_map(|k| k.split_once('-')).collect();
        pairs.sort_unstable();
        pairs.into_iter().map(|(s, m)| (s.to_string(), m.to_string())).unzip()
    }

    /// Ids currently ranked under `key`, in natural order (no override).
    pub fn ranked_ids(&self, key: &str) -> Vec<WorkerId> {
        self.state
            .lock()
            .lists
            .get(key)
            .map(|list| list.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.state.lock().registrations.contains_key(id)
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.state.lock().registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_candidates(info: &FileInfo, candidates: Vec<Arc<dyn Worker>>) -> Vec<Arc<dyn Worker>> {
    let size = if candidates.iter().any(|w| w.max_file_size().is_some()) {
        info.size()
    } else {
        None
    };

    candidates
        .into_iter()
        .filter(|w| match (w.max_file_size(), size) {
            (Some(max), Some(size)) => size <= max,
            _ => true,
        })
        .filter(|w| info.path().map_or(true, |p| w.supports_location(p)))
        .collect()
}
