//! Reference in-memory event log.
//!
//! [`InMemoryStore`] is a thread-safe, append-only implementation of
//! [`EventStore`](super::EventStore) suitable for tests and single-process
//! deployments. One globally ordered log holds every event; a per-task index
//! into it keeps each task's history in sequence order. All operations run
//! under a single `RwLock`, so the version check and the write of a batch
//! form one critical section and readers always observe a consistent prefix.
//!
//! # Example
//!
//! ```
//! use taskstream::store::inmemory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    convert::Infallible,
    future::Future,
    sync::{Arc, RwLock},
};

use crate::{
    concurrency::ConcurrencyConflict,
    event::TaskId,
    store::{AppendError, EventStore, PersistableEvent, StoreStatistics, StoredEvent},
};

/// In-memory event store keeping one globally ordered log plus per-task
/// indices into it.
///
/// Cloning is cheap and clones share storage.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Global log in insertion order; an event's `position` is its index + 1.
    log: Vec<StoredEvent>,
    /// Per-task indices into `log`, in sequence order.
    streams: HashMap<TaskId, Vec<usize>>,
}

impl Inner {
    fn version(&self, task_id: TaskId) -> u64 {
        // Sequences are contiguous from 1, so the count is the version.
        self.streams.get(&task_id).map_or(0, |s| s.len() as u64)
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryStore {
    type Error = Infallible;

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    fn append<'a>(
        &'a self,
        task_id: TaskId,
        events: Vec<PersistableEvent>,
        expected_version: u64,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, AppendError<Self::Error>>> + Send + 'a {
        let result = (|| {
            if events.is_empty() {
                return Ok(Vec::new());
            }

            let mut inner = self.inner.write().expect("in-memory store lock poisoned");

            let actual = inner.version(task_id);
            if actual != expected_version {
                tracing::debug!(
                    expected = expected_version,
                    actual,
                    "version mismatch, rejecting append"
                );
                return Err(AppendError::Conflict(ConcurrencyConflict {
                    expected: expected_version,
                    actual,
                }));
            }

            let mut stored_batch = Vec::with_capacity(events.len());
            for (offset, event) in events.into_iter().enumerate() {
                let index = inner.log.len();
                let stored = StoredEvent {
                    event_id: event.event_id,
                    task_id,
                    kind: event.kind,
                    sequence: expected_version + offset as u64 + 1,
                    position: index as u64 + 1,
                    recorded_at: event.recorded_at,
                    payload: event.payload,
                    metadata: event.metadata,
                };
                inner.log.push(stored.clone());
                inner.streams.entry(task_id).or_default().push(index);
                stored_batch.push(stored);
            }
            drop(inner);

            tracing::debug!(
                events_appended = stored_batch.len(),
                "events committed to task stream"
            );
            Ok(stored_batch)
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn read_events<'a>(
        &'a self,
        task_id: TaskId,
        from_version: u64,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let events: Vec<StoredEvent> = inner.streams.get(&task_id).map_or_else(Vec::new, |indices| {
            indices
                .iter()
                .map(|&i| &inner.log[i])
                .filter(|e| e.sequence > from_version)
                .cloned()
                .collect()
        });
        tracing::trace!(events_loaded = events.len(), "loaded task history");
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn read_all<'a>(
        &'a self,
        from_position: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        // Positions are 1-based, so "position > from_position" means
        // starting at index `from_position`.
        let events: Vec<StoredEvent> = inner
            .log
            .iter()
            .skip(usize::try_from(from_position).unwrap_or(usize::MAX))
            .take(limit)
            .cloned()
            .collect();
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn current_version<'a>(
        &'a self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        std::future::ready(Ok(inner.version(task_id)))
    }

    #[tracing::instrument(skip(self))]
    fn exists<'a>(
        &'a self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        std::future::ready(Ok(inner.streams.contains_key(&task_id)))
    }

    #[tracing::instrument(skip(self))]
    fn statistics<'a>(
        &'a self,
    ) -> impl Future<Output = Result<StoreStatistics, Self::Error>> + Send + 'a {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let mut events_by_kind: BTreeMap<String, u64> = BTreeMap::new();
        for event in &inner.log {
            *events_by_kind.entry(event.kind.clone()).or_insert(0) += 1;
        }
        let statistics = StoreStatistics {
            total_events: inner.log.len() as u64,
            task_count: inner.streams.len() as u64,
            events_by_kind,
            last_recorded_at: inner.log.last().map(|e| e.recorded_at),
        };
        std::future::ready(Ok(statistics))
    }
}
