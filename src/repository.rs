//! Loading and persisting tasks against an event store.
//!
//! [`TaskRepository`] is the only component that translates between the
//! aggregate and the log: load replays a task's full history, save appends
//! the uncommitted buffer at the version the task was loaded with.

use thiserror::Error;

use crate::{
    concurrency::ConcurrencyConflict,
    event::{EventDecodeError, TaskId},
    store::{AppendError, EventStore, PersistableEvent, StoredEvent},
    task::Task,
};

/// Error from [`TaskRepository::load`].
#[derive(Debug, Error)]
pub enum LoadError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// No events exist for the requested id.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// Stored history could not be decoded. A data-integrity fault, fatal to
    /// the operation and not recoverable by retry.
    #[error("failed to decode stored event: {0}")]
    Decode(#[source] EventDecodeError),
    /// The store failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Error from [`TaskRepository::save`].
#[derive(Debug, Error)]
pub enum SaveError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// Another writer advanced the task between load and save. The task and
    /// its buffer are left untouched so the caller can reload and rerun the
    /// whole operation.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// An event payload could not be serialized.
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    /// The store failed; nothing was persisted.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Bridges [`Task`] and the event log.
#[derive(Clone, Debug)]
pub struct TaskRepository<S> {
    store: S,
}

impl<S: EventStore> TaskRepository<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Load a task by replaying its full history.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NotFound`] when no events exist for `id`,
    /// [`LoadError::Decode`] when the history holds an event this build
    /// cannot replay, or [`LoadError::Store`] when the store fails.
    pub async fn load(&self, id: TaskId) -> Result<Task, LoadError<S::Error>> {
        let stored = self
            .store
            .read_events(id, 0)
            .await
            .map_err(LoadError::Store)?;
        if stored.is_empty() {
            return Err(LoadError::NotFound(id));
        }

        let mut history = Vec::with_capacity(stored.len());
        for event in &stored {
            history.push(event.decode().map_err(LoadError::Decode)?);
        }

        let task = Task::replay(id, history);
        tracing::trace!(task_id = %id, version = task.version(), "task loaded");
        Ok(task)
    }

    /// Persist the task's uncommitted events at the version it was loaded
    /// with, returning the committed records for publication.
    ///
    /// An empty buffer returns `Ok(vec![])` without a storage call. On
    /// success the buffer is cleared. The repository never retries: a
    /// conflict propagates unchanged with the task untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Conflict`] when another writer advanced the
    /// task, [`SaveError::Encode`] when a payload cannot be serialized, or
    /// [`SaveError::Store`] when the store fails.
    pub async fn save(&self, task: &mut Task) -> Result<Vec<StoredEvent>, SaveError<S::Error>> {
        let pending = task.uncommitted_events();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        // The version the task had when it was loaded, before the buffered
        // mutations advanced it.
        let expected_version = task.version() - pending.len() as u64;

        let mut batch = Vec::with_capacity(pending.len());
        for event in pending {
            batch.push(PersistableEvent::from_pending(event).map_err(SaveError::Encode)?);
        }

        let committed = self
            .store
            .append(task.id(), batch, expected_version)
            .await
            .map_err(|e| match e {
                AppendError::Conflict(conflict) => SaveError::Conflict(conflict),
                AppendError::Store(err) => SaveError::Store(err),
            })?;

        task.mark_committed();
        tracing::debug!(
            task_id = %task.id(),
            events = committed.len(),
            version = task.version(),
            "task saved"
        );
        Ok(committed)
    }

    /// Whether any events exist for `id`.
    ///
    /// # Errors
    ///
    /// Returns the store's error when the check fails.
    pub async fn exists(&self, id: TaskId) -> Result<bool, S::Error> {
        self.store.exists(id).await
    }
}
