//! One operation per use case.
//!
//! [`TaskService`] composes repository load, aggregate mutation, repository
//! save, and publisher notification into a single unit of work. It is built
//! by explicit construction at process start - store, repository, publisher,
//! service - and holds no other state; every operation reloads the task from
//! the log, so staleness is bounded by one load-mutate-save cycle.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    concurrency::ConcurrencyConflict,
    event::{EventDecodeError, EventMetadata, TaskId},
    publisher::EventPublisher,
    repository::{LoadError, SaveError, TaskRepository},
    store::EventStore,
    task::{CommandError, CreateTask, InvalidTransition, Task, UpdateTask, ValidationError},
};

/// Error surface of the application service.
///
/// The transport layer in front of this service maps these variants to
/// status codes; each variant corresponds to exactly one failure class and
/// none of them implies partial effects.
#[derive(Debug, Error)]
pub enum ServiceError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// Caller-supplied data violates a field constraint.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The requested transition is not allowed from the task's current
    /// state.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    /// No such task.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// Another writer advanced the task between load and save. Rerun the
    /// whole operation; the service never retries on its own.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Stored history could not be decoded; a data-integrity fault.
    #[error("failed to decode stored event: {0}")]
    Decode(#[source] EventDecodeError),
    /// An event payload could not be serialized.
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    /// The event store failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError> From<LoadError<StoreError>> for ServiceError<StoreError>
where
    StoreError: std::error::Error + Send + Sync + 'static,
{
    fn from(error: LoadError<StoreError>) -> Self {
        match error {
            LoadError::NotFound(id) => Self::NotFound(id),
            LoadError::Decode(e) => Self::Decode(e),
            LoadError::Store(e) => Self::Store(e),
        }
    }
}

impl<StoreError> From<SaveError<StoreError>> for ServiceError<StoreError>
where
    StoreError: std::error::Error + Send + Sync + 'static,
{
    fn from(error: SaveError<StoreError>) -> Self {
        match error {
            SaveError::Conflict(conflict) => Self::Conflict(conflict),
            SaveError::Encode(e) => Self::Encode(e),
            SaveError::Store(e) => Self::Store(e),
        }
    }
}

impl<StoreError> From<CommandError> for ServiceError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    fn from(error: CommandError) -> Self {
        match error {
            CommandError::Validation(e) => Self::Validation(e),
            CommandError::Transition(e) => Self::Transition(e),
        }
    }
}

/// Application service: one operation per use case, each a single
/// load-mutate-save-publish unit of work.
pub struct TaskService<S> {
    repository: TaskRepository<S>,
    publisher: Arc<EventPublisher>,
}

impl<S: EventStore> TaskService<S> {
    #[must_use]
    pub const fn new(repository: TaskRepository<S>, publisher: Arc<EventPublisher>) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    #[must_use]
    pub const fn repository(&self) -> &TaskRepository<S> {
        &self.repository
    }

    /// Create a task and return its identity.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for bad input, or the save-side
    /// errors when persistence fails.
    #[tracing::instrument(skip(self, input))]
    pub async fn create_task(
        &self,
        input: CreateTask,
        actor: Option<&str>,
    ) -> Result<TaskId, ServiceError<S::Error>> {
        let id = TaskId::random();
        let mut task = Task::create(id, input, EventMetadata::for_actor(actor))?;
        let committed = self.repository.save(&mut task).await?;
        self.publisher.publish(&committed).await;
        tracing::debug!(task_id = %id, "task created");
        Ok(id)
    }

    /// Complete a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id,
    /// [`ServiceError::Transition`] when the task is not pending, or the
    /// load/save-side errors.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task(
        &self,
        id: TaskId,
        actor: Option<&str>,
    ) -> Result<(), ServiceError<S::Error>> {
        let mut task = self.repository.load(id).await?;
        task.complete(EventMetadata::for_actor(actor))?;
        let committed = self.repository.save(&mut task).await?;
        self.publisher.publish(&committed).await;
        tracing::debug!(task_id = %id, "task completed");
        Ok(())
    }

    /// Cancel a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id,
    /// [`ServiceError::Transition`] when the task is already completed or
    /// cancelled, or the load/save-side errors.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_task(
        &self,
        id: TaskId,
        actor: Option<&str>,
    ) -> Result<(), ServiceError<S::Error>> {
        let mut task = self.repository.load(id).await?;
        task.cancel(EventMetadata::for_actor(actor))?;
        let committed = self.repository.save(&mut task).await?;
        self.publisher.publish(&committed).await;
        tracing::debug!(task_id = %id, "task cancelled");
        Ok(())
    }

    /// Update a pending task's title, description, or priority.
    ///
    /// A call whose supplied fields all match current state is a no-op
    /// success: nothing is stored and nothing is published.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id,
    /// [`ServiceError::Validation`] or [`ServiceError::Transition`] when the
    /// mutation is rejected, or the load/save-side errors.
    #[tracing::instrument(skip(self, input))]
    pub async fn update_task(
        &self,
        id: TaskId,
        input: UpdateTask,
        actor: Option<&str>,
    ) -> Result<(), ServiceError<S::Error>> {
        let mut task = self.repository.load(id).await?;
        task.update(input, EventMetadata::for_actor(actor))?;
        let committed = self.repository.save(&mut task).await?;
        if !committed.is_empty() {
            self.publisher.publish(&committed).await;
            tracing::debug!(task_id = %id, "task updated");
        }
        Ok(())
    }

    /// Whether a task with this identity exists.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the store fails.
    pub async fn task_exists(&self, id: TaskId) -> Result<bool, ServiceError<S::Error>> {
        self.repository.exists(id).await.map_err(ServiceError::Store)
    }
}
