//! The task aggregate: business rules, event production, replay.
//!
//! [`Task`] is the only place business invariants are enforced before new
//! events are admitted. Mutation methods validate a command against current
//! state, buffer a [`PendingEvent`], and advance in-memory state through the
//! same fold used for replay - so "state after a mutation" and "state after
//! replaying the history including that event" are identical by
//! construction, not by convention.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{
    EventMetadata, PendingEvent, TaskCancelled, TaskCompleted, TaskCreated, TaskEvent, TaskId,
    TaskUpdated,
};

/// Maximum length of a title, in characters, after trimming.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum length of a description, in characters, after trimming.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Lifecycle state of a task.
///
/// `Pending` is entered by the creation event; `Completed` and `Cancelled`
/// are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Urgency of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Caller-supplied data violating a field constraint.
///
/// Detected before any event is produced, so a rejected command is never
/// partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("title must be at most {MAX_TITLE_LEN} characters, got {len}")]
    TitleTooLong { len: usize },
    #[error("description must be at most {MAX_DESCRIPTION_LEN} characters, got {len}")]
    DescriptionTooLong { len: usize },
}

/// An attempted transition not allowed from the task's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a task that is {status}")]
pub struct InvalidTransition {
    /// The operation that was attempted.
    pub action: &'static str,
    /// The state that forbids it.
    pub status: TaskStatus,
}

/// Why a mutation was rejected. No event is produced and no state changes
/// when a mutation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Input for creating a task.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to [`Priority::Medium`] when absent.
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Input for updating a task.
///
/// Fields left `None` are untouched. A supplied description that trims to
/// empty clears the current description.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateTask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// The current materialized state of one task, plus the events produced
/// since it was loaded.
///
/// An instance is owned exclusively by the operation that loaded it; it is
/// never cached or shared across concurrent operations. Concurrent writers
/// only meet at the event log's version-checked append.
#[derive(Clone, Debug)]
pub struct Task {
    id: TaskId,
    version: u64,
    title: String,
    description: Option<String>,
    priority: Priority,
    status: TaskStatus,
    uncommitted: Vec<PendingEvent>,
}

impl Task {
    /// The empty initial state every replay starts from.
    fn initial(id: TaskId) -> Self {
        Self {
            id,
            version: 0,
            title: String::new(),
            description: None,
            priority: Priority::default(),
            status: TaskStatus::Pending,
            uncommitted: Vec::new(),
        }
    }

    /// Create a new task. The only producer of a task's first event.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the title is empty after trimming
    /// or a field exceeds its length limit. No event is produced on failure.
    pub fn create(
        id: TaskId,
        input: CreateTask,
        metadata: EventMetadata,
    ) -> Result<Self, ValidationError> {
        let title = validate_title(&input.title)?;
        let description = validate_description(input.description.as_deref())?;

        let mut task = Self::initial(id);
        task.record(
            TaskEvent::Created(TaskCreated {
                title,
                description,
                priority: input.priority.unwrap_or_default(),
            }),
            metadata,
        );
        Ok(task)
    }

    /// Rebuild a task by folding its ordered history from the empty initial
    /// state.
    ///
    /// Deterministic and total: the exhaustive match in the fold covers
    /// every kind this crate can decode, and the resulting version equals
    /// the number of events folded.
    #[must_use]
    pub fn replay(id: TaskId, history: impl IntoIterator<Item = TaskEvent>) -> Self {
        let mut task = Self::initial(id);
        for event in history {
            task.apply(&event);
        }
        task
    }

    /// Mark a pending task as completed.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] naming the current state unless the
    /// task is pending.
    pub fn complete(&mut self, metadata: EventMetadata) -> Result<(), InvalidTransition> {
        self.require_pending("complete")?;
        self.record(TaskEvent::Completed(TaskCompleted {}), metadata);
        Ok(())
    }

    /// Cancel a pending task.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] naming the current state when the task
    /// is already completed or cancelled.
    pub fn cancel(&mut self, metadata: EventMetadata) -> Result<(), InvalidTransition> {
        self.require_pending("cancel")?;
        self.record(TaskEvent::Cancelled(TaskCancelled {}), metadata);
        Ok(())
    }

    /// Change title, description, or priority on a pending task.
    ///
    /// Supplied fields are validated with the same rules as
    /// [`create`](Self::create). A field identical to current state after
    /// trimming is not a change; when nothing differs the call is a
    /// deliberate no-op producing no event and leaving the version
    /// unchanged. Otherwise one update event is produced carrying only the
    /// fields that changed.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Transition`] unless the task is pending, or
    /// [`CommandError::Validation`] when a supplied field violates its
    /// constraint. Nothing is applied on failure.
    pub fn update(&mut self, input: UpdateTask, metadata: EventMetadata) -> Result<(), CommandError> {
        self.require_pending("update")?;

        let title = match input.title.as_deref() {
            Some(raw) => {
                let title = validate_title(raw)?;
                (title != self.title).then_some(title)
            }
            None => None,
        };

        let description = match input.description.as_deref() {
            Some(raw) => {
                let normalized = validate_description(Some(raw))?;
                if normalized == self.description {
                    None
                } else {
                    // An empty string in the payload clears the description.
                    Some(normalized.unwrap_or_default())
                }
            }
            None => None,
        };

        let priority = input.priority.filter(|p| *p != self.priority);

        let change = TaskUpdated {
            title,
            description,
            priority,
        };
        if change.is_empty() {
            return Ok(());
        }
        self.record(TaskEvent::Updated(change), metadata);
        Ok(())
    }

    /// Buffer the event and advance state through the replay fold.
    fn record(&mut self, event: TaskEvent, metadata: EventMetadata) {
        self.apply(&event);
        self.uncommitted.push(PendingEvent::new(event, metadata));
    }

    /// The state transition shared by live mutation and replay.
    fn apply(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Created(e) => {
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.priority = e.priority;
                self.status = TaskStatus::Pending;
            }
            TaskEvent::Completed(_) => self.status = TaskStatus::Completed,
            TaskEvent::Cancelled(_) => self.status = TaskStatus::Cancelled,
            TaskEvent::Updated(e) => {
                if let Some(title) = &e.title {
                    self.title = title.clone();
                }
                if let Some(description) = &e.description {
                    self.description = (!description.is_empty()).then(|| description.clone());
                }
                if let Some(priority) = e.priority {
                    self.priority = priority;
                }
            }
        }
        self.version += 1;
    }

    fn require_pending(&self, action: &'static str) -> Result<(), InvalidTransition> {
        match self.status {
            TaskStatus::Pending => Ok(()),
            status => Err(InvalidTransition { action, status }),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Number of events applied so far; equals the highest sequence number
    /// this instance has seen (committed or buffered).
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Events produced since load, not yet persisted.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[PendingEvent] {
        &self.uncommitted
    }

    /// Discard the buffer after its events were durably stored.
    pub(crate) fn mark_committed(&mut self) {
        self.uncommitted.clear();
    }
}

fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong { len });
    }
    Ok(title.to_owned())
}

fn validate_description(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let description = raw.trim();
    if description.is_empty() {
        return Ok(None);
    }
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong { len });
    }
    Ok(Some(description.to_owned()))
}
