//! Domain events and their wire-adjacent records.
//!
//! [`TaskEvent`] is a closed sum over the known event kinds, each variant
//! wrapping its own payload struct. Replay dispatches on the enum with an
//! exhaustive match, so an unhandled kind is a compile-time concern; the
//! runtime analogue - an unrecognized kind string in storage - surfaces as
//! [`EventDecodeError`] from the single decode path, [`TaskEvent::from_parts`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::task::Priority;

/// Stable identity of one task across its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Mint a fresh random identity.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Payload of the event that brings a task into existence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
}

impl TaskCreated {
    pub const KIND: &'static str = "task-created";
}

/// Payload of a completion event. Carries no data; the envelope's timestamp
/// records when it happened.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompleted {}

impl TaskCompleted {
    pub const KIND: &'static str = "task-completed";
}

/// Payload of a cancellation event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCancelled {}

impl TaskCancelled {
    pub const KIND: &'static str = "task-cancelled";
}

/// Payload of an update event. Only fields that actually changed are
/// present; absent fields were not touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description. An empty string clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskUpdated {
    pub const KIND: &'static str = "task-updated";

    /// True when no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.priority.is_none()
    }
}

/// An immutable fact about something that happened to one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    Created(TaskCreated),
    Completed(TaskCompleted),
    Cancelled(TaskCancelled),
    Updated(TaskUpdated),
}

impl TaskEvent {
    /// Every kind tag this enum can decode.
    pub const KINDS: &'static [&'static str] = &[
        TaskCreated::KIND,
        TaskCompleted::KIND,
        TaskCancelled::KIND,
        TaskUpdated::KIND,
    ];

    /// The kind tag identifying this variant in storage.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => TaskCreated::KIND,
            Self::Completed(_) => TaskCompleted::KIND,
            Self::Cancelled(_) => TaskCancelled::KIND,
            Self::Updated(_) => TaskUpdated::KIND,
        }
    }

    /// Serialize this variant's payload for persistence.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if the payload cannot be serialized.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(e) => serde_json::to_value(e),
            Self::Completed(e) => serde_json::to_value(e),
            Self::Cancelled(e) => serde_json::to_value(e),
            Self::Updated(e) => serde_json::to_value(e),
        }
    }

    /// Decode a stored (kind, payload) pair back into a typed event.
    ///
    /// This is the only path from stored data to domain events. An
    /// unrecognized kind is a data-integrity fault, not a domain error:
    /// it means the log holds events this build cannot replay.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::UnknownKind`] if `kind` is not one of
    /// [`Self::KINDS`], or [`EventDecodeError::Payload`] if the payload does
    /// not match the kind's shape.
    pub fn from_parts(kind: &str, payload: &serde_json::Value) -> Result<Self, EventDecodeError> {
        let payload_error = |source| EventDecodeError::Payload {
            kind: kind.to_string(),
            source,
        };
        match kind {
            TaskCreated::KIND => serde_json::from_value(payload.clone())
                .map(Self::Created)
                .map_err(payload_error),
            TaskCompleted::KIND => serde_json::from_value(payload.clone())
                .map(Self::Completed)
                .map_err(payload_error),
            TaskCancelled::KIND => serde_json::from_value(payload.clone())
                .map(Self::Cancelled)
                .map_err(payload_error),
            TaskUpdated::KIND => serde_json::from_value(payload.clone())
                .map(Self::Updated)
                .map_err(payload_error),
            other => Err(EventDecodeError::UnknownKind {
                kind: other.to_string(),
                expected: Self::KINDS,
            }),
        }
    }
}

/// Error returned when a stored event cannot be turned back into a
/// [`TaskEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The event kind was not recognized.
    #[error("unknown event kind `{kind}`, expected one of {expected:?}")]
    UnknownKind {
        kind: String,
        /// The kinds this build can replay.
        expected: &'static [&'static str],
    },
    /// The payload did not match the kind's shape.
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Free-form causation/correlation/actor information carried alongside an
/// event. Never consulted by replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

impl EventMetadata {
    /// Metadata recording only the acting user, if known.
    #[must_use]
    pub fn for_actor(actor: Option<&str>) -> Self {
        Self {
            actor: actor.map(str::to_owned),
            ..Self::default()
        }
    }
}

/// A not-yet-persisted event held in the aggregate's uncommitted buffer.
///
/// The event identity and occurrence timestamp are fixed at mutation time;
/// sequence and global position are assigned by the store on append.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    pub event_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub event: TaskEvent,
    pub metadata: EventMetadata,
}

impl PendingEvent {
    pub(crate) fn new(event: TaskEvent, metadata: EventMetadata) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            event,
            metadata,
        }
    }
}
