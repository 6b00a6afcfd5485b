//! The event log: contract and wire records.
//!
//! This module describes the storage contract ([`EventStore`]), the records
//! that cross it ([`PersistableEvent`] in, [`StoredEvent`] out), append
//! errors, and the diagnostic [`StoreStatistics`] snapshot. The reference
//! in-memory implementation lives in [`inmemory`].

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    concurrency::ConcurrencyConflict,
    event::{EventDecodeError, EventMetadata, PendingEvent, TaskEvent, TaskId},
};

pub mod inmemory;

/// Raw event data ready to be written to a store backend.
///
/// This is the boundary between repository and store: the repository
/// serializes domain events to this form, and the store assigns sequence
/// numbers and global positions when it persists them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistableEvent {
    pub event_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
    pub metadata: EventMetadata,
}

impl PersistableEvent {
    /// Serialize a pending domain event into its persistable form.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if the payload cannot be serialized.
    pub fn from_pending(pending: &PendingEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: pending.event_id,
            kind: pending.event.kind().to_string(),
            payload: pending.event.payload()?,
            recorded_at: pending.recorded_at,
            metadata: pending.metadata.clone(),
        })
    }
}

/// An event materialized from the store, with its assigned sequence number
/// and global position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub task_id: TaskId,
    pub kind: String,
    /// 1-based position within this task's history. Unique and contiguous
    /// per task: the first event is sequence 1, with no gaps thereafter.
    pub sequence: u64,
    /// 1-based position in the global insertion order, the cursor for
    /// [`EventStore::read_all`].
    pub position: u64,
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

impl StoredEvent {
    /// Decode the stored payload back into a typed [`TaskEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError`] if the kind is unrecognized or the
    /// payload does not match the kind's shape.
    pub fn decode(&self) -> Result<TaskEvent, EventDecodeError> {
        TaskEvent::from_parts(&self.kind, &self.payload)
    }
}

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// The expected version did not match the stored version. Nothing was
    /// appended; reload and rerun the whole operation.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// The backend failed. A failed append guarantees zero events were
    /// stored.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Read-only snapshot of the log's contents. Diagnostic only; the write path
/// never consults it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    pub total_events: u64,
    /// Number of distinct tasks with at least one event.
    pub task_count: u64,
    /// Event counts keyed by kind tag, in deterministic order.
    pub events_by_kind: BTreeMap<String, u64>,
    /// When the most recently appended event occurred.
    pub last_recorded_at: Option<DateTime<Utc>>,
}

/// Durable, ordered, per-task event storage with optimistic concurrency.
///
/// Implementations must make the version-check-and-write in [`append`]
/// atomic per task: no other append for the same task may interleave between
/// the check and the write. Appends for unrelated tasks need no mutual
/// coordination. Reads may run concurrently with writes but must observe a
/// consistent prefix of committed history - never part of a batch.
///
/// [`append`]: EventStore::append
pub trait EventStore: Send + Sync {
    /// Store-specific error type. Any failure here is unrecoverable for the
    /// current operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append `events` to `task_id`'s history at `expected_version`.
    ///
    /// `expected_version` must equal the task's current highest sequence
    /// number (0 if no events exist) at the instant of the check. On success
    /// the events receive sequence numbers
    /// `expected_version + 1 ..= expected_version + events.len()` in input
    /// order, plus consecutive global positions, and the stored records are
    /// returned so the caller can hand them to the publisher. An empty batch
    /// is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] when the stored version differs
    /// from `expected_version` (with nothing stored), or
    /// [`AppendError::Store`] when the backend fails.
    fn append<'a>(
        &'a self,
        task_id: TaskId,
        events: Vec<PersistableEvent>,
        expected_version: u64,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, AppendError<Self::Error>>> + Send + 'a;

    /// All events for `task_id` with sequence number strictly greater than
    /// `from_version`, ascending by sequence.
    ///
    /// An unknown id yields an empty vec, not an error.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn read_events<'a>(
        &'a self,
        task_id: TaskId,
        from_version: u64,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;

    /// Events across all tasks with global position strictly greater than
    /// `from_position`, in insertion order, at most `limit` of them.
    ///
    /// For replay and audit tooling; `from_position = 0` starts at the
    /// beginning of the log.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn read_all<'a>(
        &'a self,
        from_position: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;

    /// Highest stored sequence number for `task_id`, or 0.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn current_version<'a>(
        &'a self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

    /// True iff at least one event is stored for `task_id`.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn exists<'a>(
        &'a self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

    /// Diagnostic counts over the whole log.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the read fails.
    fn statistics<'a>(
        &'a self,
    ) -> impl Future<Output = Result<StoreStatistics, Self::Error>> + Send + 'a;
}
