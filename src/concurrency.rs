//! Optimistic-concurrency conflict reporting.
//!
//! Every append to the event log is version-checked: the writer states the
//! version it believed was current, and the store rejects the batch if the
//! stored version differs. This module defines the conflict error both sides
//! of that contract share.

use thiserror::Error;

/// Error indicating the expected version did not match the stored version at
/// append time.
///
/// Version 0 means "no events stored", so `expected: 0` is a writer that
/// believed it was creating the task. Nothing is stored when this error is
/// returned; the caller must reload the task and rerun the whole operation.
/// The engine never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", format_conflict(.expected, .actual))]
pub struct ConcurrencyConflict {
    /// The version the writer believed was current.
    pub expected: u64,
    /// The version actually stored.
    pub actual: u64,
}

/// Build a human-readable message for a [`ConcurrencyConflict`], including an
/// actionable hint for the caller.
fn format_conflict(expected: &u64, actual: &u64) -> String {
    if *expected == 0 {
        format!(
            "concurrency conflict: expected a new task, found version {actual} (hint: another \
             writer created this task; reload and retry)"
        )
    } else {
        format!(
            "concurrency conflict: expected version {expected}, found {actual} (hint: the task's \
             history advanced; reload and retry)"
        )
    }
}
