//! Event-sourced task engine.
//!
//! Every state change to a task is recorded as an immutable event in an
//! append-only log; current state is reconstructed on demand by replaying
//! that history. This crate is the write path:
//!
//! - [`store`] - the append-only event log with optimistic concurrency
//!   ([`store::EventStore`], reference [`store::inmemory::InMemoryStore`])
//! - [`task`] - the aggregate: business rules, event production, replay
//! - [`repository`] - loads tasks by replay, persists their new events
//! - [`publisher`] - post-commit, in-process fan-out to listeners
//! - [`service`] - one operation per use case, composed explicitly
//! - [`event`] - the domain event sum type and wire-adjacent records
//! - [`concurrency`] - conflict reporting for version-checked appends
//!
//! Concurrent writers against the same task are serialized by the log's
//! version-checked append: the loser receives a
//! [`ConcurrencyConflict`](concurrency::ConcurrencyConflict) and must reload
//! and retry. The engine itself never retries.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use taskstream::{
//!     publisher::EventPublisher, repository::TaskRepository, service::TaskService,
//!     store::inmemory::InMemoryStore,
//! };
//!
//! // Explicit wiring at process start: store, repository, publisher, service.
//! let repository = TaskRepository::new(InMemoryStore::new());
//! let service = TaskService::new(repository, Arc::new(EventPublisher::new()));
//! ```

pub mod concurrency;
pub mod event;
pub mod publisher;
pub mod repository;
pub mod service;
pub mod store;
pub mod task;



pub use concurrency::ConcurrencyConflict;
pub use event::{EventMetadata, TaskEvent, TaskId};
pub use publisher::{EventListener, EventPublisher, PublishSummary};
pub use repository::TaskRepository;
pub use service::{ServiceError, TaskService};
pub use store::{EventStore, StoreStatistics, StoredEvent, inmemory::InMemoryStore};
pub use task::{CreateTask, Priority, Task, TaskStatus, UpdateTask};
