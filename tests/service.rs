//! Full-stack scenarios through the application service.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use taskstream::{
    CreateTask, EventListener, EventPublisher, Priority, ServiceError, TaskRepository, TaskService,
    TaskStatus, UpdateTask,
    event::{EventMetadata, TaskCreated, TaskUpdated},
    publisher::ListenerError,
    store::inmemory::InMemoryStore,
    store::{EventStore, StoredEvent},
};

fn fixture() -> (TaskService<InMemoryStore>, InMemoryStore, Arc<EventPublisher>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = InMemoryStore::new();
    let publisher = Arc::new(EventPublisher::new());
    let service = TaskService::new(TaskRepository::new(store.clone()), Arc::clone(&publisher));
    (service, store, publisher)
}

fn create_input(title: &str) -> CreateTask {
    CreateTask {
        title: title.to_string(),
        ..CreateTask::default()
    }
}

struct RecordingListener {
    kind: &'static str,
    seen: AtomicUsize,
}

impl RecordingListener {
    fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            seen: AtomicUsize::new(0),
        })
    }

    fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn wants(&self, kind: &str) -> bool {
        kind == self.kind
    }

    async fn on_event(&self, _event: &StoredEvent) -> Result<(), ListenerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ExplodingListener;

#[async_trait]
impl EventListener for ExplodingListener {
    fn name(&self) -> &str {
        "exploding"
    }

    fn wants(&self, _kind: &str) -> bool {
        true
    }

    async fn on_event(&self, _event: &StoredEvent) -> Result<(), ListenerError> {
        Err("view refresh failed".into())
    }
}

#[tokio::test]
async fn created_task_is_loadable_at_version_one() {
    let (service, _, _) = fixture();

    let id = service
        .create_task(
            CreateTask {
                title: "Write report".to_string(),
                description: Some("quarterly numbers".to_string()),
                priority: Some(Priority::High),
            },
            Some("alice"),
        )
        .await
        .unwrap();

    let task = service.repository().load(id).await.unwrap();
    assert_eq!(task.version(), 1);
    assert_eq!(task.title(), "Write report");
    assert_eq!(task.description(), Some("quarterly numbers"));
    assert_eq!(task.priority(), Priority::High);
    assert_eq!(task.status(), TaskStatus::Pending);
}

#[tokio::test]
async fn create_records_the_acting_user() {
    let (service, store, _) = fixture();

    let id = service
        .create_task(create_input("Write report"), Some("alice"))
        .await
        .unwrap();

    let events = store.read_events(id, 0).await.unwrap();
    assert_eq!(events[0].metadata.actor.as_deref(), Some("alice"));
}

#[tokio::test]
async fn create_with_blank_title_is_rejected() {
    let (service, store, _) = fixture();

    let err = service
        .create_task(create_input("   "), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
    // Nothing was stored by the rejected command.
    let stats = store.statistics().await.unwrap();
    assert_eq!(stats.total_events, 0);
}

#[tokio::test]
async fn cancelled_task_cannot_be_completed() {
    let (service, _, _) = fixture();
    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();

    service.cancel_task(id, None).await.unwrap();

    let task = service.repository().load(id).await.unwrap();
    assert_eq!(task.version(), 2);
    assert_eq!(task.status(), TaskStatus::Cancelled);

    let err = service.complete_task(id, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transition(t)
        if t.action == "complete" && t.status == TaskStatus::Cancelled));

    // The rejected transition appended nothing.
    let task = service.repository().load(id).await.unwrap();
    assert_eq!(task.version(), 2);
}

#[tokio::test]
async fn terminal_states_reject_further_transitions() {
    let (service, _, _) = fixture();
    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();
    service.complete_task(id, None).await.unwrap();

    let complete_again = service.complete_task(id, None).await.unwrap_err();
    assert!(matches!(complete_again, ServiceError::Transition(_)));

    let cancel_completed = service.cancel_task(id, None).await.unwrap_err();
    assert!(matches!(cancel_completed, ServiceError::Transition(t)
        if t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn noop_update_stores_and_publishes_nothing() {
    let (service, _, publisher) = fixture();
    let updates = RecordingListener::new(TaskUpdated::KIND);
    publisher.subscribe(Arc::clone(&updates) as Arc<dyn EventListener>);

    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();

    service
        .update_task(
            id,
            UpdateTask {
                title: Some("  Write report ".to_string()),
                description: None,
                priority: Some(Priority::Medium),
            },
            None,
        )
        .await
        .unwrap();

    let task = service.repository().load(id).await.unwrap();
    assert_eq!(task.version(), 1);
    assert_eq!(updates.seen(), 0);
}

#[tokio::test]
async fn update_event_carries_only_changed_fields() {
    let (service, store, _) = fixture();
    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();

    service
        .update_task(
            id,
            UpdateTask {
                title: Some("Write Q3 report".to_string()),
                description: None,
                priority: Some(Priority::Medium),
            },
            None,
        )
        .await
        .unwrap();

    let events = store.read_events(id, 1).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload,
        serde_json::json!({"title": "Write Q3 report"})
    );
}

#[tokio::test]
async fn updating_one_task_leaves_others_untouched() {
    let (service, store, _) = fixture();
    let a = service.create_task(create_input("Task A"), None).await.unwrap();
    let b = service.create_task(create_input("Task B"), None).await.unwrap();

    service
        .update_task(
            a,
            UpdateTask {
                priority: Some(Priority::High),
                ..UpdateTask::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(service.repository().load(a).await.unwrap().version(), 2);
    assert_eq!(service.repository().load(b).await.unwrap().version(), 1);
    let b_events = store.read_events(b, 0).await.unwrap();
    assert_eq!(b_events.len(), 1);
    assert_eq!(b_events[0].kind, TaskCreated::KIND);
}

#[tokio::test]
async fn operations_on_unknown_tasks_are_not_found() {
    let (service, _, _) = fixture();
    let id = taskstream::TaskId::random();

    assert!(!service.task_exists(id).await.unwrap());
    for err in [
        service.complete_task(id, None).await.unwrap_err(),
        service.cancel_task(id, None).await.unwrap_err(),
        service
            .update_task(id, UpdateTask::default(), None)
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, ServiceError::NotFound(missing) if missing == id));
    }
}

#[tokio::test]
async fn stale_writer_loses_with_a_conflict() {
    let (service, _, _) = fixture();
    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();
    let repository = service.repository();

    // Two concurrent operations load the same version...
    let mut first = repository.load(id).await.unwrap();
    let mut second = repository.load(id).await.unwrap();

    // ...the first one wins the append...
    first.complete(EventMetadata::default()).unwrap();
    repository.save(&mut first).await.unwrap();

    // ...and the second must fail with a conflict, not silently fork history.
    second.cancel(EventMetadata::default()).unwrap();
    let err = repository.save(&mut second).await.unwrap_err();
    assert!(matches!(
        err,
        taskstream::repository::SaveError::Conflict(c) if c.expected == 1 && c.actual == 2
    ));

    let settled = repository.load(id).await.unwrap();
    assert_eq!(settled.version(), 2);
    assert_eq!(settled.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn listener_failure_does_not_fail_the_write_or_other_listeners() {
    let (service, _, publisher) = fixture();
    let creations = RecordingListener::new(TaskCreated::KIND);
    // The failing listener is registered first; if its error propagated it
    // would both fail the write and starve the listener behind it.
    publisher.subscribe(Arc::new(ExplodingListener));
    publisher.subscribe(Arc::clone(&creations) as Arc<dyn EventListener>);

    let id = service
        .create_task(create_input("Write report"), None)
        .await
        .unwrap();

    assert!(service.task_exists(id).await.unwrap());
    assert_eq!(creations.seen(), 1);
}

#[tokio::test]
async fn listeners_receive_every_committed_event_of_their_kind() {
    let (service, _, publisher) = fixture();
    let creations = RecordingListener::new(TaskCreated::KIND);
    publisher.subscribe(Arc::clone(&creations) as Arc<dyn EventListener>);

    service.create_task(create_input("Task A"), None).await.unwrap();
    service.create_task(create_input("Task B"), None).await.unwrap();

    assert_eq!(creations.seen(), 2);
}
