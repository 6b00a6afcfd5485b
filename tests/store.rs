//! Contract tests for the event log.

use chrono::Utc;
use pretty_assertions::assert_eq;
use taskstream::{
    TaskId,
    event::{EventMetadata, TaskCancelled, TaskCompleted, TaskCreated, TaskEvent},
    store::{AppendError, EventStore, PersistableEvent, inmemory::InMemoryStore},
    task::Priority,
};
use uuid::Uuid;

fn persistable(event: &TaskEvent) -> PersistableEvent {
    PersistableEvent {
        event_id: Uuid::new_v4(),
        kind: event.kind().to_string(),
        payload: event.payload().unwrap(),
        recorded_at: Utc::now(),
        metadata: EventMetadata::default(),
    }
}

fn created(title: &str) -> TaskEvent {
    TaskEvent::Created(TaskCreated {
        title: title.to_string(),
        description: None,
        priority: Priority::Medium,
    })
}

#[tokio::test]
async fn append_then_read_roundtrips_in_sequence_order() {
    let store = InMemoryStore::new();
    let id = TaskId::random();
    let batch = vec![
        persistable(&created("Write report")),
        persistable(&TaskEvent::Completed(TaskCompleted {})),
    ];
    let appended_ids: Vec<Uuid> = batch.iter().map(|e| e.event_id).collect();

    store.append(id, batch, 0).await.unwrap();
    let events = store.read_events(id, 0).await.unwrap();

    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    let read_ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
    assert_eq!(read_ids, appended_ids);

    // Stored payloads decode back to what was appended.
    assert_eq!(events[0].decode().unwrap(), created("Write report"));
    assert_eq!(
        events[1].decode().unwrap(),
        TaskEvent::Completed(TaskCompleted {})
    );
}

#[tokio::test]
async fn conflicting_append_stores_nothing() {
    let store = InMemoryStore::new();
    let id = TaskId::random();
    store
        .append(id, vec![persistable(&created("Write report"))], 0)
        .await
        .unwrap();

    // Stale writer: expects the version it saw before the first append.
    let result = store
        .append(
            id,
            vec![
                persistable(&TaskEvent::Cancelled(TaskCancelled {})),
                persistable(&TaskEvent::Completed(TaskCompleted {})),
            ],
            0,
        )
        .await;

    assert!(matches!(
        result,
        Err(AppendError::Conflict(c)) if c.expected == 0 && c.actual == 1
    ));
    // No partial batch is ever visible.
    assert_eq!(store.read_events(id, 0).await.unwrap().len(), 1);
    assert_eq!(store.read_all(0, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn exactly_one_of_two_racing_writers_wins() {
    let store = InMemoryStore::new();
    let id = TaskId::random();
    store
        .append(id, vec![persistable(&created("Write report"))], 0)
        .await
        .unwrap();

    // Both writers read version 1, then race their appends.
    let complete = store
        .append(id, vec![persistable(&TaskEvent::Completed(TaskCompleted {}))], 1)
        .await;
    let cancel = store
        .append(id, vec![persistable(&TaskEvent::Cancelled(TaskCancelled {}))], 1)
        .await;

    assert!(complete.is_ok());
    assert!(matches!(cancel, Err(AppendError::Conflict(_))));
    assert_eq!(store.current_version(id).await.unwrap(), 2);
}

#[tokio::test]
async fn unrelated_tasks_do_not_conflict() {
    let store = InMemoryStore::new();
    let a = TaskId::random();
    let b = TaskId::random();

    store
        .append(a, vec![persistable(&created("Task A"))], 0)
        .await
        .unwrap();
    store
        .append(b, vec![persistable(&created("Task B"))], 0)
        .await
        .unwrap();

    assert_eq!(store.current_version(a).await.unwrap(), 1);
    assert_eq!(store.current_version(b).await.unwrap(), 1);
    assert_eq!(store.read_events(a, 0).await.unwrap().len(), 1);
    assert_eq!(store.read_events(b, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn read_all_pages_through_the_global_log() {
    let store = InMemoryStore::new();
    let a = TaskId::random();
    let b = TaskId::random();
    store
        .append(a, vec![persistable(&created("Task A"))], 0)
        .await
        .unwrap();
    store
        .append(b, vec![persistable(&created("Task B"))], 0)
        .await
        .unwrap();
    store
        .append(a, vec![persistable(&TaskEvent::Cancelled(TaskCancelled {}))], 1)
        .await
        .unwrap();

    let mut cursor = 0;
    let mut pages = Vec::new();
    loop {
        let page = store.read_all(cursor, 2).await.unwrap();
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|e| e.position).unwrap_or(cursor);
        pages.push(page);
    }

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].len(), 2);
    assert_eq!(pages[1].len(), 1);
    let positions: Vec<u64> = pages.concat().iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[tokio::test]
async fn statistics_reflect_the_whole_log() {
    let store = InMemoryStore::new();
    let a = TaskId::random();
    let b = TaskId::random();
    store
        .append(a, vec![persistable(&created("Task A"))], 0)
        .await
        .unwrap();
    store
        .append(b, vec![persistable(&created("Task B"))], 0)
        .await
        .unwrap();
    store
        .append(a, vec![persistable(&TaskEvent::Completed(TaskCompleted {}))], 1)
        .await
        .unwrap();

    let stats = store.statistics().await.unwrap();

    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.task_count, 2);
    assert_eq!(stats.events_by_kind.get(TaskCreated::KIND), Some(&2));
    assert_eq!(stats.events_by_kind.get(TaskCompleted::KIND), Some(&1));
    assert_eq!(stats.events_by_kind.get(TaskCancelled::KIND), None);

    let last = store.read_all(2, 1).await.unwrap();
    assert_eq!(stats.last_recorded_at, Some(last[0].recorded_at));
}
