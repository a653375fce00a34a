//! Worker pool scenarios against the in-memory store
//!
//! Producer → queue → dispatcher → worker → stats, end to end.

mod common;

use common::{args, config, recording_registry, run_until, wait_until};
use resq_core::application::{Dispatcher, EnqueueRequest, Producer};
use resq_core::domain::{FailureRecord, FAILED_QUEUE};
use resq_core::port::{InMemoryQueueStore, QueueStore, TaskError, TaskRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn failures(store: &InMemoryQueueStore) -> Vec<FailureRecord> {
    store
        .items(FAILED_QUEUE)
        .iter()
        .map(|record| serde_json::from_str(record.as_str()).unwrap())
        .collect()
}

/// Three workers, five jobs: every job runs exactly once, never more than three at a time
#[tokio::test]
async fn test_three_workers_process_five_jobs() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    for id in 1..=5 {
        producer
            .enqueue(EnqueueRequest::new("TestJob", "TestJob", args(json!({ "id": id }))))
            .await
            .unwrap();
    }
    assert_eq!(producer.size("TestJob").await.unwrap(), 5);

    let (registry, seen) = recording_registry("TestJob", Duration::from_millis(25));
    let dispatcher = Dispatcher::new(store.clone(), config(3, &["TestJob"])).unwrap();
    let metrics = dispatcher.metrics();

    run_until(&dispatcher, registry, wait_until(|| seen.lock().unwrap().len() == 5)).await;

    let mut ids = seen.lock().unwrap().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(metrics.peak_in_flight() <= 3);
    assert_eq!(store.get("processed").await.unwrap(), 5);
    assert_eq!(store.get("processed:task:TestJob").await.unwrap(), 5);
    assert_eq!(store.get("failed").await.unwrap(), 0);
    assert_eq!(store.size("TestJob").await.unwrap(), 0);
}

/// Per-worker counters add up to the global counter
#[tokio::test]
async fn test_per_worker_counters_sum_to_total() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    for id in 1..=6 {
        producer
            .enqueue(EnqueueRequest::new("Job", "q", args(json!({ "id": id }))))
            .await
            .unwrap();
    }

    let (registry, seen) = recording_registry("Job", Duration::from_millis(10));
    let dispatcher = Dispatcher::new(store.clone(), config(2, &["q"])).unwrap();
    run_until(&dispatcher, registry, wait_until(|| seen.lock().unwrap().len() == 6)).await;

    let pid = std::process::id();
    let mut per_worker = 0;
    for index in 0..2 {
        let key = format!("processed:worker:{}-{}:q", pid, index);
        per_worker += store.get(&key).await.unwrap();
    }
    assert_eq!(per_worker, 6);
}

/// Earlier queues in the configured order are drained first
#[tokio::test]
async fn test_queue_priority_order() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    for id in 1..=3 {
        producer
            .enqueue(EnqueueRequest::new("Job", "TestItem", args(json!({ "id": 100 + id }))))
            .await
            .unwrap();
        producer
            .enqueue(EnqueueRequest::new("Job", "TestJob", args(json!({ "id": id }))))
            .await
            .unwrap();
    }

    let (registry, seen) = recording_registry("Job", Duration::ZERO);
    let dispatcher = Dispatcher::new(store.clone(), config(1, &["TestJob", "TestItem"])).unwrap();
    run_until(&dispatcher, registry, wait_until(|| seen.lock().unwrap().len() == 6)).await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 101, 102, 103]);
}

/// An unknown job name is a recorded failure, and the pool keeps going
#[tokio::test]
async fn test_unknown_task_is_recorded_as_failure() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    producer
        .enqueue(EnqueueRequest::new("NotRegistered", "q", args(json!({ "id": 1 }))))
        .await
        .unwrap();
    producer
        .enqueue(EnqueueRequest::new("Job", "q", args(json!({ "id": 2 }))))
        .await
        .unwrap();

    let (registry, seen) = recording_registry("Job", Duration::ZERO);
    let dispatcher = Dispatcher::new(store.clone(), config(1, &["q"])).unwrap();
    run_until(&dispatcher, registry, wait_until(|| seen.lock().unwrap().len() == 1)).await;

    assert_eq!(store.get("failed").await.unwrap(), 1);
    assert_eq!(store.get("failed:task:NotRegistered").await.unwrap(), 1);
    assert_eq!(store.get("processed").await.unwrap(), 1);

    let recorded = failures(&store);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].payload.name, "NotRegistered");
    assert_eq!(recorded[0].queue, "q");
    assert!(recorded[0].error.contains("Unknown task"));
}

/// A panicking handler fails its job only
#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    for name in ["Boom", "Job", "Boom", "Job"] {
        producer
            .enqueue(EnqueueRequest::new(name, "q", args(json!({ "id": 7 }))))
            .await
            .unwrap();
    }

    let (mut registry, seen) = recording_registry("Job", Duration::ZERO);
    registry.register_fn("Boom", |_| async {
        if true {
            panic!("handler exploded");
        }
        Ok::<(), TaskError>(())
    });

    let dispatcher = Dispatcher::new(store.clone(), config(2, &["q"])).unwrap();
    let metrics = dispatcher.metrics();
    run_until(&dispatcher, registry, async {
        wait_until(|| seen.lock().unwrap().len() == 2).await;
        wait_until(|| store.items(FAILED_QUEUE).len() == 2).await;
    })
    .await;

    assert_eq!(store.get("failed:task:Boom").await.unwrap(), 2);
    assert_eq!(store.get("processed:task:Job").await.unwrap(), 2);
    assert!(failures(&store)
        .iter()
        .all(|f| f.error.contains("handler exploded")));
    assert_eq!(metrics.worker_restarts(), 0);
    assert_eq!(metrics.dead_workers(), 0);
}

/// A failing retry job is re-pushed after its delay and eventually succeeds
#[tokio::test(start_paused = true)]
async fn test_retry_after_delay() {
    let store = Arc::new(InMemoryQueueStore::new());
    Producer::new(store.clone())
        .enqueue(EnqueueRequest::new("Flaky", "q", args(json!({}))).with_retry(10))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = TaskRegistry::new();
    let counter = attempts.clone();
    registry.register_fn("Flaky", move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TaskError::Failed("first attempt".to_string()))
            } else {
                Ok(())
            }
        }
    });

    let started = tokio::time::Instant::now();
    let dispatcher = Dispatcher::new(store.clone(), config(1, &["q"])).unwrap();
    run_until(
        &dispatcher,
        registry,
        wait_until(|| attempts.load(Ordering::SeqCst) == 2),
    )
    .await;

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(store.get("failed").await.unwrap(), 1);
    assert_eq!(store.get("processed").await.unwrap(), 1);
    let recorded = failures(&store);
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].payload.retry);
    assert_eq!(recorded[0].payload.retry_every(), Duration::from_secs(10));
}

/// Shutdown mid-backlog: every job is either processed or still queued
#[tokio::test]
async fn test_shutdown_keeps_backlog() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());
    for id in 1..=30 {
        producer
            .enqueue(EnqueueRequest::new("Slow", "q", args(json!({ "id": id }))))
            .await
            .unwrap();
    }

    let (registry, seen) = recording_registry("Slow", Duration::from_millis(20));
    let dispatcher = Dispatcher::new(store.clone(), config(3, &["q"])).unwrap();
    run_until(&dispatcher, registry, wait_until(|| seen.lock().unwrap().len() >= 3)).await;

    let processed = seen.lock().unwrap().len() as i64;
    let remaining = store.size("q").await.unwrap();
    assert_eq!(processed + remaining, 30);
    assert_eq!(store.get("processed").await.unwrap(), processed);
}

/// Rejected requests never reach the store
#[tokio::test]
async fn test_invalid_enqueue_is_rejected() {
    let store = Arc::new(InMemoryQueueStore::new());
    let producer = Producer::new(store.clone());

    assert!(producer
        .enqueue(EnqueueRequest::new("Job", "bad queue", args(json!({}))))
        .await
        .is_err());
    assert!(producer
        .enqueue(EnqueueRequest::new("", "q", args(json!({}))))
        .await
        .is_err());
    assert_eq!(store.size("q").await.unwrap(), 0);
}
