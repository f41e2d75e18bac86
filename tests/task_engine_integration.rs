//! Integration tests for the lane-limited task engine.
//!
//! Tests verify:
//! 1. A lane's `maxConcurrent` cap is never exceeded under concurrent load
//! 2. Cooperative cancellation of a running task is observed and recorded
//! 3. The timeout monitor fires exactly once for a task left running past its deadline

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coreloop::domain::models::{Lane, NewTask, Task, TaskMetadata, TaskResult, TaskStatus};
use coreloop::infrastructure::filesystem::task_repo::FileTaskRepository;
use coreloop::services::task_queue::{RunnerFn, TaskQueue};
use coreloop::services::task_store::TaskStore;
use coreloop::services::timeout_monitor::TimeoutMonitor;

async fn make_store() -> Arc<TaskStore> {
    let dir = tempfile::tempdir().unwrap();
    Arc::new(TaskStore::new(Arc::new(FileTaskRepository::new(dir.path().to_path_buf()))))
}

fn lane_caps(main: usize) -> HashMap<Lane, usize> {
    let mut caps = HashMap::new();
    caps.insert(Lane::Main, main);
    caps.insert(Lane::Autonomous, 1);
    caps.insert(Lane::Maintenance, 1);
    caps
}

fn sample_task(lane: Lane, timeout_ms: u64) -> Task {
    Task::from_new(NewTask {
        description: "do a thing".into(),
        parent_task_id: None,
        session_key: "msg:dm:1".into(),
        lane,
        metadata: TaskMetadata::default(),
        max_attempts: 1,
        retry_backoff_ms: 10,
        timeout_ms,
    })
}

#[tokio::test]
async fn lane_cap_is_never_exceeded_under_concurrent_load() {
    let store = make_store().await;
    let queue = Arc::new(TaskQueue::new(store.clone(), lane_caps(2)));

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let task = store.create(sample_task(Lane::Main, 60_000)).await.unwrap();
        let current = current.clone();
        let peak = peak.clone();
        let runner: RunnerFn = Arc::new(move |task, _signal| {
            let current = current.clone();
            let peak = peak.clone();
            Box::pin(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(TaskResult::from_output(serde_json::json!({"task": task.id.to_string()})))
            })
        });
        queue.enqueue(task, runner).await.unwrap();
    }

    // Six tasks at cap 2, ~30ms each: give the lane enough time to drain.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(peak.load(Ordering::SeqCst) <= 2, "lane exceeded its maxConcurrent cap");
}

#[tokio::test]
async fn cancelling_a_running_task_is_observed_cooperatively() {
    let store = make_store().await;
    let queue = Arc::new(TaskQueue::new(store.clone(), lane_caps(1)));

    let task = store.create(sample_task(Lane::Main, 60_000)).await.unwrap();
    let runner: RunnerFn = Arc::new(|_task, mut signal| {
        Box::pin(async move {
            signal.cancelled().await;
            Err("cancelled mid-run".to_string())
        })
    });
    queue.enqueue(task.clone(), runner).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.cancel(task.id).await.unwrap();

    let err = queue.wait_for_completion(task.id, 1000).await;
    assert!(err.is_err());
    let stored = store.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn timeout_monitor_fires_once_for_a_task_left_running_past_deadline() {
    let store = make_store().await;
    let queue = Arc::new(TaskQueue::new(store.clone(), lane_caps(1)));

    // A runner that outlives its own timeout; the monitor -- not the queue --
    // is what's expected to notice.
    let task = store.create(sample_task(Lane::Main, 5)).await.unwrap();
    let runner: RunnerFn = Arc::new(|task, _signal| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(TaskResult::from_output(serde_json::json!({"task": task.id.to_string()})))
        })
    });
    queue.enqueue(task.clone(), runner).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let timeout_count = Arc::new(AtomicUsize::new(0));
    let counted = timeout_count.clone();
    let monitor = TimeoutMonitor::new(
        store.clone(),
        Arc::new(|_task, _ms_left| {}),
        Arc::new(move |_task| {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    );
    monitor.sweep_once().await.unwrap();
    monitor.sweep_once().await.unwrap();
    monitor.sweep_once().await.unwrap();

    assert_eq!(timeout_count.load(Ordering::SeqCst), 1);
}
