//! Gateway Adapters (§4.12 Gateway Adapters, C13).
//!
//! Thin typed surface bridging the core to external collaborators.
//! Protocol-specific concerns (HTTP routing, SSE, session cookies, CORS,
//! authentication) are delegated to whatever exposes this surface; the
//! Gateway itself only calls through to the services it wraps.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::{Event, EventType, Lane, NewTask, Task, TaskMetadata, TaskStatus};
use crate::domain::ports::JobRepository;
use crate::infrastructure::config::TaskDefaultsConfig;
use crate::services::event_bus::{EventBus, EventFilterFn, EventHandler, SubscriptionHandle};
use crate::services::health_tracker::HealthTracker;
use crate::services::task_queue::{RunnerFn, TaskQueue};
use crate::services::task_store::TaskStore;

/// Aggregate health snapshot for `query-status` (§0.5 status operation,
/// §4.12).
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_seconds: u64,
    pub queue_depth: std::collections::HashMap<String, usize>,
    pub providers: Vec<crate::domain::models::ProviderHandle>,
    pub active_task_count: usize,
}

pub struct Gateway {
    store: Arc<TaskStore>,
    queue: Arc<TaskQueue>,
    bus: Arc<EventBus>,
    tracker: Arc<HealthTracker>,
    jobs: Arc<dyn JobRepository>,
    task_defaults: TaskDefaultsConfig,
    started_at: Instant,
}

impl Gateway {
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<TaskQueue>,
        bus: Arc<EventBus>,
        tracker: Arc<HealthTracker>,
        jobs: Arc<dyn JobRepository>,
        task_defaults: TaskDefaultsConfig,
    ) -> Self {
        Self { store, queue, bus, tracker, jobs, task_defaults, started_at: Instant::now() }
    }

    /// Submits a new task to lane `lane` (default Main) and enqueues it
    /// with `runner`.
    pub async fn submit_task(
        &self,
        description: String,
        lane: Lane,
        session_key: String,
        max_attempts: u32,
        retry_backoff_ms: u64,
        timeout_ms: u64,
        runner: RunnerFn,
    ) -> Result<Task, TaskError> {
        let task = self
            .store
            .create(Task::from_new_with_backoff_shape(
                NewTask {
                    description,
                    parent_task_id: None,
                    session_key,
                    lane,
                    metadata: TaskMetadata::default(),
                    max_attempts,
                    retry_backoff_ms,
                    timeout_ms,
                },
                self.task_defaults.retry_backoff_multiplier,
                self.task_defaults.retry_backoff_cap_ms,
            ))
            .await?;
        self.queue.enqueue(task.clone(), runner).await?;
        Ok(task)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, TaskError> {
        self.store.list().await
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>, TaskError> {
        self.store.get(id).await
    }

    pub async fn list_jobs(&self) -> Result<crate::domain::models::JobsDocument, crate::domain::error::SchedulerError> {
        self.jobs.load().await
    }

    pub async fn query_status(&self) -> Result<StatusSnapshot, TaskError> {
        let active = self.store.get_active_tasks().await?;
        let mut queue_depth = std::collections::HashMap::new();
        for lane in [Lane::Main, Lane::Autonomous, Lane::Maintenance] {
            queue_depth.insert(lane.as_str().to_string(), self.queue.in_flight_count(lane));
        }
        Ok(StatusSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            queue_depth,
            providers: self.tracker.snapshot().await,
            active_task_count: active.iter().filter(|t| t.status != TaskStatus::Succeeded).count(),
        })
    }

    /// Subscribes `handler` to every published event, matching `filter` if given.
    pub async fn subscribe_to_events(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        self.bus.subscribe_all(handler, filter).await
    }

    pub async fn subscribe_to_event_type(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        self.bus.subscribe(event_type, handler, filter).await
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.bus.unsubscribe(handle).await;
    }

    /// One-shot wait for the next matching event (§4.1 `once`).
    pub async fn once(
        &self,
        event_type: EventType,
        filter: Option<EventFilterFn>,
        timeout_ms: u64,
    ) -> Result<Event, crate::domain::error::WaitError> {
        self.bus.once(event_type, filter, timeout_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskResult;
    use crate::infrastructure::filesystem::job_repo::FileJobRepository;
    use crate::infrastructure::filesystem::task_repo::FileTaskRepository;
    use crate::services::provider_router::ProviderRouter;
    use futures::future::BoxFuture;
    use std::collections::HashMap;

    async fn make_gateway() -> (Gateway, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(Arc::new(FileTaskRepository::new(dir.path().to_path_buf()))));
        let mut caps = HashMap::new();
        caps.insert(Lane::Main, 1);
        let queue = Arc::new(TaskQueue::new(store.clone(), caps));
        let bus = Arc::new(EventBus::new());
        let tracker = Arc::new(HealthTracker::new());
        let jobs = Arc::new(FileJobRepository::new(dir.path().to_path_buf()));
        let _router_unused: Option<Arc<ProviderRouter>> = None;
        (Gateway::new(store, queue, bus, tracker, jobs, TaskDefaultsConfig::default()), dir)
    }

    #[tokio::test]
    async fn submit_task_enqueues_and_runs() {
        let (gateway, _dir) = make_gateway().await;
        let runner: RunnerFn = Arc::new(|_task, _cancel| {
            let fut: BoxFuture<'static, Result<TaskResult, String>> =
                Box::pin(async move { Ok(TaskResult::from_output(serde_json::json!({"ok": true}))) });
            fut
        });

        let task = gateway
            .submit_task("say hi".into(), Lane::Main, "msg:dm:1".into(), 1, 10, 60_000, runner)
            .await
            .unwrap();

        let fetched = gateway.get_task(task.id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn query_status_reports_zero_active_when_idle() {
        let (gateway, _dir) = make_gateway().await;
        let status = gateway.query_status().await.unwrap();
        assert_eq!(status.active_task_count, 0);
    }

    #[tokio::test]
    async fn list_jobs_returns_empty_document_by_default() {
        let (gateway, _dir) = make_gateway().await;
        let doc = gateway.list_jobs().await.unwrap();
        assert!(doc.jobs.is_empty());
    }
}
