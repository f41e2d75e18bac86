//! Integration tests for the cron scheduler.
//!
//! Tests verify:
//! 1. `runNow` retries a failing trigger up to its configured limit, then
//!    records exactly one `job_started` and one `job_failed` event with the
//!    accumulated retry count
//! 2. The autonomous tick loop fires a due, enabled job exactly once and
//!    persists its result to the jobs document

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use coreloop::domain::models::{
    Action, EventType, JobRetryPolicy, JobRunStatus, ScheduledJob, Trigger,
};
use coreloop::domain::ports::{
    BackendRegistry, MemoryStore, NullMemoryStore, NullNotifier, ToolError, ToolRegistry,
};
use coreloop::infrastructure::filesystem::job_repo::FileJobRepository;
use coreloop::services::event_bus::EventBus;
use coreloop::services::scheduler::{Scheduler, SchedulerDeps};

/// A tool registry that fails its first `fail_times` calls, then succeeds.
struct FlakyToolRegistry {
    calls: AtomicU32,
    fail_times: u32,
}

#[async_trait]
impl ToolRegistry for FlakyToolRegistry {
    async fn call(&self, _tool: &str, _arguments: Value) -> Result<Value, ToolError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_times {
            Err(ToolError::ExecutionFailed("not yet".to_string()))
        } else {
            Ok(serde_json::json!({"ok": true}))
        }
    }
}

/// No backends wired; these tests only exercise `tool_call` triggers.
struct EmptyBackendRegistry;

impl BackendRegistry for EmptyBackendRegistry {
    fn get(&self, _provider_id: &str) -> Option<Arc<dyn coreloop::domain::ports::LlmBackend>> {
        None
    }
}

fn test_deps(tools: Arc<dyn ToolRegistry>, router: Arc<coreloop::services::ProviderRouter>) -> SchedulerDeps {
    SchedulerDeps {
        router,
        backends: Arc::new(EmptyBackendRegistry),
        tools,
        memory: Arc::new(NullMemoryStore) as Arc<dyn MemoryStore>,
        notifier: Arc::new(NullNotifier),
        http: reqwest::Client::new(),
    }
}

fn empty_router() -> Arc<coreloop::services::ProviderRouter> {
    let tracker = Arc::new(coreloop::services::health_tracker::HealthTracker::new());
    Arc::new(coreloop::services::ProviderRouter::new(tracker, Default::default()))
}

#[tokio::test]
async fn run_now_retries_then_fails_with_exactly_one_started_and_failed_event() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(FileJobRepository::new(dir.path()));
    let bus = Arc::new(EventBus::new());

    let started = Arc::new(AtomicU32::new(0));
    let failed = Arc::new(AtomicU32::new(0));
    {
        let started = started.clone();
        bus.subscribe_all(
            Arc::new(move |event: &coreloop::domain::models::Event| {
                if event.event_type == EventType::JobStarted {
                    started.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
            None,
        )
        .await;
    }
    {
        let failed = failed.clone();
        bus.subscribe_all(
            Arc::new(move |event: &coreloop::domain::models::Event| {
                if event.event_type == EventType::JobFailed {
                    failed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
            None,
        )
        .await;
    }

    let tools: Arc<dyn ToolRegistry> = Arc::new(FlakyToolRegistry { calls: AtomicU32::new(0), fail_times: 3 });
    let deps = test_deps(tools, empty_router());
    let scheduler = Scheduler::new(repo, bus, deps, coreloop::infrastructure::config::SchedulerSettings::default());

    let mut job = ScheduledJob::new("always-fails", "* * * * *", Trigger::ToolCall {
        tool: "noop".into(),
        arguments: serde_json::json!({}),
    });
    job.retry = JobRetryPolicy { on_failure: true, max_retries: 2, per_attempt_timeout_ms: 10 };
    scheduler.add(job.clone()).await.unwrap();

    let result = scheduler.run_now(job.id).await.unwrap();

    assert_eq!(result.status, JobRunStatus::Failed);
    assert_eq!(result.retry_count, 2);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tick_loop_fires_a_due_job_exactly_once_and_persists_its_result() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(FileJobRepository::new(dir.path()));
    let bus = Arc::new(EventBus::new());

    let completed = Arc::new(AtomicU32::new(0));
    {
        let completed = completed.clone();
        bus.subscribe_all(
            Arc::new(move |event: &coreloop::domain::models::Event| {
                if event.event_type == EventType::JobCompleted {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
            None,
        )
        .await;
    }

    let tools: Arc<dyn ToolRegistry> = Arc::new(FlakyToolRegistry { calls: AtomicU32::new(0), fail_times: 0 });
    let deps = test_deps(tools, empty_router());
    let scheduler = Arc::new(Scheduler::new(
        repo.clone(),
        bus,
        deps,
        coreloop::infrastructure::config::SchedulerSettings::default(),
    ));

    // Six-field form with a wildcard seconds slot fires every tick, unlike a
    // plain 5-field expression which only fires at the top of the minute --
    // this test can't wait a real minute for the tick loop to catch it.
    let mut job = ScheduledJob::new(
        "every-second",
        "* * * * * *",
        Trigger::ToolCall { tool: "noop".into(), arguments: serde_json::json!({}) },
    )
    .with_actions(vec![Action::LogEvent { message: "ran".into(), data: serde_json::json!({}) }]);
    job.retry = JobRetryPolicy { on_failure: false, max_retries: 0, per_attempt_timeout_ms: 10 };
    let job_id = job.id;
    scheduler.add(job).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.clone().run(shutdown_rx));

    // `tokio::time::interval` fires its first tick immediately, which is
    // enough to catch this due job once; shut down well before the next
    // tick (1s later) would fire it a second time.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 1);
    let doc = scheduler.load_document().await.unwrap();
    let stored = doc.jobs.iter().find(|j| j.id == job_id).unwrap();
    assert!(stored.last_run_at.is_some());
    assert_eq!(stored.last_result.as_ref().unwrap().status, JobRunStatus::Succeeded);
}
