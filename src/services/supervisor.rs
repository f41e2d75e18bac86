//! Supervisor Loop (§4.8 Supervisor Loop, C9).
//!
//! Startup sequencing plus an idle-triggered duty cycle, grounded on the
//! same poll-sleep-reschedule shape the orchestrator's main loop uses:
//! check state, do work if warranted, sleep, repeat — always rescheduling
//! even when a cycle errors.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::{Lane, NewTask, Task, TaskMetadata};
use crate::domain::ports::notifier::Notifier;
use crate::infrastructure::config::{SupervisorConfig, TaskDefaultsConfig};
use crate::services::active_runs::ActiveRuns;
use crate::services::phase_executor::{Phase, PhaseExecutor};
use crate::services::task_queue::{CancellationSignal, RunnerFn, TaskQueue};
use crate::services::task_store::TaskStore;

/// Default `cycle_interval_ms` when not overridden by config (§4.8).
pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 60_000;

/// Produces the phases a spawned subagent should run for a given task.
pub type PhasePlanner = Arc<dyn Fn(&Task) -> Vec<Phase> + Send + Sync>;

pub struct Supervisor {
    store: Arc<TaskStore>,
    queue: Arc<TaskQueue>,
    executor: Arc<PhaseExecutor>,
    notifier: Arc<dyn Notifier>,
    active_runs: Arc<ActiveRuns>,
    phases: PhasePlanner,
    duty_phases: PhasePlanner,
    config: SupervisorConfig,
    task_defaults: TaskDefaultsConfig,
    duty_running: Mutex<bool>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<TaskQueue>,
        executor: Arc<PhaseExecutor>,
        notifier: Arc<dyn Notifier>,
        active_runs: Arc<ActiveRuns>,
        phases: PhasePlanner,
        duty_phases: PhasePlanner,
        config: SupervisorConfig,
        task_defaults: TaskDefaultsConfig,
    ) -> Self {
        Self {
            store,
            queue,
            executor,
            notifier,
            active_runs,
            phases,
            duty_phases,
            config,
            task_defaults,
            duty_running: Mutex::new(false),
        }
    }

    /// Startup sequence (§4.8): timeout monitor and task store are started
    /// by the caller's wiring; this only runs the one-shot health check and
    /// sends the startup notification.
    pub async fn startup(&self) -> anyhow::Result<()> {
        if let Some(channel) = &self.config.owner_channel {
            if let Err(err) = self.notifier.send(channel, "coreloop supervisor starting").await {
                tracing::warn!(error = %err, "startup notification failed");
            }
        }

        let health_task = self
            .assign_task("summarize current component health status".to_string(), Some(1), Lane::Maintenance)
            .await?;
        self.queue
            .wait_for_completion(health_task.id, self.config.timeout_ms)
            .await
            .map_err(|e| anyhow::anyhow!("startup health check failed: {e}"))?;
        Ok(())
    }

    /// Creates a task in lane Main (or the given lane) and enqueues it with
    /// a runner that spawns exactly one Autonomous subagent driving the
    /// Phase Executor; the parent's completion mirrors the subagent's.
    pub async fn assign_task(
        &self,
        description: String,
        max_retries: Option<u32>,
        lane: Lane,
    ) -> Result<Task, TaskError> {
        let task = self
            .store
            .create(Task::from_new_with_backoff_shape(
                NewTask {
                    description,
                    parent_task_id: None,
                    session_key: format!("agent:core:task:{}", Uuid::new_v4()),
                    lane,
                    metadata: TaskMetadata::default(),
                    max_attempts: max_retries.unwrap_or(self.config.max_attempts),
                    retry_backoff_ms: self.config.retry_backoff_ms,
                    timeout_ms: self.config.timeout_ms,
                },
                self.task_defaults.retry_backoff_multiplier,
                self.task_defaults.retry_backoff_cap_ms,
            ))
            .await?;

        let runner = self.subagent_runner();
        self.queue.enqueue(task.clone(), runner).await?;
        Ok(task)
    }

    fn subagent_runner(&self) -> RunnerFn {
        let executor = self.executor.clone();
        let phases = self.phases.clone();
        Arc::new(move |task: Task, _cancel: CancellationSignal| {
            let executor = executor.clone();
            let phase_list = (phases)(&task);
            let fut: BoxFuture<'static, Result<crate::domain::models::TaskResult, String>> =
                Box::pin(async move { executor.run(&task, &phase_list).await });
            fut
        })
    }

    fn duty_runner(&self) -> RunnerFn {
        let executor = self.executor.clone();
        let duty_phases = self.duty_phases.clone();
        Arc::new(move |task: Task, _cancel: CancellationSignal| {
            let executor = executor.clone();
            let phase_list = (duty_phases)(&task);
            let fut: BoxFuture<'static, Result<crate::domain::models::TaskResult, String>> =
                Box::pin(async move { executor.run(&task, &phase_list).await });
            fut
        })
    }

    /// One pass of the idle-triggered duty cycle (§4.8). Runs a duty-cycle
    /// task only if there are no active tasks and no duty cycle already
    /// in flight.
    async fn tick(&self) {
        let mut running = self.duty_running.lock().await;
        if *running {
            return;
        }

        let active = match self.store.get_active_tasks().await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::warn!(error = %err, "supervisor tick: failed to read active tasks");
                return;
            }
        };
        if !active.is_empty() {
            return;
        }

        *running = true;
        drop(running);

        let description = self.duty_description().await;
        let result = self
            .store
            .create(Task::from_new_with_backoff_shape(
                NewTask {
                    description,
                    parent_task_id: None,
                    session_key: format!("agent:core:duty:{}", Uuid::new_v4()),
                    lane: Lane::Maintenance,
                    metadata: TaskMetadata::default(),
                    max_attempts: 1,
                    retry_backoff_ms: self.config.retry_backoff_ms,
                    timeout_ms: self.config.timeout_ms,
                },
                self.task_defaults.retry_backoff_multiplier,
                self.task_defaults.retry_backoff_cap_ms,
            ))
            .await;

        match result {
            Ok(task) => {
                let runner = self.duty_runner();
                if let Err(err) = self.queue.enqueue(task, runner).await {
                    tracing::warn!(error = %err, "supervisor duty cycle enqueue failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "supervisor duty cycle task creation failed");
            }
        }

        *self.duty_running.lock().await = false;
    }

    /// Reads the duties prompt from `config.duties_file`, falling back to a
    /// generic description when the file is absent (§4.8 "a duties prompt").
    async fn duty_description(&self) -> String {
        match tokio::fs::read_to_string(&self.config.duties_file).await {
            Ok(contents) if !contents.trim().is_empty() => contents,
            _ => "run scheduled duties".to_string(),
        }
    }

    /// Runs the cycle loop until `shutdown` signals true. Always reschedules
    /// the next tick, even when the previous one errored (§4.8). A no-op
    /// loop (besides honoring shutdown) when `config.enabled` is false.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            let _ = shutdown.changed().await;
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.cycle_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub fn active_runs(&self) -> &Arc<ActiveRuns> {
        &self.active_runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderError;
    use crate::domain::models::{
        ActionKind, ProviderGroup, ProviderHandle, ProviderKind, ProviderStats, ProviderStatus,
    };
    use crate::domain::ports::backend::{BackendRegistry, BackendRequest, BackendResponse, LlmBackend};
    use crate::domain::ports::notifier::NullNotifier;
    use crate::infrastructure::filesystem::task_repo::FileTaskRepository;
    use crate::services::event_bus::EventBus;
    use crate::services::health_tracker::HealthTracker;
    use crate::services::provider_router::{ProviderRouter, RoutingTable};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EchoBackend;

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn complete(&self, request: BackendRequest) -> Result<BackendResponse, ProviderError> {
            Ok(BackendResponse { text: format!("ok:{}", request.prompt), response_time_ms: 1 })
        }
    }

    struct SingleBackendRegistry(Arc<dyn LlmBackend>);

    impl BackendRegistry for SingleBackendRegistry {
        fn get(&self, _provider_id: &str) -> Option<Arc<dyn LlmBackend>> {
            Some(self.0.clone())
        }
    }

    async fn make_supervisor() -> (Arc<Supervisor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(Arc::new(FileTaskRepository::new(dir.path().to_path_buf()))));
        let mut caps = HashMap::new();
        caps.insert(Lane::Main, 1);
        caps.insert(Lane::Autonomous, 1);
        caps.insert(Lane::Maintenance, 1);
        let queue = Arc::new(TaskQueue::new(store.clone(), caps));

        let tracker = Arc::new(HealthTracker::new());
        tracker
            .register(ProviderHandle {
                id: "p1".into(),
                display_name: "p1".into(),
                kind: ProviderKind::OpenAiCompatible,
                model: "m".into(),
                group: ProviderGroup::Configured,
                status: ProviderStatus::Healthy,
                stats: ProviderStats::default(),
                cooldown: None,
                healthy_since: None,
                parent: None,
                supported_actions: vec![ActionKind::Subagent],
            })
            .await;
        let router = Arc::new(ProviderRouter::new(
            tracker,
            RoutingTable { action_overrides: HashMap::new(), default_provider_id: Some("p1".into()) },
        ));
        let bus = Arc::new(EventBus::new());
        let backends: Arc<dyn BackendRegistry> = Arc::new(SingleBackendRegistry(Arc::new(EchoBackend)));
        let executor = Arc::new(PhaseExecutor::new(router, backends, bus));

        let phases: PhasePlanner = Arc::new(|task: &Task| {
            vec![Phase {
                name: "only".into(),
                prompt_builder: Arc::new({
                    let description = task.description.clone();
                    move |_task, _state| description.clone()
                }),
                extractor: Arc::new(|text, state| {
                    state.insert("result".into(), serde_json::Value::String(text.to_string()));
                    Ok(())
                }),
            }]
        });

        let supervisor = Arc::new(Supervisor::new(
            store,
            queue,
            executor,
            Arc::new(NullNotifier),
            Arc::new(ActiveRuns::new()),
            phases.clone(),
            phases,
            SupervisorConfig::default(),
            TaskDefaultsConfig::default(),
        ));
        (supervisor, dir)
    }

    #[tokio::test]
    async fn assign_task_creates_and_runs_subagent() {
        let (supervisor, _dir) = make_supervisor().await;
        let task = supervisor.assign_task("do the thing".into(), None, Lane::Main).await.unwrap();
        let result = supervisor.queue.wait_for_completion(task.id, 5_000).await.unwrap();
        let text = result.output["result"].as_str().unwrap();
        assert!(text.contains("do the thing"));
    }

    #[tokio::test]
    async fn tick_skips_duty_cycle_when_tasks_are_active() {
        let (supervisor, _dir) = make_supervisor().await;
        let _task = supervisor.assign_task("busy work".into(), None, Lane::Main).await.unwrap();
        supervisor.tick().await;
        let active = supervisor.store.get_active_tasks().await.unwrap();
        // the duty task must not have been created while `busy work` may
        // still be active/pending completion.
        assert!(active.iter().all(|t| t.description != "run scheduled duties"));
    }
}
