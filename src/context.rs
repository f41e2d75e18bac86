//! Process-wide dependency injection (§0.5 AppContext): builds every
//! long-lived component once and hands `Arc` handles to the Gateway, the
//! Supervisor loop, and the Scheduler loop. Grounded on the source
//! project's `main.rs` wiring pattern (repositories, then services, then
//! handlers), lifted into a single reusable struct instead of inlined in
//! `main`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::adapters::gateway::Gateway;
use crate::adapters::substrates::{ConfiguredBackendRegistry, OpenAiCompatibleBackend};
use crate::domain::models::{
    ActionKind, ProviderGroup, ProviderHandle, ProviderKind, ProviderStats, ProviderStatus,
};
use crate::domain::ports::backend::{BackendRegistry, LlmBackend};
use crate::domain::ports::{MemoryStore, NullMemoryStore, NullNotifier, NullToolRegistry, Notifier, ToolRegistry};
use crate::infrastructure::config::Config;
use crate::infrastructure::database::{DatabaseConnection, SqliteEventStore};
use crate::infrastructure::filesystem::{FileJobRepository, FileRestartStore, FileTaskRepository};
use crate::services::event_store_service::EventStoreConfig;
use crate::services::health_tracker::HealthTrackerHandler;
use crate::services::provider_router::RoutingTable;
use crate::services::{
    ActiveRuns, EventBus, EventStoreService, HealthTracker, PhaseExecutor, ProviderRouter,
    RestartCoordinator, Scheduler, Supervisor, TaskQueue, TaskStore,
};

/// Everything the Gateway and the background loops need, wired once at
/// startup and shared via `Arc`.
pub struct AppContext {
    pub config: Config,
    pub event_bus: Arc<EventBus>,
    pub event_store: Arc<EventStoreService>,
    pub task_store: Arc<TaskStore>,
    pub task_queue: Arc<TaskQueue>,
    pub health_tracker: Arc<HealthTracker>,
    pub provider_router: Arc<ProviderRouter>,
    pub backend_registry: Arc<dyn BackendRegistry>,
    pub phase_executor: Arc<PhaseExecutor>,
    pub job_repository: Arc<FileJobRepository>,
    pub scheduler: Arc<Scheduler>,
    pub restart_coordinator: Arc<RestartCoordinator>,
    pub active_runs: Arc<ActiveRuns>,
    pub notifier: Arc<dyn Notifier>,
    pub memory_store: Arc<dyn MemoryStore>,
    pub tool_registry: Arc<dyn ToolRegistry>,
    pub gateway: Arc<Gateway>,
}

fn provider_kind_from_str(kind: &str) -> ProviderKind {
    match kind {
        "cli-subprocess" => ProviderKind::CliSubprocess,
        "ollama" => ProviderKind::Ollama,
        _ => ProviderKind::OpenAiCompatible,
    }
}

impl AppContext {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let db = DatabaseConnection::new(&config.database.url)
            .await
            .context("failed to connect to the event store database")?;
        db.migrate().await.context("failed to run event store migrations")?;

        let event_store: Arc<dyn crate::domain::ports::EventStore> =
            Arc::new(SqliteEventStore::new(db.pool().clone()));
        let event_bus = Arc::new(EventBus::new());
        let event_store_service = Arc::new(EventStoreService::new(
            event_store,
            EventStoreConfig {
                retention_days: config.event_store.retention_days,
                cleanup_on_startup: config.event_store.cleanup_on_startup,
                cleanup_interval_hours: config.event_store.cleanup_interval_hours,
            },
        ));
        event_store_service.attach(&event_bus).await;

        let task_repo = Arc::new(FileTaskRepository::new(config.database.state_dir.clone().into()));
        let task_store = Arc::new(TaskStore::with_ttl(
            task_repo,
            Duration::from_millis(config.task_defaults.registry_cache_ttl_ms),
        ));

        let mut max_concurrent = HashMap::new();
        max_concurrent.insert(
            crate::domain::models::Lane::Main,
            config.lanes.main_max_concurrent as usize,
        );
        max_concurrent.insert(
            crate::domain::models::Lane::Autonomous,
            config.lanes.autonomous_max_concurrent as usize,
        );
        max_concurrent.insert(
            crate::domain::models::Lane::Maintenance,
            config.lanes.maintenance_max_concurrent as usize,
        );
        let task_queue = Arc::new(TaskQueue::new(task_store.clone(), max_concurrent));

        let health_tracker = Arc::new(HealthTracker::new());
        Arc::new(HealthTrackerHandler::new(health_tracker.clone())).attach(&event_bus).await;

        let mut backends: HashMap<String, Arc<dyn LlmBackend>> = HashMap::new();
        let mut default_provider_id = None;
        for provider in &config.providers {
            health_tracker
                .register(ProviderHandle {
                    id: provider.id.clone(),
                    display_name: provider.display_name.clone(),
                    kind: provider_kind_from_str(&provider.kind),
                    model: provider.model.clone(),
                    group: ProviderGroup::Configured,
                    status: ProviderStatus::Healthy,
                    stats: ProviderStats::default(),
                    cooldown: None,
                    healthy_since: None,
                    parent: provider.parent.clone(),
                    supported_actions: vec![
                        ActionKind::Chat,
                        ActionKind::Tools,
                        ActionKind::Summary,
                        ActionKind::Subagent,
                    ],
                })
                .await;

            if let Some(base_url) = &provider.base_url {
                let api_key = provider
                    .api_key_env
                    .as_ref()
                    .and_then(|var| std::env::var(var).ok());
                let backend = OpenAiCompatibleBackend::new(base_url.clone(), api_key)
                    .context("failed to build HTTP backend client")?;
                backends.insert(provider.id.clone(), Arc::new(backend));
            }
            default_provider_id.get_or_insert_with(|| provider.id.clone());
        }

        let provider_router = Arc::new(ProviderRouter::new(
            health_tracker.clone(),
            RoutingTable { action_overrides: HashMap::new(), default_provider_id },
        ));
        let backend_registry: Arc<dyn BackendRegistry> = Arc::new(ConfiguredBackendRegistry::new(backends));

        let phase_executor = Arc::new(PhaseExecutor::new(
            provider_router.clone(),
            backend_registry.clone(),
            event_bus.clone(),
        ));

        let job_repository = Arc::new(FileJobRepository::new(config.database.state_dir.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(NullNotifier);
        let memory_store: Arc<dyn MemoryStore> = Arc::new(NullMemoryStore);
        let tool_registry: Arc<dyn ToolRegistry> = Arc::new(NullToolRegistry);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(crate::services::scheduler::DEFAULT_HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build the scheduler's webhook HTTP client")?;
        let scheduler = Arc::new(Scheduler::new(
            job_repository.clone(),
            event_bus.clone(),
            crate::services::scheduler::SchedulerDeps {
                router: provider_router.clone(),
                backends: backend_registry.clone(),
                tools: tool_registry.clone(),
                memory: memory_store.clone(),
                notifier: notifier.clone(),
                http: http_client,
            },
            config.scheduler.clone(),
        ));

        let restart_store = Arc::new(FileRestartStore::new(config.database.state_dir.clone()));
        let restart_coordinator = Arc::new(RestartCoordinator::new(restart_store));

        let active_runs = Arc::new(ActiveRuns::new());

        let gateway = Arc::new(Gateway::new(
            task_store.clone(),
            task_queue.clone(),
            event_bus.clone(),
            health_tracker.clone(),
            job_repository.clone(),
            config.task_defaults.clone(),
        ));

        Ok(Self {
            config,
            event_bus,
            event_store: event_store_service,
            task_store,
            task_queue,
            health_tracker,
            provider_router,
            backend_registry,
            phase_executor,
            job_repository,
            scheduler,
            restart_coordinator,
            active_runs,
            notifier,
            memory_store,
            tool_registry,
            gateway,
        })
    }

    /// Builds the Supervisor loop over this context's task store/queue/executor,
    /// sourcing its settings from the loaded `coreloop.toml`/env config rather
    /// than a caller-supplied default.
    pub fn build_supervisor(
        &self,
        phases: crate::services::supervisor::PhasePlanner,
        duty_phases: crate::services::supervisor::PhasePlanner,
    ) -> Arc<Supervisor> {
        Arc::new(Supervisor::new(
            self.task_store.clone(),
            self.task_queue.clone(),
            self.phase_executor.clone(),
            self.notifier.clone(),
            self.active_runs.clone(),
            phases,
            duty_phases,
            self.config.supervisor.clone(),
            self.config.task_defaults.clone(),
        ))
    }
}
