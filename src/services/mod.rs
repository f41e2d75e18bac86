//! Application services: the core's orchestration logic, independent of
//! any concrete transport or storage technology (those live under
//! `infrastructure` and `adapters`).

pub mod active_runs;
pub mod event_bus;
pub mod event_store_service;
pub mod health_tracker;
pub mod phase_executor;
pub mod provider_router;
pub mod restart_coordinator;
pub mod scheduler;
pub mod supervisor;
pub mod task_queue;
pub mod task_store;
pub mod timeout_monitor;

pub use active_runs::ActiveRuns;
pub use event_bus::EventBus;
pub use event_store_service::EventStoreService;
pub use health_tracker::{HealthTracker, HealthTrackerHandler};
pub use phase_executor::{Phase, PhaseExecutor};
pub use provider_router::ProviderRouter;
pub use restart_coordinator::RestartCoordinator;
pub use scheduler::Scheduler;
pub use supervisor::Supervisor;
pub use task_queue::TaskQueue;
pub use task_store::TaskStore;
pub use timeout_monitor::TimeoutMonitor;
