//! Domain models.
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod active_run;
pub mod event;
pub mod job;
pub mod provider;
pub mod restart;
pub mod session;
pub mod task;

pub use active_run::{ActiveRun, AgentType};
pub use event::{Event, EventType, PublishContext};
pub use job::{
    Action, JobResult, JobRetryPolicy, JobRunStatus, JobsDocument, ScheduledJob, Trigger,
    JOBS_DOCUMENT_VERSION,
};
pub use provider::{
    ActionKind, CooldownReason, CooldownRecord, ProviderGroup, ProviderHandle, ProviderKind,
    ProviderStats, ProviderStatus,
};
pub use restart::{RestartIntent, TaskContext, RESTART_EXIT_CODE};
pub use session::SessionKey;
pub use task::{Lane, NewTask, RetryPolicy, Task, TaskMetadata, TaskResult, TaskStatus};
