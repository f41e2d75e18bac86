//! Event domain model (§3 Event, §6 enumerated event types).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed enumeration of event types the bus can carry (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskQueued,
    TaskStarted,
    TaskSucceeded,
    TaskFailed,
    TaskCancelled,
    TaskRetryScheduled,
    TaskTimeoutWarning,
    TaskTimeout,
    SubagentSpawned,
    JobCreated,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobEnabled,
    JobDisabled,
    JobRemoved,
    ProviderCooldown,
    ProviderRecovery,
    ErrorOccurred,
    ToolExecuted,
    AgentThinking,
    AgentResponse,
    MemoryIndexed,
    SessionStarted,
    SessionEnded,
    MainAgentStatusChanged,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskQueued => "task_queued",
            Self::TaskStarted => "task_started",
            Self::TaskSucceeded => "task_succeeded",
            Self::TaskFailed => "task_failed",
            Self::TaskCancelled => "task_cancelled",
            Self::TaskRetryScheduled => "task_retry_scheduled",
            Self::TaskTimeoutWarning => "task_timeout_warning",
            Self::TaskTimeout => "task_timeout",
            Self::SubagentSpawned => "subagent_spawned",
            Self::JobCreated => "job_created",
            Self::JobStarted => "job_started",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::JobEnabled => "job_enabled",
            Self::JobDisabled => "job_disabled",
            Self::JobRemoved => "job_removed",
            Self::ProviderCooldown => "provider_cooldown",
            Self::ProviderRecovery => "provider_recovery",
            Self::ErrorOccurred => "error_occurred",
            Self::ToolExecuted => "tool_executed",
            Self::AgentThinking => "agent_thinking",
            Self::AgentResponse => "agent_response",
            Self::MemoryIndexed => "memory_indexed",
            Self::SessionStarted => "session_started",
            Self::SessionEnded => "session_ended",
            Self::MainAgentStatusChanged => "main_agent_status_changed",
        }
    }

    pub const ALL: &'static [EventType] = &[
        Self::TaskQueued,
        Self::TaskStarted,
        Self::TaskSucceeded,
        Self::TaskFailed,
        Self::TaskCancelled,
        Self::TaskRetryScheduled,
        Self::TaskTimeoutWarning,
        Self::TaskTimeout,
        Self::SubagentSpawned,
        Self::JobCreated,
        Self::JobStarted,
        Self::JobCompleted,
        Self::JobFailed,
        Self::JobEnabled,
        Self::JobDisabled,
        Self::JobRemoved,
        Self::ProviderCooldown,
        Self::ProviderRecovery,
        Self::ErrorOccurred,
        Self::ToolExecuted,
        Self::AgentThinking,
        Self::AgentResponse,
        Self::MemoryIndexed,
        Self::SessionStarted,
        Self::SessionEnded,
        Self::MainAgentStatusChanged,
    ];
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable, published event (§3 Event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub session_key: Option<String>,
    pub channel: Option<String>,
    pub payload: Value,
}

/// Optional routing context supplied at publish time.
#[derive(Debug, Clone, Default)]
pub struct PublishContext {
    pub session_key: Option<String>,
    pub channel: Option<String>,
}
