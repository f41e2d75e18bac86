//! Domain error types for the autonomous execution core.
//!
//! Each error enum represents a single failure domain rather than one
//! crate-wide error type, so callers can dispatch on the taxonomy (see the
//! design notes on transient vs. permanent failures) without matching on
//! string messages.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::task::TaskStatus;

/// Errors related to task lifecycle and store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("task already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: TaskStatus, to: TaskStatus },

    #[error("task {0} has exceeded its maximum retry attempts")]
    MaxRetriesExceeded(Uuid),

    #[error("lane '{0}' is unknown")]
    UnknownLane(String),

    #[error("store error: {0}")]
    Store(String),
}

impl TaskError {
    /// Contract violations (terminal-state re-transition) are internal errors.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::InvalidStatusTransition { .. })
    }
}

/// Errors surfaced while waiting on a task or run to complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out waiting for completion")]
    Timeout,
}

/// Errors related to scheduled-job definitions and execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("unknown trigger kind: {0}")]
    UnknownTrigger(String),

    #[error("unknown action kind: {0}")]
    UnknownAction(String),

    #[error("jobs document has unsupported version {0}")]
    UnsupportedVersion(u32),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Errors related to provider selection and health tracking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no healthy provider available for action {0}")]
    NoHealthyProvider(String),

    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("provider '{0}' cannot serve action '{1}'")]
    UnsupportedAction(String, String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl ProviderError {
    /// Transient failures increment error rate but don't force cooldown.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::RequestFailed(_))
    }

    /// Permanent failures trigger a provider cooldown (see §7 cooldown policy).
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::AuthFailed(_) | Self::QuotaExceeded)
    }
}

/// Errors from the durable event store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("append failed: {0}")]
    Append(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors from configuration loading and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("I/O error reading config: {0}")]
    Io(String),
}

/// Errors from the restart coordinator's on-disk intent file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestartError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupt restart intent: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_display() {
        let id = Uuid::nil();
        assert_eq!(TaskError::NotFound(id).to_string(), format!("task not found: {id}"));
    }

    #[test]
    fn invalid_transition_is_internal() {
        let e = TaskError::InvalidStatusTransition {
            from: TaskStatus::Succeeded,
            to: TaskStatus::Running,
        };
        assert!(e.is_internal());
        assert!(!TaskError::MaxRetriesExceeded(Uuid::nil()).is_internal());
    }

    #[test]
    fn provider_error_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(!ProviderError::RateLimited.is_permanent());
        assert!(ProviderError::AuthFailed("bad key".into()).is_permanent());
        assert!(ProviderError::QuotaExceeded.is_permanent());
    }
}
