//! Task domain model (§3 Task, §4.5 state machine).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::TaskError;

/// Status of a task in the execution pipeline (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Retrying,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled)
    }

    /// Whether this status counts as "active" for the Supervisor idle check.
    ///
    /// `Retrying` counts as active (§9 open question (a): resolved "yes").
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Retrying)
    }

    fn valid_transitions(self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Succeeded,
                Self::Failed,
                Self::Retrying,
                Self::TimedOut,
                Self::Cancelled,
            ],
            Self::Retrying => &[Self::Queued, Self::Cancelled],
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled => &[],
        }
    }

    /// Validate a transition per §4.5. Terminal states never re-transition.
    pub fn validate_transition(self, to: TaskStatus) -> Result<(), TaskError> {
        if self.valid_transitions().contains(&to) {
            Ok(())
        } else {
            Err(TaskError::InvalidStatusTransition { from: self, to })
        }
    }
}

/// Canonical lane names (§3 Lane). Lane membership is immutable for a task's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Main,
    Autonomous,
    Maintenance,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Autonomous => "autonomous",
            Self::Maintenance => "maintenance",
        }
    }

    /// Default `maxConcurrent` per §5 Resource limits.
    pub fn default_max_concurrent(self) -> u32 {
        match self {
            Self::Main => 1,
            Self::Autonomous => 5,
            Self::Maintenance => 1,
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// §5 Resource limits Task defaults: `retryBackoffMultiplier`.
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: u32 = 2;
/// §5 Resource limits Task defaults: `retryBackoffCap` (ms).
pub const DEFAULT_RETRY_BACKOFF_CAP_MS: u64 = 60_000;

/// Retry policy state carried on a task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempted: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub backoff_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub multiplier: u32,
    #[serde(default = "default_retry_backoff_cap_ms")]
    pub cap_ms: u64,
}

fn default_retry_backoff_multiplier() -> u32 {
    DEFAULT_RETRY_BACKOFF_MULTIPLIER
}

fn default_retry_backoff_cap_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_CAP_MS
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self::with_backoff_shape(
            max_attempts,
            initial_backoff_ms,
            DEFAULT_RETRY_BACKOFF_MULTIPLIER,
            DEFAULT_RETRY_BACKOFF_CAP_MS,
        )
    }

    /// Like `new`, but with an explicit multiplier/cap instead of the
    /// built-in defaults (§5 Resource limits `retryBackoffMultiplier`/
    /// `retryBackoffCap`, configurable via `TaskDefaultsConfig`).
    pub fn with_backoff_shape(max_attempts: u32, initial_backoff_ms: u64, multiplier: u32, cap_ms: u64) -> Self {
        Self { max_attempts, attempted: 0, next_retry_at: None, backoff_ms: initial_backoff_ms, multiplier, cap_ms }
    }

    pub fn exhausted(&self) -> bool {
        self.attempted >= self.max_attempts
    }

    /// Advances the policy past one failed attempt: returns the delay to
    /// wait before the next attempt and grows `backoff_ms` for the attempt
    /// after that, capped at `cap_ms` (§4.4 `enqueueWithDelay`).
    pub fn record_attempt(&mut self) -> u64 {
        let delay_ms = self.backoff_ms;
        self.attempted += 1;
        self.backoff_ms = self.backoff_ms.saturating_mul(self.multiplier as u64).min(self.cap_ms);
        delay_ms
    }
}

/// Free-form task metadata: origin channel, priority tier, tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub origin_channel: Option<String>,
    pub priority_tier: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// The outcome recorded on a finished task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: Value,
    #[serde(default)]
    pub phase_outputs: HashMap<String, Value>,
}

impl TaskResult {
    pub fn from_output(output: Value) -> Self {
        Self { output, phase_outputs: HashMap::new() }
    }
}

/// A unit of durable work (§3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub parent_task_id: Option<Uuid>,
    pub session_key: String,
    pub lane: Lane,
    pub metadata: TaskMetadata,
    pub retry: RetryPolicy,
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub result: Option<TaskResult>,
}

/// Fields a caller supplies to create a task; the store fills in defaults.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub description: String,
    pub parent_task_id: Option<Uuid>,
    pub session_key: String,
    pub lane: Lane,
    pub metadata: TaskMetadata,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Task {
    pub fn from_new(new: NewTask) -> Self {
        Self::from_new_with_backoff_shape(new, DEFAULT_RETRY_BACKOFF_MULTIPLIER, DEFAULT_RETRY_BACKOFF_CAP_MS)
    }

    /// Like `from_new`, but sources the retry backoff multiplier/cap from
    /// `TaskDefaultsConfig` instead of the built-in defaults.
    pub fn from_new_with_backoff_shape(new: NewTask, retry_backoff_multiplier: u32, retry_backoff_cap_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: new.description,
            parent_task_id: new.parent_task_id,
            session_key: new.session_key,
            lane: new.lane,
            metadata: new.metadata,
            retry: RetryPolicy::with_backoff_shape(
                new.max_attempts,
                new.retry_backoff_ms,
                retry_backoff_multiplier,
                retry_backoff_cap_ms,
            ),
            timeout_ms: new.timeout_ms,
            created_at: now,
            started_at: None,
            ended_at: None,
            status: TaskStatus::Queued,
            last_error: None,
            result: None,
        }
    }

    /// Enforce §3 invariant: `endedAt >= startedAt >= createdAt` when set.
    pub fn timestamps_consistent(&self) -> bool {
        if let Some(started) = self.started_at {
            if started < self.created_at {
                return false;
            }
            if let Some(ended) = self.ended_at {
                if ended < started {
                    return false;
                }
            }
        }
        true
    }

    pub fn transition(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        self.status.validate_transition(to)?;
        self.status = to;
        if to == TaskStatus::Running {
            self.started_at.get_or_insert_with(Utc::now);
        }
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task::from_new(NewTask {
            description: "do the thing".into(),
            parent_task_id: None,
            session_key: "agent:sys:system".into(),
            lane: Lane::Main,
            metadata: TaskMetadata::default(),
            max_attempts: 3,
            retry_backoff_ms: 1000,
            timeout_ms: 120_000,
        })
    }

    #[test]
    fn queued_to_running_to_succeeded() {
        let mut t = sample();
        t.transition(TaskStatus::Running).unwrap();
        t.transition(TaskStatus::Succeeded).unwrap();
        assert_eq!(t.status, TaskStatus::Succeeded);
        assert!(t.ended_at.is_some());
    }

    #[test]
    fn terminal_never_re_transitions() {
        let mut t = sample();
        t.transition(TaskStatus::Running).unwrap();
        t.transition(TaskStatus::Succeeded).unwrap();
        let err = t.transition(TaskStatus::Running).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn retrying_counts_as_active() {
        assert!(TaskStatus::Retrying.is_active());
    }

    #[test]
    fn lane_default_concurrency() {
        assert_eq!(Lane::Main.default_max_concurrent(), 1);
        assert_eq!(Lane::Autonomous.default_max_concurrent(), 5);
        assert_eq!(Lane::Maintenance.default_max_concurrent(), 1);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn record_attempt_backoff_never_exceeds_cap(
            initial_backoff_ms in 1u64..10_000,
            multiplier in 1u32..8,
            cap_ms in 10u64..100_000,
            attempts in 0usize..30,
        ) {
            let mut policy = RetryPolicy::with_backoff_shape(u32::MAX, initial_backoff_ms, multiplier, cap_ms);
            for _ in 0..attempts {
                policy.record_attempt();
                prop_assert!(policy.backoff_ms <= cap_ms);
            }
        }

        #[test]
        fn record_attempt_increments_attempted_by_exactly_one(
            initial_backoff_ms in 1u64..10_000,
            multiplier in 1u32..8,
            cap_ms in 10u64..100_000,
        ) {
            let mut policy = RetryPolicy::with_backoff_shape(5, initial_backoff_ms, multiplier, cap_ms);
            let before = policy.attempted;
            policy.record_attempt();
            prop_assert_eq!(policy.attempted, before + 1);
        }
    }
}
