//! Scheduled job domain model (§3 Scheduled Job, §6 cron semantics).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The producer step of a job: generates the value consumed by its actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    AgentAsk { prompt: String },
    ToolCall { tool: String, arguments: Value },
    Webhook {
        url: String,
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<Value>,
    },
}

/// A consumer step a job performs after its trigger succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    MemoryUpdate { namespace: String, key: String, value: Value },
    SendMessage { channel: String, body: String },
    LogEvent { message: String, #[serde(default)] data: Value },
}

/// Retry policy for a job's execution (distinct from a task's retry policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRetryPolicy {
    pub on_failure: bool,
    pub max_retries: u32,
    pub per_attempt_timeout_ms: u64,
}

impl Default for JobRetryPolicy {
    fn default() -> Self {
        Self { on_failure: true, max_retries: 3, per_attempt_timeout_ms: 300_000 }
    }
}

/// Status of the most recent job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Succeeded,
    Failed,
}

/// Outcome of the most recent run of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobRunStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub output: Option<Value>,
    pub retry_count: u32,
}

/// A persisted cron-driven job (§3 Scheduled Job).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub cron: String,
    pub trigger: Trigger,
    pub actions: Vec<Action>,
    pub retry: JobRetryPolicy,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_result: Option<JobResult>,
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, cron: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            cron: cron.into(),
            trigger,
            actions: Vec::new(),
            retry: JobRetryPolicy::default(),
            last_run_at: None,
            last_result: None,
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// Versioned persisted document: `{version: 1, jobs: [...]}` (§3, §6 jobs.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsDocument {
    pub version: u32,
    pub jobs: Vec<ScheduledJob>,
}

pub const JOBS_DOCUMENT_VERSION: u32 = 1;

impl Default for JobsDocument {
    fn default() -> Self {
        Self { version: JOBS_DOCUMENT_VERSION, jobs: Vec::new() }
    }
}
