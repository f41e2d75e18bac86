//! Restart intent domain model (§3 Restart Intent, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialized task context handed to the respawned process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: uuid::Uuid,
    pub phase: Option<String>,
    pub state: Value,
}

/// The on-disk restart intent document (absence of the file means no pending intent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestartIntent {
    pub requested: bool,
    pub requested_at: DateTime<Utc>,
    pub reason: String,
    pub message: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub task_context: Option<TaskContext>,
}

/// The process/parent contract exit code (§4.10, §6).
pub const RESTART_EXIT_CODE: i32 = 42;
