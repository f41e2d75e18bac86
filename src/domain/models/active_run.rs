//! Active run handle domain model (§3 Active Run Handle, §4.11).

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Whether a run drives the foreground agent or a spawned subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentType {
    Agent,
    Subagent,
}

/// An in-memory handle for a currently-executing run (never persisted).
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: Uuid,
    pub session_key: String,
    pub agent_type: AgentType,
    pub started_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}
