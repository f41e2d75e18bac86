//! Tool registry port (§4.9 tool_call trigger).
//!
//! Tool execution against named tools is delegated to an external
//! collaborator (§1 Non-goals); this is the seam the Scheduler calls
//! through for `tool_call` triggers.

use async_trait::async_trait;
use serde_json::Value;

/// Errors invoking a registered tool.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
}

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError>;
}

/// A `ToolRegistry` with no tools registered; every call is `UnknownTool`.
#[derive(Debug, Default)]
pub struct NullToolRegistry;

#[async_trait]
impl ToolRegistry for NullToolRegistry {
    async fn call(&self, tool: &str, _arguments: Value) -> Result<Value, ToolError> {
        Err(ToolError::UnknownTool(tool.to_string()))
    }
}
