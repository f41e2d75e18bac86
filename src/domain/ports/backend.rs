//! LLM backend port.
//!
//! The concrete LLM backends are explicitly out of scope (§1 Non-goals):
//! this trait is the seam the Provider Router (§4.3) and Phase Executor
//! (§4.7) call through, implemented by an external collaborator.

use async_trait::async_trait;

use crate::domain::error::ProviderError;
use crate::domain::models::ActionKind;

/// A single request to a resolved provider.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub action: ActionKind,
    pub model: String,
    pub prompt: String,
}

/// The backend's response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub text: String,
    pub response_time_ms: u64,
}

/// A callable LLM backend connection.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: BackendRequest) -> Result<BackendResponse, ProviderError>;
}

/// Resolves a provider id to the backend connection that actually talks to
/// it. Concrete wiring (HTTP clients, CLI subprocess pools, ...) lives with
/// the external collaborator; the core only needs this lookup seam.
pub trait BackendRegistry: Send + Sync {
    fn get(&self, provider_id: &str) -> Option<std::sync::Arc<dyn LlmBackend>>;
}
