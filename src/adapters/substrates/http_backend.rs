//! HTTP backend connection for OpenAI-compatible and Ollama chat endpoints
//! (§1 Non-goals — the concrete backend wiring, grounded on the source
//! project's HTTP client: connection reuse, typed request/response bodies,
//! and transient/permanent error classification instead of string matching).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::error::ProviderError;
use crate::domain::ports::backend::{BackendRequest, BackendResponse, LlmBackend};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

/// Talks to a single OpenAI-compatible (or Ollama) chat-completions endpoint.
pub struct OpenAiCompatibleBackend {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS)).build()?;
        Ok(Self { http_client, base_url: base_url.into(), api_key })
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, request: BackendRequest) -> Result<BackendResponse, ProviderError> {
        let started = std::time::Instant::now();
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self.http_client.post(&url).json(&ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage { role: "user", content: &request.prompt }],
        });
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthFailed(format!("backend returned {status}")));
        }
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(ProviderError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(ProviderError::RequestFailed(format!("backend returned {status}")));
        }

        let body: ChatCompletion =
            response.json().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::RequestFailed("empty choices array".into()))?;

        Ok(BackendResponse { text, response_time_ms: started.elapsed().as_millis() as u64 })
    }
}
