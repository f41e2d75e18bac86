//! Phase Executor (§4.7 Phase Executor, C8).
//!
//! Runs an ordered list of named phases against a task. Phases are
//! reentrant only between whole executions — never mid-run — and execution
//! is intentionally sequential (§4.7, §9 design notes).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::error::ProviderError;
use crate::domain::models::{ActionKind, EventType, PublishContext, Task, TaskResult};
use crate::domain::ports::backend::{BackendRegistry, BackendRequest};
use crate::services::event_bus::EventBus;
use crate::services::provider_router::ProviderRouter;

/// Builds the prompt for a phase from the task and the state accumulated so far.
pub type PromptBuilder = Arc<dyn Fn(&Task, &HashMap<String, Value>) -> String + Send + Sync>;

/// Interprets a backend response and mutates the shared state bag. A
/// returned `Err` fails the whole task (§4.7 step 2).
pub type Extractor =
    Arc<dyn Fn(&str, &mut HashMap<String, Value>) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct Phase {
    pub name: String,
    pub prompt_builder: PromptBuilder,
    pub extractor: Extractor,
}

pub struct PhaseExecutor {
    router: Arc<ProviderRouter>,
    backends: Arc<dyn BackendRegistry>,
    bus: Arc<EventBus>,
}

impl PhaseExecutor {
    pub fn new(router: Arc<ProviderRouter>, backends: Arc<dyn BackendRegistry>, bus: Arc<EventBus>) -> Self {
        Self { router, backends, bus }
    }

    pub async fn run(&self, task: &Task, phases: &[Phase]) -> Result<TaskResult, String> {
        let mut state: HashMap<String, Value> = HashMap::new();
        let mut phase_outputs: HashMap<String, Value> = HashMap::new();

        for phase in phases {
            let prompt = (phase.prompt_builder)(task, &state);

            let provider = self
                .router
                .resolve(ActionKind::Subagent)
                .await
                .map_err(|e| format!("phase '{}': {e}", phase.name))?;

            let backend = self
                .backends
                .get(&provider.id)
                .ok_or_else(|| format!("phase '{}': no backend wired for provider '{}'", phase.name, provider.id))?;

            let response = backend
                .complete(BackendRequest { action: ActionKind::Subagent, model: provider.model.clone(), prompt })
                .await
                .map_err(|e: ProviderError| format!("phase '{}': {e}", phase.name))?;

            self.bus
                .publish(
                    EventType::AgentResponse,
                    serde_json::json!({
                        "provider_id": provider.id,
                        "phase": phase.name,
                        "response_time_ms": response.response_time_ms,
                    }),
                    PublishContext { session_key: Some(task.session_key.clone()), channel: None },
                )
                .await;

            (phase.extractor)(&response.text, &mut state).map_err(|e| {
                format!("phase '{}' extraction failed: {e}", phase.name)
            })?;

            phase_outputs.insert(phase.name.clone(), Value::Object(
                state.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ));
        }

        Ok(TaskResult { output: Value::Object(state.into_iter().collect()), phase_outputs })
    }
}
