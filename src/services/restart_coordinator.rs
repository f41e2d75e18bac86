//! Restart Coordinator (§4.10 Restart Coordinator, C11).
//!
//! Owns the on-disk restart intent. A restart request runs every registered
//! shutdown handler, persists the intent atomically, then schedules process
//! exit on code 42 after a short delay so the parent supervisor has time to
//! observe the write before the process disappears.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::error::RestartError;
use crate::domain::models::{RestartIntent, TaskContext, RESTART_EXIT_CODE};
use crate::infrastructure::filesystem::FileRestartStore;

/// Minimum delay between persisting the intent and calling `std::process::exit`.
pub const MIN_EXIT_DELAY_MS: u64 = 100;

/// A handler invoked, in registration order, before the process exits for a
/// restart. Receives the restart reason (§4.10 `onShutdown`).
pub type ShutdownHandler =
    Arc<dyn Fn(String) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

pub struct RestartRequest {
    pub reason: String,
    pub message: Option<String>,
    pub metadata: Option<Value>,
}

pub struct RestartCoordinator {
    store: Arc<FileRestartStore>,
    handlers: Mutex<Vec<ShutdownHandler>>,
    exit_delay_ms: u64,
}

impl RestartCoordinator {
    pub fn new(store: Arc<FileRestartStore>) -> Self {
        Self { store, handlers: Mutex::new(Vec::new()), exit_delay_ms: MIN_EXIT_DELAY_MS }
    }

    /// Loads any pending intent left by a previous process incarnation and
    /// deletes the file so a second call never replays it (§4.10). The
    /// returned intent's `taskContext`, if set, is the interrupted task the
    /// caller should resume.
    pub async fn initialize(&self) -> Result<Option<RestartIntent>, RestartError> {
        let intent = self.store.load().await?;
        if intent.is_some() {
            self.store.clear().await?;
        }
        Ok(intent)
    }

    pub async fn on_shutdown(&self, handler: ShutdownHandler) {
        self.handlers.lock().await.push(handler);
    }

    /// Runs every shutdown handler, persists the restart intent, then exits
    /// the process with code 42 after `exit_delay_ms` (§4.10, §6).
    pub async fn request_restart(&self, request: RestartRequest) -> Result<(), RestartError> {
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(request.reason.clone()).await;
        }
        drop(handlers);

        let intent = RestartIntent {
            requested: true,
            requested_at: Utc::now(),
            reason: request.reason,
            message: request.message,
            target: None,
            metadata: request.metadata.unwrap_or(Value::Null),
            task_context: None,
        };
        self.store.save(&intent).await?;

        // Inlined rather than spawned: a detached task can outlive the
        // #[tokio::main] runtime tearing down, which would let the process
        // exit 0 before this delay elapses (the caller must observe code 42).
        tokio::time::sleep(Duration::from_millis(self.exit_delay_ms)).await;
        std::process::exit(RESTART_EXIT_CODE);
    }

    /// Attaches in-flight task state to a pending intent so the respawned
    /// process can resume it (§4.10).
    pub async fn save_task_context(&self, context: TaskContext) -> Result<(), RestartError> {
        let mut intent = self.store.load().await?.ok_or_else(|| {
            RestartError::Corrupt("cannot attach task context with no pending restart intent".into())
        })?;
        intent.task_context = Some(context);
        self.store.save(&intent).await
    }

    pub async fn clear_task_context(&self) -> Result<(), RestartError> {
        if let Some(mut intent) = self.store.load().await? {
            intent.task_context = None;
            self.store.save(&intent).await?;
        }
        Ok(())
    }

    /// Clears a pending restart intent without exiting (§4.10).
    pub async fn cancel_restart(&self) -> Result<(), RestartError> {
        self.store.clear().await
    }
}
