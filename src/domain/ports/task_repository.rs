//! Task repository port (§3 Task Store ownership; §4.4 Task Store contract).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::Task;

/// Persistence interface for Task records. Implementations are single-writer
/// per the ownership rule in §3.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<(), TaskError>;
    async fn get(&self, id: Uuid) -> Result<Option<Task>, TaskError>;
    async fn update(&self, task: &Task) -> Result<(), TaskError>;
    async fn list(&self) -> Result<Vec<Task>, TaskError>;
    async fn list_active(&self) -> Result<Vec<Task>, TaskError>;
}
