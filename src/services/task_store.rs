//! Task Store (§4.4 Task Store, C5).
//!
//! Wraps a `TaskRepository` with a read-through cache (default TTL 45 s,
//! invalidated on every write) and per-id advisory locks so concurrent
//! read-modify-write sequences on the same task serialize.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::{Task, TaskResult, TaskStatus};
use crate::domain::ports::task_repository::TaskRepository;

pub const DEFAULT_CACHE_TTL_MS: u64 = 45_000;

struct CacheEntry {
    task: Task,
    cached_at: Instant,
}

struct Cache {
    entries: HashMap<Uuid, CacheEntry>,
    list_cached_at: Option<Instant>,
    list: Vec<Uuid>,
}

pub struct TaskStore {
    repo: Arc<dyn TaskRepository>,
    cache: RwLock<Cache>,
    ttl: Duration,
    id_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TaskStore {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self::with_ttl(repo, Duration::from_millis(DEFAULT_CACHE_TTL_MS))
    }

    pub fn with_ttl(repo: Arc<dyn TaskRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: RwLock::new(Cache { entries: HashMap::new(), list_cached_at: None, list: Vec::new() }),
            ttl,
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn create(&self, task: Task) -> Result<Task, TaskError> {
        self.repo.insert(&task).await?;
        self.invalidate(task.id).await;
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Task>, TaskError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.entries.get(&id) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(Some(entry.task.clone()));
                }
            }
        }
        let task = self.repo.get(id).await?;
        if let Some(ref task) = task {
            let mut cache = self.cache.write().await;
            cache.entries.insert(id, CacheEntry { task: task.clone(), cached_at: Instant::now() });
        }
        Ok(task)
    }

    pub async fn list(&self) -> Result<Vec<Task>, TaskError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached_at) = cache.list_cached_at {
                if cached_at.elapsed() < self.ttl {
                    let mut tasks = Vec::with_capacity(cache.list.len());
                    for id in &cache.list {
                        if let Some(entry) = cache.entries.get(id) {
                            tasks.push(entry.task.clone());
                        }
                    }
                    return Ok(tasks);
                }
            }
        }
        let tasks = self.repo.list().await?;
        let mut cache = self.cache.write().await;
        cache.list = tasks.iter().map(|t| t.id).collect();
        cache.list_cached_at = Some(Instant::now());
        for task in &tasks {
            cache.entries.insert(task.id, CacheEntry { task: task.clone(), cached_at: Instant::now() });
        }
        Ok(tasks)
    }

    pub async fn get_active_tasks(&self) -> Result<Vec<Task>, TaskError> {
        self.repo.list_active().await
    }

    /// Read-modify-write under the per-id lock; rejects invalid transitions (§4.5).
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<Task, TaskError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = self.repo.get(id).await?.ok_or(TaskError::NotFound(id))?;
        task.transition(status)?;
        if let Some(error) = error {
            task.last_error = Some(error);
        }
        self.repo.update(&task).await?;
        self.invalidate(id).await;
        Ok(task)
    }

    /// Transitions a failed task into `retrying`, records the attempt, and
    /// returns the updated task together with the delay the caller should
    /// wait before re-enqueuing it (§4.4 `enqueueWithDelay`).
    pub async fn record_retry(&self, id: Uuid, error: String) -> Result<(Task, u64), TaskError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = self.repo.get(id).await?.ok_or(TaskError::NotFound(id))?;
        task.transition(TaskStatus::Retrying)?;
        task.last_error = Some(error);
        let delay_ms = task.retry.record_attempt();
        task.retry.next_retry_at = Some(chrono::Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
        self.repo.update(&task).await?;
        self.invalidate(id).await;
        Ok((task, delay_ms))
    }

    /// Records a successful run. The attempt still counts against
    /// `attempted` — a task that succeeds on its third try reports
    /// `attempted == 3`, matching the failure-path accounting below.
    pub async fn record_success(&self, id: Uuid) -> Result<Task, TaskError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = self.repo.get(id).await?.ok_or(TaskError::NotFound(id))?;
        task.retry.attempted += 1;
        task.transition(TaskStatus::Succeeded)?;
        self.repo.update(&task).await?;
        self.invalidate(id).await;
        Ok(task)
    }

    /// Records the final, exhausted-retries failure: the attempt still
    /// counts (so `attempted == maxAttempts` on a task that failed every
    /// time), but there's no more backoff to apply.
    pub async fn record_failure(&self, id: Uuid, error: String) -> Result<Task, TaskError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = self.repo.get(id).await?.ok_or(TaskError::NotFound(id))?;
        task.retry.attempted += 1;
        task.transition(TaskStatus::Failed)?;
        task.last_error = Some(error);
        self.repo.update(&task).await?;
        self.invalidate(id).await;
        Ok(task)
    }

    pub async fn set_result(&self, id: Uuid, result: TaskResult) -> Result<Task, TaskError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = self.repo.get(id).await?.ok_or(TaskError::NotFound(id))?;
        task.result = Some(result);
        self.repo.update(&task).await?;
        self.invalidate(id).await;
        Ok(task)
    }

    async fn invalidate(&self, id: Uuid) {
        let mut cache = self.cache.write().await;
        cache.entries.remove(&id);
        cache.list_cached_at = None;
    }
}
