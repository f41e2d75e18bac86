//! File-backed `TaskRepository`: one JSON document per task under
//! `<state_dir>/tasks/<taskId>.json` (§6 Persistent state).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::error::TaskError;
use crate::domain::models::Task;
use crate::domain::ports::task_repository::TaskRepository;
use crate::infrastructure::filesystem::atomic::{read_json, write_json_atomic};

/// Guards the directory against concurrent writers; sqlx's single-writer
/// pool has no analogue here, so a process-wide advisory lock stands in.
pub struct FileTaskRepository {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileTaskRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { dir: state_dir.into().join("tasks"), lock: Mutex::new(()) }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl TaskRepository for FileTaskRepository {
    async fn insert(&self, task: &Task) -> Result<(), TaskError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(task.id);
        if path.exists() {
            return Err(TaskError::AlreadyExists(task.id));
        }
        write_json_atomic(&path, task).await.map_err(|e| TaskError::Store(e.to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, TaskError> {
        read_json(&self.path_for(id)).await.map_err(|e| TaskError::Store(e.to_string()))
    }

    async fn update(&self, task: &Task) -> Result<(), TaskError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(task.id);
        if !path.exists() {
            return Err(TaskError::NotFound(task.id));
        }
        write_json_atomic(&path, task).await.map_err(|e| TaskError::Store(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<Task>, TaskError> {
        let _guard = self.lock.lock().await;
        let mut tasks = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
            Err(e) => return Err(TaskError::Store(e.to_string())),
        };
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| TaskError::Store(e.to_string()))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                if let Some(task) = read_json::<Task>(&entry.path())
                    .await
                    .map_err(|e| TaskError::Store(e.to_string()))?
                {
                    tasks.push(task);
                }
            }
        }
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn list_active(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.list().await?.into_iter().filter(|t| t.status.is_active()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Lane, NewTask, TaskMetadata};

    fn sample_task() -> Task {
        Task::from_new(NewTask {
            description: "do a thing".into(),
            parent_task_id: None,
            session_key: "msg:dm:1".into(),
            lane: Lane::Main,
            metadata: TaskMetadata::default(),
            max_attempts: 3,
            retry_backoff_ms: 1000,
            timeout_ms: 60_000,
        })
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTaskRepository::new(dir.path());
        let task = sample_task();
        repo.insert(&task).await.unwrap();
        let loaded = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, task.id);
        assert_eq!(loaded.description, task.description);
    }

    #[tokio::test]
    async fn insert_twice_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTaskRepository::new(dir.path());
        let task = sample_task();
        repo.insert(&task).await.unwrap();
        let err = repo.insert(&task).await.unwrap_err();
        assert!(matches!(err, TaskError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn list_active_excludes_terminal_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileTaskRepository::new(dir.path());
        let mut running = sample_task();
        running.transition(crate::domain::models::TaskStatus::Running).unwrap();
        repo.insert(&running).await.unwrap();

        let mut done = sample_task();
        done.transition(crate::domain::models::TaskStatus::Running).unwrap();
        done.transition(crate::domain::models::TaskStatus::Succeeded).unwrap();
        repo.insert(&done).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
    }
}
