//! Timeout Monitor (§4.6 Timeout Monitor, C7).
//!
//! A periodic sweeper over running tasks. It never mutates task state
//! itself — `on_warning`/`on_timeout` callbacks own that.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::Task;
use crate::services::task_store::TaskStore;

pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
/// Warning fires this many ms before the hard timeout.
pub const DEFAULT_WARNING_THRESHOLD_MS: i64 = 10_000;

pub type WarningCallback = Arc<dyn Fn(Task, i64) + Send + Sync>;
pub type TimeoutCallback = Arc<dyn Fn(Task) + Send + Sync>;

pub struct TimeoutMonitor {
    store: Arc<TaskStore>,
    warned: Mutex<HashSet<Uuid>>,
    timed_out: Mutex<HashSet<Uuid>>,
    warning_threshold_ms: i64,
    on_warning: WarningCallback,
    on_timeout: TimeoutCallback,
}

impl TimeoutMonitor {
    pub fn new(store: Arc<TaskStore>, on_warning: WarningCallback, on_timeout: TimeoutCallback) -> Self {
        Self {
            store,
            warned: Mutex::new(HashSet::new()),
            timed_out: Mutex::new(HashSet::new()),
            warning_threshold_ms: DEFAULT_WARNING_THRESHOLD_MS,
            on_warning,
            on_timeout,
        }
    }

    /// One sweep pass over active tasks; exposed standalone for tests.
    pub async fn sweep_once(&self) -> anyhow::Result<()> {
        let active = self.store.get_active_tasks().await?;
        let now = Utc::now();
        for task in active {
            let Some(started_at) = task.started_at else { continue };
            let elapsed_ms = (now - started_at).num_milliseconds();
            let timeout_ms = task.timeout_ms as i64;

            let mut timed_out = self.timed_out.lock().await;
            if timed_out.contains(&task.id) {
                continue;
            }
            if elapsed_ms >= timeout_ms {
                timed_out.insert(task.id);
                drop(timed_out);
                (self.on_timeout)(task);
                continue;
            }
            drop(timed_out);

            if elapsed_ms >= timeout_ms - self.warning_threshold_ms {
                let mut warned = self.warned.lock().await;
                if warned.insert(task.id) {
                    drop(warned);
                    (self.on_warning)(task, timeout_ms - elapsed_ms);
                }
            }
        }
        Ok(())
    }

    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::warn!(error = %err, "timeout sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Lane, NewTask, TaskMetadata, TaskStatus};
    use crate::infrastructure::filesystem::task_repo::FileTaskRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn make_store() -> Arc<TaskStore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(TaskStore::new(Arc::new(FileTaskRepository::new(dir.path().to_path_buf()))))
    }

    #[tokio::test]
    async fn fires_timeout_exactly_once_past_deadline() {
        let store = make_store().await;
        let task = store
            .create(Task::from_new(NewTask {
                description: "d".into(),
                parent_task_id: None,
                session_key: "msg:dm:1".into(),
                lane: Lane::Main,
                metadata: TaskMetadata::default(),
                max_attempts: 1,
                retry_backoff_ms: 10,
                timeout_ms: 1,
            }))
            .await
            .unwrap();
        store.update_status(task.id, TaskStatus::Running, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let timeout_count = Arc::new(AtomicUsize::new(0));
        let counted = timeout_count.clone();
        let monitor = TimeoutMonitor::new(
            store,
            Arc::new(|_task, _ms_left| {}),
            Arc::new(move |_task| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        );
        monitor.sweep_once().await.unwrap();
        monitor.sweep_once().await.unwrap();
        assert_eq!(timeout_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fires_warning_before_hard_timeout() {
        let store = make_store().await;
        let task = store
            .create(Task::from_new(NewTask {
                description: "d".into(),
                parent_task_id: None,
                session_key: "msg:dm:1".into(),
                lane: Lane::Main,
                metadata: TaskMetadata::default(),
                max_attempts: 1,
                retry_backoff_ms: 10,
                timeout_ms: 20_000,
            }))
            .await
            .unwrap();
        store.update_status(task.id, TaskStatus::Running, None).await.unwrap();

        let warning_count = Arc::new(AtomicUsize::new(0));
        let counted = warning_count.clone();
        let monitor = TimeoutMonitor::new(
            store,
            Arc::new(move |_task, _ms_left| {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(|_task| {}),
        );
        // warning threshold is 10s; an elapsed time near-zero won't trigger it.
        monitor.sweep_once().await.unwrap();
        assert_eq!(warning_count.load(Ordering::SeqCst), 0);
    }
}
