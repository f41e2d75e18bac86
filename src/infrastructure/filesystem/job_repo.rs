//! File-backed `JobRepository`: a single `<state_dir>/jobs.json` document
//! (§3 Scheduled Job, §6 Persistent state).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::error::SchedulerError;
use crate::domain::models::JobsDocument;
use crate::domain::ports::job_repository::JobRepository;
use crate::infrastructure::filesystem::atomic::{read_json, write_json_atomic};

pub struct FileJobRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileJobRepository {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join("jobs.json"), lock: Mutex::new(()) }
    }
}

#[async_trait]
impl JobRepository for FileJobRepository {
    async fn load(&self) -> Result<JobsDocument, SchedulerError> {
        let _guard = self.lock.lock().await;
        read_json(&self.path)
            .await
            .map_err(|e| SchedulerError::Persistence(e.to_string()))
            .map(|doc| doc.unwrap_or_default())
    }

    async fn save(&self, doc: &JobsDocument) -> Result<(), SchedulerError> {
        let _guard = self.lock.lock().await;
        write_json_atomic(&self.path, doc)
            .await
            .map_err(|e| SchedulerError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ScheduledJob, Trigger};

    #[tokio::test]
    async fn missing_document_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileJobRepository::new(dir.path());
        let doc = repo.load().await.unwrap();
        assert!(doc.jobs.is_empty());
        assert_eq!(doc.version, crate::domain::models::JOBS_DOCUMENT_VERSION);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileJobRepository::new(dir.path());
        let job = ScheduledJob::new(
            "nightly-digest",
            "0 0 * * *",
            Trigger::AgentAsk { prompt: "summarize today".into() },
        );
        let mut doc = JobsDocument::default();
        doc.jobs.push(job.clone());
        repo.save(&doc).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].id, job.id);
    }
}
