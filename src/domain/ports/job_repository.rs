//! Scheduled job repository port (§3 Scheduled Job; §4.9 Scheduler persistence).

use async_trait::async_trait;

use crate::domain::error::SchedulerError;
use crate::domain::models::JobsDocument;

/// Persistence interface for the jobs document. Writes must be atomic
/// (write-temp-then-rename, §3/§5).
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn load(&self) -> Result<JobsDocument, SchedulerError>;
    async fn save(&self, doc: &JobsDocument) -> Result<(), SchedulerError>;
}
