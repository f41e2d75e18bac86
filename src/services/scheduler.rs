//! Scheduler (§4.9 Scheduler, C10): cron-driven job runtime with
//! persistent jobs, retry-with-full-jitter backoff, and typed
//! trigger/action execution.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use rand::Rng;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::error::SchedulerError;
use crate::domain::models::{
    Action, ActionKind, EventType, JobResult, JobRunStatus, JobsDocument, PublishContext,
    ScheduledJob, Trigger,
};
use crate::domain::ports::backend::{BackendRegistry, BackendRequest};
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::ports::memory_store::MemoryStore;
use crate::domain::ports::notifier::Notifier;
use crate::domain::ports::tool_registry::ToolRegistry;
use crate::infrastructure::config::SchedulerSettings;
use crate::services::event_bus::EventBus;
use crate::services::provider_router::ProviderRouter;

/// Poll interval for due-job checks (§4.9). Cron expressions are
/// minute-granular at best (a 6-field expression adds seconds), so a
/// one-second poll never misses a fire.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Timeout on the shared webhook HTTP client, independent of any single
/// job's `per_attempt_timeout_ms` (§4.9 webhook trigger).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// Validates cron field count (5 or 6) and normalizes to the seconds-first
/// form the `cron` crate expects (§4.9 cron semantics).
pub fn normalize_cron(expr: &str) -> Result<String, SchedulerError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {expr}")),
        6 => Ok(expr.to_string()),
        n => Err(SchedulerError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 or 6 fields, got {n}"),
        }),
    }
}

pub fn parse_cron(expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_cron(expr)?;
    Schedule::from_str(&normalized)
        .map_err(|e| SchedulerError::InvalidCron { expr: expr.to_string(), reason: e.to_string() })
}

/// Collaborators the Scheduler calls through to execute triggers/actions (§4.9).
pub struct SchedulerDeps {
    pub router: Arc<ProviderRouter>,
    pub backends: Arc<dyn BackendRegistry>,
    pub tools: Arc<dyn ToolRegistry>,
    pub memory: Arc<dyn MemoryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub http: reqwest::Client,
}

pub struct Scheduler {
    repo: Arc<dyn JobRepository>,
    bus: Arc<EventBus>,
    deps: SchedulerDeps,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        bus: Arc<EventBus>,
        deps: SchedulerDeps,
        settings: SchedulerSettings,
    ) -> Self {
        Self { repo, bus, deps, settings }
    }

    /// Builds a job carrying the scheduler's configured retry defaults
    /// (`settings.retry_on_failure`/`max_retries`) rather than
    /// `JobRetryPolicy`'s built-in defaults (§4.9, §6 `retryOnFailure`/`maxRetries`).
    pub fn new_job(&self, name: impl Into<String>, cron: impl Into<String>, trigger: Trigger) -> ScheduledJob {
        let mut job = ScheduledJob::new(name, cron, trigger);
        job.retry.on_failure = self.settings.retry_on_failure;
        job.retry.max_retries = self.settings.max_retries;
        job
    }

    pub async fn add(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        parse_cron(&job.cron)?;
        let mut doc = self.repo.load().await?;
        doc.jobs.push(job.clone());
        self.repo.save(&doc).await?;
        self.bus
            .publish(EventType::JobCreated, serde_json::json!({"job_id": job.id, "name": job.name}), PublishContext::default())
            .await;
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), SchedulerError> {
        let mut doc = self.repo.load().await?;
        let before = doc.jobs.len();
        doc.jobs.retain(|j| j.id != id);
        if doc.jobs.len() == before {
            return Err(SchedulerError::JobNotFound(id));
        }
        self.repo.save(&doc).await?;
        self.bus.publish(EventType::JobRemoved, serde_json::json!({"job_id": id}), PublishContext::default()).await;
        Ok(())
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), SchedulerError> {
        let mut doc = self.repo.load().await?;
        let job = doc.jobs.iter_mut().find(|j| j.id == id).ok_or(SchedulerError::JobNotFound(id))?;
        job.enabled = enabled;
        self.repo.save(&doc).await?;
        let event_type = if enabled { EventType::JobEnabled } else { EventType::JobDisabled };
        self.bus.publish(event_type, serde_json::json!({"job_id": id}), PublishContext::default()).await;
        Ok(())
    }

    pub async fn load_document(&self) -> Result<JobsDocument, SchedulerError> {
        self.repo.load().await
    }

    /// Runs `job` immediately, bypassing its schedule (§4.9 `runNow`).
    pub async fn run_now(&self, id: Uuid) -> Result<JobResult, SchedulerError> {
        let mut doc = self.repo.load().await?;
        let job = doc.jobs.iter().find(|j| j.id == id).cloned().ok_or(SchedulerError::JobNotFound(id))?;
        let result = self.execute(&job).await;
        if let Some(slot) = doc.jobs.iter_mut().find(|j| j.id == id) {
            slot.last_run_at = Some(Utc::now());
            slot.last_result = Some(result.clone());
        }
        self.repo.save(&doc).await?;
        Ok(result)
    }

    /// Executes one job run: trigger, then actions in order, with retry on
    /// failure using full-jitter exponential backoff (§4.9, §7).
    async fn execute(&self, job: &ScheduledJob) -> JobResult {
        let started_at = Utc::now();
        self.bus
            .publish(EventType::JobStarted, serde_json::json!({"job_id": job.id, "name": job.name}), PublishContext::default())
            .await;

        let max_attempts = if job.retry.on_failure { job.retry.max_retries + 1 } else { 1 };
        let mut last_error: Option<String> = None;
        let mut retry_count = 0u32;
        let mut trigger_output: Option<serde_json::Value> = None;

        for attempt in 0..max_attempts {
            let attempt_result =
                match tokio::time::timeout(Duration::from_millis(job.retry.per_attempt_timeout_ms), self.run_trigger(&job.trigger)).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("trigger timed out after {}ms", job.retry.per_attempt_timeout_ms)),
                };
            match attempt_result {
                Ok(output) => {
                    trigger_output = Some(output);
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    retry_count = attempt;
                    if attempt + 1 < max_attempts {
                        let backoff = full_jitter_backoff_ms(
                            attempt,
                            self.settings.retry_base_backoff_ms,
                            self.settings.max_retry_backoff_ms,
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        let result = match trigger_output {
            None => JobResult {
                status: JobRunStatus::Failed,
                completed_at: Utc::now(),
                duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
                error: last_error,
                output: None,
                retry_count,
            },
            Some(output) => {
                // Actions run strictly in sequence; a failing action records
                // its error but does not unwind earlier ones (§4.9).
                let mut action_error = None;
                for action in &job.actions {
                    if let Err(e) = self.run_action(action).await {
                        action_error = Some(e);
                    }
                }
                JobResult {
                    status: if action_error.is_some() { JobRunStatus::Failed } else { JobRunStatus::Succeeded },
                    completed_at: Utc::now(),
                    duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
                    error: action_error,
                    output: Some(output),
                    retry_count,
                }
            }
        };

        let event_type = if result.status == JobRunStatus::Succeeded { EventType::JobCompleted } else { EventType::JobFailed };
        self.bus
            .publish(
                event_type,
                serde_json::json!({"job_id": job.id, "name": job.name, "retry_count": result.retry_count}),
                PublishContext::default(),
            )
            .await;

        result
    }

    async fn run_trigger(&self, trigger: &Trigger) -> Result<serde_json::Value, String> {
        match trigger {
            Trigger::AgentAsk { prompt } => {
                let provider = self.deps.router.resolve(ActionKind::Chat).await.map_err(|e| e.to_string())?;
                let backend = self
                    .deps
                    .backends
                    .get(&provider.id)
                    .ok_or_else(|| format!("no backend wired for provider '{}'", provider.id))?;
                let response = backend
                    .complete(BackendRequest { action: ActionKind::Chat, model: provider.model.clone(), prompt: prompt.clone() })
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({"text": response.text}))
            }
            Trigger::ToolCall { tool, arguments } => {
                self.deps.tools.call(tool, arguments.clone()).await.map_err(|e| e.to_string())
            }
            Trigger::Webhook { url, method, headers, body } => {
                let mut request = self.deps.http.request(
                    reqwest::Method::from_bytes(method.as_bytes()).map_err(|e| e.to_string())?,
                    url,
                );
                for (key, value) in headers {
                    request = request.header(key, value);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request.send().await.map_err(|e| e.to_string())?;
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(format!("webhook returned {status}"));
                }
                Ok(serde_json::json!({"status": status.as_u16(), "body": text}))
            }
        }
    }

    /// Runs the tick loop until `shutdown` signals true, firing any enabled
    /// job whose schedule has a fire time due since its last run (§4.9). A
    /// no-op loop (besides honoring shutdown) when `settings.enabled` is
    /// false — jobs still run via `run_now`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.settings.enabled {
            let _ = shutdown.changed().await;
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_millis(DEFAULT_TICK_MS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let mut doc = match self.repo.load().await {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(error = %err, "scheduler tick: failed to load jobs document");
                return;
            }
        };

        let now = Utc::now();
        let due: Vec<Uuid> = doc
            .jobs
            .iter()
            .filter(|job| job.enabled && is_due(job, now))
            .map(|job| job.id)
            .collect();

        for id in due {
            let job = match doc.jobs.iter().find(|j| j.id == id) {
                Some(job) => job.clone(),
                None => continue,
            };
            let result = self.execute(&job).await;
            if let Some(slot) = doc.jobs.iter_mut().find(|j| j.id == id) {
                slot.last_run_at = Some(now);
                slot.last_result = Some(result);
            }
        }

        if let Err(err) = self.repo.save(&doc).await {
            tracing::warn!(error = %err, "scheduler tick: failed to persist jobs document");
        }
    }

    async fn run_action(&self, action: &Action) -> Result<(), String> {
        match action {
            Action::MemoryUpdate { namespace, key, value } => {
                self.deps.memory.upsert(namespace, key, value.clone()).await.map_err(|e| e.to_string())
            }
            Action::SendMessage { channel, body } => {
                self.deps.notifier.send(channel, body).await.map_err(|e| e.to_string())
            }
            Action::LogEvent { message, data } => {
                self.bus
                    .publish(
                        EventType::ToolExecuted,
                        serde_json::json!({"message": message, "data": data}),
                        PublishContext::default(),
                    )
                    .await;
                Ok(())
            }
        }
    }
}

/// Full-jitter exponential backoff starting from `base_ms`, capped at
/// `cap_ms` (§4.9).
fn full_jitter_backoff_ms(attempt: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let base = base_ms.max(1).saturating_mul(1u64 << attempt.min(20));
    let capped = base.min(cap_ms.max(1));
    rand::thread_rng().gen_range(0..=capped)
}

/// Whether `job`'s schedule has a fire time at or before `now` that it
/// hasn't run yet. A job with no `last_run_at` looks one tick interval
/// into the past so the very next matching minute still fires.
fn is_due(job: &ScheduledJob, now: chrono::DateTime<Utc>) -> bool {
    let schedule = match parse_cron(&job.cron) {
        Ok(schedule) => schedule,
        Err(_) => return false,
    };
    let since = job
        .last_run_at
        .unwrap_or_else(|| now - chrono::Duration::milliseconds(DEFAULT_TICK_MS as i64));
    match schedule.after(&since).next() {
        Some(next_fire) => next_fire <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_five_field_by_prepending_seconds() {
        assert_eq!(normalize_cron("0 0 * * *").unwrap(), "0 0 0 * * *");
    }

    #[test]
    fn accepts_six_field_as_is() {
        assert_eq!(normalize_cron("*/5 * * * * *").unwrap(), "*/5 * * * * *");
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = normalize_cron("* * *").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn parse_cron_rejects_malformed_expression() {
        let err = parse_cron("99 99 99 99 99").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn backoff_is_bounded_by_cap() {
        for attempt in 0..5 {
            let backoff = full_jitter_backoff_ms(attempt, 1000, 10_000);
            assert!(backoff <= 10_000);
        }
    }

    #[test]
    fn backoff_grows_with_configured_base() {
        // attempt 0 with base 5000 can never exceed a 10_000 cap by more
        // than the base itself would without jitter.
        for _ in 0..20 {
            assert!(full_jitter_backoff_ms(0, 5000, 10_000) <= 5000);
        }
    }

    fn sample_job(cron: &str) -> ScheduledJob {
        ScheduledJob::new("test-job", cron, Trigger::ToolCall { tool: "noop".into(), arguments: serde_json::json!({}) })
    }

    fn fixed_now() -> chrono::DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn every_minute_job_with_no_last_run_is_due() {
        let job = sample_job("* * * * *");
        assert!(is_due(&job, fixed_now()));
    }

    #[test]
    fn job_run_at_the_same_fire_time_is_not_due_again() {
        let mut job = sample_job("* * * * *");
        job.last_run_at = Some(fixed_now());
        assert!(!is_due(&job, fixed_now()));
    }

    #[test]
    fn malformed_cron_never_matches() {
        let job = sample_job("not a cron expression");
        assert!(!is_due(&job, fixed_now()));
    }
}
