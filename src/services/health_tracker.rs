//! Provider Health Tracker (§4.3 Health Tracker, C4).
//!
//! Process-wide shared mutable state behind an `RwLock`; external readers
//! get a cloned snapshot rather than a live reference (§5 shared-resource
//! policy).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::error::ProviderError;
use crate::domain::models::{
    CooldownReason, CooldownRecord, Event, EventType, ProviderHandle, ProviderStatus,
};
use crate::services::event_bus::{EventBus, EventHandler};

/// `errorRate > 50%` → offline; `> 20%` → degraded; else healthy, unless cooling down.
const OFFLINE_ERROR_RATE_PCT: f64 = 50.0;
const DEGRADED_ERROR_RATE_PCT: f64 = 20.0;

pub struct HealthTracker {
    providers: RwLock<HashMap<String, ProviderHandle>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { providers: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, provider: ProviderHandle) {
        self.providers.write().await.insert(provider.id.clone(), provider);
    }

    pub async fn get(&self, id: &str) -> Option<ProviderHandle> {
        self.providers.read().await.get(id).cloned()
    }

    /// A snapshot of every registered provider, for status APIs (§5).
    pub async fn snapshot(&self) -> Vec<ProviderHandle> {
        self.providers.read().await.values().cloned().collect()
    }

    pub async fn record_success(&self, id: &str, response_time_ms: u64) {
        let mut providers = self.providers.write().await;
        if let Some(handle) = providers.get_mut(id) {
            handle.stats.record_success(response_time_ms);
            recompute_status(handle);
        }
    }

    pub async fn record_error(&self, id: &str) {
        let mut providers = self.providers.write().await;
        if let Some(handle) = providers.get_mut(id) {
            handle.stats.record_error();
            recompute_status(handle);
        }
    }

    pub async fn set_cooldown(&self, id: &str, until: chrono::DateTime<Utc>, reason: CooldownReason) {
        let mut providers = self.providers.write().await;
        if let Some(handle) = providers.get_mut(id) {
            handle.cooldown = Some(CooldownRecord { until, reason, started_at: Utc::now() });
            handle.status = ProviderStatus::Cooldown;
            handle.healthy_since = None;
        }
    }

    /// Clears cooldown explicitly (`provider_recovery`) or because `until` has elapsed.
    pub async fn clear_cooldown(&self, id: &str) {
        let mut providers = self.providers.write().await;
        if let Some(handle) = providers.get_mut(id) {
            handle.cooldown = None;
            recompute_status(handle);
        }
    }

    /// Providers not currently cooling down, ordered by ascending error rate
    /// then ascending average response time (§4.3 "best available provider").
    pub async fn best_available(&self) -> Vec<ProviderHandle> {
        let now = Utc::now();
        let mut healthy: Vec<ProviderHandle> = self
            .providers
            .read()
            .await
            .values()
            .filter(|p| !p.is_cooling_down(now) && p.status != ProviderStatus::Cooldown)
            .cloned()
            .collect();
        healthy.sort_by(|a, b| {
            a.stats
                .error_rate()
                .partial_cmp(&b.stats.error_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.stats
                        .avg_response_time_ms()
                        .partial_cmp(&b.stats.avg_response_time_ms())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        healthy
    }

    pub async fn require(&self, id: &str) -> Result<ProviderHandle, ProviderError> {
        self.get(id).await.ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }
}

/// Cooldown is exclusive: it overrides the error-rate-derived status until
/// explicitly cleared or `until` elapses (§4.3).
fn recompute_status(handle: &mut ProviderHandle) {
    if let Some(ref cooldown) = handle.cooldown {
        if cooldown.until > Utc::now() {
            handle.status = ProviderStatus::Cooldown;
            return;
        }
        handle.cooldown = None;
    }
    let error_rate = handle.stats.error_rate();
    let was_healthy = handle.status == ProviderStatus::Healthy;
    handle.status = if error_rate > OFFLINE_ERROR_RATE_PCT {
        ProviderStatus::Offline
    } else if error_rate > DEGRADED_ERROR_RATE_PCT {
        ProviderStatus::Degraded
    } else {
        ProviderStatus::Healthy
    };
    if handle.status == ProviderStatus::Healthy && !was_healthy {
        handle.healthy_since = Some(Utc::now());
    }
}

/// Listens on the bus for the events that affect provider health
/// (`agent_response`, `error_occurred`, `provider_cooldown`, `provider_recovery`).
pub struct HealthTrackerHandler {
    tracker: Arc<HealthTracker>,
}

impl HealthTrackerHandler {
    pub fn new(tracker: Arc<HealthTracker>) -> Self {
        Self { tracker }
    }

    pub async fn attach(self: Arc<Self>, bus: &EventBus) {
        bus.subscribe(EventType::AgentResponse, self.clone(), None).await;
        bus.subscribe(EventType::ErrorOccurred, self.clone(), None).await;
        bus.subscribe(EventType::ProviderCooldown, self.clone(), None).await;
        bus.subscribe(EventType::ProviderRecovery, self.clone(), None).await;
    }
}

#[async_trait]
impl EventHandler for HealthTrackerHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some(provider_id) = event.payload.get("provider_id").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        match event.event_type {
            EventType::AgentResponse => {
                let response_time_ms =
                    event.payload.get("response_time_ms").and_then(serde_json::Value::as_u64).unwrap_or(0);
                self.tracker.record_success(provider_id, response_time_ms).await;
            }
            EventType::ErrorOccurred => {
                self.tracker.record_error(provider_id).await;
            }
            EventType::ProviderCooldown => {
                let until = event
                    .payload
                    .get("until")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let reason = event
                    .payload
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .and_then(reason_from_str)
                    .unwrap_or(CooldownReason::Error);
                self.tracker.set_cooldown(provider_id, until, reason).await;
            }
            EventType::ProviderRecovery => {
                self.tracker.clear_cooldown(provider_id).await;
            }
            _ => {}
        }
        Ok(())
    }
}

fn reason_from_str(s: &str) -> Option<CooldownReason> {
    match s {
        "rate_limit" => Some(CooldownReason::RateLimit),
        "quota" => Some(CooldownReason::Quota),
        "auth" => Some(CooldownReason::Auth),
        "maintenance" => Some(CooldownReason::Maintenance),
        "error" => Some(CooldownReason::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionKind, ProviderGroup, ProviderKind, ProviderStats};

    fn handle(id: &str) -> ProviderHandle {
        ProviderHandle {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: ProviderKind::OpenAiCompatible,
            model: "gpt-test".to_string(),
            group: ProviderGroup::Configured,
            status: ProviderStatus::Healthy,
            stats: ProviderStats::default(),
            cooldown: None,
            healthy_since: Some(Utc::now()),
            parent: None,
            supported_actions: vec![ActionKind::Chat],
        }
    }

    #[tokio::test]
    async fn error_rate_crossing_thresholds_transitions_status() {
        let tracker = HealthTracker::new();
        tracker.register(handle("p1")).await;
        for _ in 0..10 {
            tracker.record_error("p1").await;
        }
        assert_eq!(tracker.get("p1").await.unwrap().status, ProviderStatus::Offline);
    }

    #[tokio::test]
    async fn cooldown_overrides_error_rate_until_cleared() {
        let tracker = HealthTracker::new();
        tracker.register(handle("p1")).await;
        tracker.set_cooldown("p1", Utc::now() + chrono::Duration::seconds(60), CooldownReason::RateLimit).await;
        assert_eq!(tracker.get("p1").await.unwrap().status, ProviderStatus::Cooldown);
        tracker.clear_cooldown("p1").await;
        assert_eq!(tracker.get("p1").await.unwrap().status, ProviderStatus::Healthy);
    }

    #[tokio::test]
    async fn best_available_excludes_cooling_providers() {
        let tracker = HealthTracker::new();
        tracker.register(handle("p1")).await;
        tracker.register(handle("p2")).await;
        tracker.set_cooldown("p1", Utc::now() + chrono::Duration::seconds(60), CooldownReason::RateLimit).await;
        let available = tracker.best_available().await;
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "p2");
    }
}
