//! Provider Router (§4.3 Router, C3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::error::ProviderError;
use crate::domain::models::{ActionKind, ProviderGroup, ProviderHandle};
use crate::services::health_tracker::HealthTracker;

/// Static routing configuration: an explicit action→provider-id map and the
/// fallback used when an action has no explicit entry.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub action_overrides: HashMap<ActionKind, String>,
    pub default_provider_id: Option<String>,
}

pub struct ProviderRouter {
    tracker: Arc<HealthTracker>,
    routing: RoutingTable,
}

impl ProviderRouter {
    pub fn new(tracker: Arc<HealthTracker>, routing: RoutingTable) -> Self {
        Self { tracker, routing }
    }

    /// Resolve a provider for `action`. Falls back to the default provider
    /// when no explicit mapping exists, then to a configured parent when the
    /// resolved provider can't serve the action directly (§4.3).
    pub async fn resolve(&self, action: ActionKind) -> Result<ProviderHandle, ProviderError> {
        let candidate_id = self
            .routing
            .action_overrides
            .get(&action)
            .cloned()
            .or_else(|| self.routing.default_provider_id.clone())
            .ok_or_else(|| ProviderError::NoHealthyProvider(action.as_str().to_string()))?;

        let candidate = self.tracker.require(&candidate_id).await?;
        if candidate.supports(action) && !candidate.is_cooling_down(Utc::now()) {
            return Ok(candidate);
        }

        if let Some(parent_id) = candidate.parent.clone() {
            let parent = self.tracker.require(&parent_id).await?;
            if parent.supports(action) && !parent.is_cooling_down(Utc::now()) {
                return Ok(parent);
            }
        }

        // The configured/default candidate is unusable; fall back to the
        // best healthy provider that can serve this action.
        let best = self
            .tracker
            .best_available()
            .await
            .into_iter()
            .find(|p| p.supports(action));
        best.ok_or_else(|| ProviderError::NoHealthyProvider(action.as_str().to_string()))
    }
}

/// Fields the priority-ordering function sorts on (§4.3, §8 property 7).
#[derive(Debug, Clone)]
pub struct PriorityCandidate {
    pub id: String,
    pub group: ProviderGroup,
    pub cooling_down: bool,
    pub failures: u64,
}

/// Sort order: `group` asc, then `coolingDown` (healthy first), then
/// `failures` asc, then `id` asc. Stable — ties preserve input order.
pub fn priority_order(mut candidates: Vec<PriorityCandidate>) -> Vec<String> {
    candidates.sort_by(|a, b| {
        a.group
            .cmp(&b.group)
            .then_with(|| a.cooling_down.cmp(&b.cooling_down))
            .then_with(|| a.failures.cmp(&b.failures))
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.into_iter().map(|c| c.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CooldownReason, ProviderKind, ProviderStats, ProviderStatus};

    fn handle(id: &str, parent: Option<&str>, actions: Vec<ActionKind>) -> ProviderHandle {
        ProviderHandle {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: ProviderKind::OpenAiCompatible,
            model: "m".to_string(),
            group: ProviderGroup::Configured,
            status: ProviderStatus::Healthy,
            stats: ProviderStats::default(),
            cooldown: None,
            healthy_since: Some(Utc::now()),
            parent: parent.map(str::to_string),
            supported_actions: actions,
        }
    }

    #[tokio::test]
    async fn resolves_default_provider_for_unmapped_action() {
        let tracker = Arc::new(HealthTracker::new());
        tracker.register(handle("p1", None, vec![ActionKind::Chat])).await;
        let router = ProviderRouter::new(
            tracker,
            RoutingTable { action_overrides: HashMap::new(), default_provider_id: Some("p1".into()) },
        );
        let resolved = router.resolve(ActionKind::Chat).await.unwrap();
        assert_eq!(resolved.id, "p1");
    }

    #[tokio::test]
    async fn falls_back_to_parent_when_unsupported() {
        let tracker = Arc::new(HealthTracker::new());
        tracker.register(handle("cli", Some("parent"), vec![ActionKind::Chat])).await;
        tracker.register(handle("parent", None, vec![ActionKind::Chat, ActionKind::Tools])).await;
        let router = ProviderRouter::new(
            tracker,
            RoutingTable { action_overrides: HashMap::new(), default_provider_id: Some("cli".into()) },
        );
        let resolved = router.resolve(ActionKind::Tools).await.unwrap();
        assert_eq!(resolved.id, "parent");
    }

    #[tokio::test]
    async fn cooldown_on_default_triggers_best_available_fallback() {
        let tracker = Arc::new(HealthTracker::new());
        tracker.register(handle("p1", None, vec![ActionKind::Chat])).await;
        tracker.register(handle("p2", None, vec![ActionKind::Chat])).await;
        tracker.set_cooldown("p1", Utc::now() + chrono::Duration::seconds(60), CooldownReason::RateLimit).await;
        let router = ProviderRouter::new(
            tracker,
            RoutingTable { action_overrides: HashMap::new(), default_provider_id: Some("p1".into()) },
        );
        let resolved = router.resolve(ActionKind::Chat).await.unwrap();
        assert_eq!(resolved.id, "p2");
    }

    #[tokio::test]
    async fn no_healthy_provider_when_all_cooling() {
        let tracker = Arc::new(HealthTracker::new());
        tracker.register(handle("p1", None, vec![ActionKind::Chat])).await;
        tracker.set_cooldown("p1", Utc::now() + chrono::Duration::seconds(60), CooldownReason::RateLimit).await;
        let router = ProviderRouter::new(
            tracker,
            RoutingTable { action_overrides: HashMap::new(), default_provider_id: Some("p1".into()) },
        );
        let err = router.resolve(ActionKind::Chat).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoHealthyProvider(_)));
    }

    #[test]
    fn priority_order_sorts_by_group_then_cooldown_then_failures_then_id() {
        let candidates = vec![
            PriorityCandidate { id: "b".into(), group: ProviderGroup::Local, cooling_down: false, failures: 0 },
            PriorityCandidate { id: "a".into(), group: ProviderGroup::Configured, cooling_down: true, failures: 0 },
            PriorityCandidate { id: "c".into(), group: ProviderGroup::Configured, cooling_down: false, failures: 2 },
            PriorityCandidate { id: "d".into(), group: ProviderGroup::Configured, cooling_down: false, failures: 1 },
        ];
        assert_eq!(priority_order(candidates), vec!["d", "c", "a", "b"]);
    }
}
