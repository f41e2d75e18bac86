//! Durable event store service (§4.2 Event Store, C2).
//!
//! Subscribes to every bus event and persists it through the configured
//! `EventStore` port. Retention sweeps run on a timer and, optionally, once
//! at startup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::models::Event;
use crate::domain::ports::EventStore;
use crate::services::event_bus::{EventBus, EventHandler};

/// Event store configuration (§6 `Event store` config section).
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub retention_days: i64,
    pub cleanup_on_startup: bool,
    pub cleanup_interval_hours: i64,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self { retention_days: 30, cleanup_on_startup: false, cleanup_interval_hours: 24 }
    }
}

struct PersistingHandler {
    store: Arc<dyn EventStore>,
}

#[async_trait]
impl EventHandler for PersistingHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.store.insert(event).await.map_err(|e| anyhow::anyhow!(e))
    }
}

pub struct EventStoreService {
    store: Arc<dyn EventStore>,
    config: EventStoreConfig,
}

impl EventStoreService {
    pub fn new(store: Arc<dyn EventStore>, config: EventStoreConfig) -> Self {
        Self { store, config }
    }

    /// Wire persistence onto the bus. Call once at startup.
    pub async fn attach(&self, bus: &EventBus) {
        bus.subscribe_all(Arc::new(PersistingHandler { store: self.store.clone() }), None).await;
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    /// Delete events older than the configured retention window.
    pub async fn sweep(&self, now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<u64> {
        let retention = Duration::days(self.config.retention_days);
        Ok(self.store.sweep_retention(now, retention).await?)
    }

    /// Run the periodic sweep loop until `shutdown` fires. Runs one sweep
    /// immediately if `cleanup_on_startup` is set.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.config.cleanup_on_startup {
            if let Err(err) = self.sweep(chrono::Utc::now()).await {
                tracing::warn!(error = %err, "startup event retention sweep failed");
            }
        }
        let interval_secs = (self.config.cleanup_interval_hours.max(1) * 3600) as u64;
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(chrono::Utc::now()).await {
                        tracing::warn!(error = %err, "event retention sweep failed");
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
    use crate::domain::models::{EventType, PublishContext};
    use crate::infrastructure::database::event_repo::InMemoryEventStore;

    #[tokio::test]
    async fn attached_service_persists_published_events() {
        let bus = EventBus::new();
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let service = EventStoreService::new(store.clone(), EventStoreConfig::default());
        service.attach(&bus).await;

        bus.publish(EventType::TaskQueued, serde_json::json!({"a":1}), PublishContext::default()).await;
        assert_eq!(store.count_by_type(EventType::TaskQueued).await.unwrap(), 1);
    }
}
