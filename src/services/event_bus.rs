//! Typed publish/subscribe event hub (§4.1 Event Bus, C1).
//!
//! Dispatch is single-threaded cooperative with respect to each `publish`
//! call: handlers may do asynchronous work, but `publish` does not return
//! until every matching handler has completed. Handler failures are caught
//! and logged; they never abort other handlers or the publisher.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex, RwLock};
use uuid::Uuid;

use crate::domain::error::WaitError;
use crate::domain::models::{Event, EventType, PublishContext};

/// A predicate deciding whether a handler should see an event.
pub type EventFilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// A registered event handler. Returning `Err` logs and is otherwise ignored.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

struct Subscription {
    id: Uuid,
    event_type: Option<EventType>,
    filter: Option<EventFilterFn>,
    handler: Arc<dyn EventHandler>,
}

/// Handle returned by `subscribe`/`subscribe_all`; dropping it does not
/// unsubscribe — call `unsubscribe` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(pub Uuid);

struct Inner {
    subscriptions: Vec<Subscription>,
    paused: bool,
    buffer: VecDeque<Event>,
}

/// Bounded ring buffer size while paused; oldest events are dropped (§4.1, §5).
pub const PAUSE_BUFFER_CAPACITY: usize = 1000;

pub struct EventBus {
    inner: Arc<RwLock<Inner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                subscriptions: Vec::new(),
                paused: false,
                buffer: VecDeque::new(),
            })),
        }
    }

    /// Register a handler for one event type.
    pub async fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        self.register(Some(event_type), handler, filter).await
    }

    /// Register a handler for every event type.
    pub async fn subscribe_all(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        self.register(None, handler, filter).await
    }

    async fn register(
        &self,
        event_type: Option<EventType>,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.subscriptions.push(Subscription { id, event_type, filter, handler });
        SubscriptionHandle(id)
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut inner = self.inner.write().await;
        inner.subscriptions.retain(|s| s.id != handle.0);
    }

    /// Assign a fresh id and timestamp, dispatch to matching handlers (or
    /// buffer if paused), and return the materialized event.
    pub async fn publish(
        &self,
        event_type: EventType,
        payload: serde_json::Value,
        ctx: PublishContext,
    ) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            event_type,
            timestamp: chrono::Utc::now(),
            session_key: ctx.session_key,
            channel: ctx.channel,
            payload,
        };

        let mut inner = self.inner.write().await;
        if inner.paused {
            if inner.buffer.len() >= PAUSE_BUFFER_CAPACITY {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(event.clone());
            return event;
        }
        drop(inner);
        self.dispatch(&event).await;
        event
    }

    async fn dispatch(&self, event: &Event) {
        let matching: Vec<Arc<dyn EventHandler>> = {
            let inner = self.inner.read().await;
            inner
                .subscriptions
                .iter()
                .filter(|s| s.event_type.is_none_or(|t| t == event.event_type))
                .filter(|s| s.filter.as_ref().is_none_or(|f| f(event)))
                .map(|s| s.handler.clone())
                .collect()
        };

        let futures = matching.into_iter().map(|handler| {
            let event = event.clone();
            async move {
                if let Err(err) = handler.handle(&event).await {
                    tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %err, "event handler failed");
                }
            }
        });
        futures::future::join_all(futures).await;
    }

    /// While paused, published events are buffered instead of dispatched.
    pub async fn pause(&self) {
        self.inner.write().await.paused = true;
    }

    /// Flush buffered events in publish order, then resume live dispatch.
    pub async fn resume(&self) {
        let buffered: Vec<Event> = {
            let mut inner = self.inner.write().await;
            inner.paused = false;
            inner.buffer.drain(..).collect()
        };
        for event in &buffered {
            self.dispatch(event).await;
        }
    }

    /// Resolve with the next event matching `event_type` (and `filter`, if
    /// given), or fail with `WaitError::Timeout` after `timeout_ms`.
    pub async fn once(
        &self,
        event_type: EventType,
        filter: Option<EventFilterFn>,
        timeout_ms: u64,
    ) -> Result<Event, WaitError> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        struct OnceHandler {
            tx: Arc<Mutex<Option<oneshot::Sender<Event>>>>,
        }

        #[async_trait]
        impl EventHandler for OnceHandler {
            async fn handle(&self, event: &Event) -> anyhow::Result<()> {
                if let Some(tx) = self.tx.lock().await.take() {
                    let _ = tx.send(event.clone());
                }
                Ok(())
            }
        }

        let handle = self
            .subscribe(event_type, Arc::new(OnceHandler { tx }), filter)
            .await;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            rx,
        )
        .await;

        self.unsubscribe(handle).await;

        match result {
            Ok(Ok(event)) => Ok(event),
            _ => Err(WaitError::Timeout),
        }
    }

    /// A view composing an additional predicate onto every `subscribe` call.
    pub fn filter(self: &Arc<Self>, predicate: EventFilterFn) -> FilteredBus {
        FilteredBus { bus: self.clone(), predicate }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }
}

/// A view over an `EventBus` that ANDs a base predicate onto every subscribe.
pub struct FilteredBus {
    bus: Arc<EventBus>,
    predicate: EventFilterFn,
}

impl FilteredBus {
    pub async fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        let combined = combine(self.predicate.clone(), filter);
        self.bus.subscribe(event_type, handler, Some(combined)).await
    }

    pub async fn subscribe_all(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilterFn>,
    ) -> SubscriptionHandle {
        let combined = combine(self.predicate.clone(), filter);
        self.bus.subscribe_all(handler, Some(combined)).await
    }
}

fn combine(base: EventFilterFn, extra: Option<EventFilterFn>) -> EventFilterFn {
    match extra {
        Some(extra) => Arc::new(move |e: &Event| base(e) && extra(e)),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_dispatches_to_matching_subscriber() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            EventType::TaskQueued,
            Arc::new(CountingHandler(count.clone())),
            None,
        )
        .await;
        bus.publish(EventType::TaskQueued, serde_json::json!({}), PublishContext::default()).await;
        bus.publish(EventType::TaskStarted, serde_json::json!({}), PublishContext::default()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_buffers_and_resume_flushes_in_order() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe_all(Arc::new(CountingHandler(count.clone())), None).await;
        bus.pause().await;
        bus.publish(EventType::TaskQueued, serde_json::json!({}), PublishContext::default()).await;
        bus.publish(EventType::TaskStarted, serde_json::json!({}), PublishContext::default()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.resume().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn once_resolves_on_match() {
        let bus = Arc::new(EventBus::new());
        let waiter = bus.once(EventType::TaskSucceeded, None, 1000);
        let publisher = {
            let bus = bus.clone();
            async move {
                bus.publish(EventType::TaskSucceeded, serde_json::json!({"ok": true}), PublishContext::default()).await;
            }
        };
        let (result, ()) = tokio::join!(waiter, publisher);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn once_times_out_without_match() {
        let bus = EventBus::new();
        let result = bus.once(EventType::TaskFailed, None, 20).await;
        assert!(matches!(result, Err(WaitError::Timeout)));
    }

    #[tokio::test]
    async fn filtered_view_ands_predicates() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let view = bus.filter(Arc::new(|e: &Event| e.session_key.as_deref() == Some("s1")));
        view.subscribe_all(Arc::new(CountingHandler(count.clone())), None).await;

        bus.publish(
            EventType::TaskQueued,
            serde_json::json!({}),
            PublishContext { session_key: Some("s2".into()), channel: None },
        )
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish(
            EventType::TaskQueued,
            serde_json::json!({}),
            PublishContext { session_key: Some("s1".into()), channel: None },
        )
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
