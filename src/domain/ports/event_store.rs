//! Event store port (§4.2 Event Store).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::EventStoreError;
use crate::domain::models::{Event, EventType};

/// Sort order for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    TimestampAsc,
    TimestampDesc,
    TypeAsc,
    TypeDesc,
}

/// Filters accepted by `EventStore::query` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub types: Vec<EventType>,
    pub session_key: Option<String>,
    pub channel: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub order: Option<EventOrder>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Hour/day bucket granularity for `aggregate_counts_by_time_bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Hour,
    Day,
}

/// A single `(bucket_start, count)` pair.
#[derive(Debug, Clone)]
pub struct BucketCount {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
}

/// A single `(tool_name, count)` pair from `tool_executed` events.
#[derive(Debug, Clone)]
pub struct ToolUsage {
    pub tool_name: String,
    pub count: u64,
}

/// A single `(severity, error_type, count)` triple from `error_occurred` events.
#[derive(Debug, Clone)]
pub struct ErrorStat {
    pub severity: String,
    pub error_type: String,
    pub count: u64,
}

/// Durable, append-only store for bus events (§4.2).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &Event) -> Result<(), EventStoreError>;
    async fn insert_batch(&self, events: &[Event]) -> Result<(), EventStoreError>;
    async fn query(&self, query: EventQuery) -> Result<Vec<Event>, EventStoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>, EventStoreError>;
    async fn count_by_type(&self, event_type: EventType) -> Result<u64, EventStoreError>;
    async fn aggregate_counts_by_time_bucket(
        &self,
        bucket: TimeBucket,
    ) -> Result<Vec<BucketCount>, EventStoreError>;
    async fn aggregate_tool_usage(&self) -> Result<Vec<ToolUsage>, EventStoreError>;
    async fn aggregate_error_stats(&self) -> Result<Vec<ErrorStat>, EventStoreError>;
    /// Delete events older than `now - retention`. Returns the number deleted.
    async fn sweep_retention(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Result<u64, EventStoreError>;
}
