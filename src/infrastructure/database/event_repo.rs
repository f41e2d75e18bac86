//! Event store implementations (§4.2).
//!
//! `SqliteEventStore` is the durable, production-facing implementation.
//! `InMemoryEventStore` backs unit tests and minimal/embedded deployments
//! that don't want a SQLite file.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::EventStoreError;
use crate::domain::models::{Event, EventType};
use crate::domain::ports::event_store::{
    BucketCount, ErrorStat, EventOrder, EventQuery, EventStore, TimeBucket, ToolUsage,
};

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn event_type_from_str(s: &str) -> Option<EventType> {
    EventType::ALL.iter().copied().find(|t| t.as_str() == s)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert(&self, event: &Event) -> Result<(), EventStoreError> {
        self.insert_batch(std::slice::from_ref(event)).await
    }

    async fn insert_batch(&self, events: &[Event]) -> Result<(), EventStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EventStoreError::Append(e.to_string()))?;
        for event in events {
            let payload = serde_json::to_string(&event.payload)
                .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO events (id, event_type, timestamp, session_key, channel, payload) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(event.id.to_string())
            .bind(event.event_type.as_str())
            .bind(event.timestamp.to_rfc3339())
            .bind(&event.session_key)
            .bind(&event.channel)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| EventStoreError::Append(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| EventStoreError::Append(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<Event>, EventStoreError> {
        // Built with a small, explicit query builder rather than a macro:
        // the filter set is closed and known ahead of time (§4.2). Every
        // value is passed as a bind parameter; only the closed-enum ORDER BY
        // clause is interpolated, since column/direction can't be bound.
        let mut sql = String::from(
            "SELECT id, event_type, timestamp, session_key, channel, payload FROM events WHERE 1=1",
        );
        if !query.types.is_empty() {
            let placeholders = std::iter::repeat("?").take(query.types.len()).collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND event_type IN ({placeholders})"));
        }
        if query.session_key.is_some() {
            sql.push_str(" AND session_key = ?");
        }
        if query.channel.is_some() {
            sql.push_str(" AND channel = ?");
        }
        if query.since.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if query.until.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        let order = match query.order.unwrap_or(EventOrder::TimestampAsc) {
            EventOrder::TimestampAsc => "timestamp ASC",
            EventOrder::TimestampDesc => "timestamp DESC",
            EventOrder::TypeAsc => "event_type ASC",
            EventOrder::TypeDesc => "event_type DESC",
        };
        sql.push_str(&format!(" ORDER BY {order}"));
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
            if query.offset.is_some() {
                sql.push_str(" OFFSET ?");
            }
        }

        let mut bound = sqlx::query(&sql);
        for event_type in &query.types {
            bound = bound.bind(event_type.as_str());
        }
        if let Some(sk) = query.session_key {
            bound = bound.bind(sk);
        }
        if let Some(ch) = query.channel {
            bound = bound.bind(ch);
        }
        if let Some(since) = query.since {
            bound = bound.bind(since.to_rfc3339());
        }
        if let Some(until) = query.until {
            bound = bound.bind(until.to_rfc3339());
        }
        if let Some(limit) = query.limit {
            bound = bound.bind(i64::from(limit));
            if let Some(offset) = query.offset {
                bound = bound.bind(i64::from(offset));
            }
        }

        let rows = bound.fetch_all(&self.pool).await.map_err(|e| EventStoreError::Query(e.to_string()))?;

        rows.into_iter().map(row_to_event).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>, EventStoreError> {
        let row = sqlx::query(
            "SELECT id, event_type, timestamp, session_key, channel, payload FROM events WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EventStoreError::Query(e.to_string()))?;
        row.map(row_to_event).transpose()
    }

    async fn count_by_type(&self, event_type: EventType) -> Result<u64, EventStoreError> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM events WHERE event_type = ?")
            .bind(event_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::Query(e.to_string()))?;
        Ok(row.get::<i64, _>("c") as u64)
    }

    async fn aggregate_counts_by_time_bucket(
        &self,
        bucket: TimeBucket,
    ) -> Result<Vec<BucketCount>, EventStoreError> {
        let format = match bucket {
            TimeBucket::Hour => "%Y-%m-%dT%H:00:00",
            TimeBucket::Day => "%Y-%m-%d",
        };
        let rows = sqlx::query(&format!(
            "SELECT strftime('{format}', timestamp) as bucket, COUNT(*) as c FROM events GROUP BY bucket ORDER BY bucket ASC",
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EventStoreError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let bucket_str: String = row.get("bucket");
                let bucket_start = DateTime::parse_from_rfc3339(&format!("{bucket_str}Z").replacen("00Z", "00+00:00", 1))
                    .or_else(|_| DateTime::parse_from_rfc3339(&format!("{bucket_str}T00:00:00+00:00")))
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                Ok(BucketCount { bucket_start, count: row.get::<i64, _>("c") as u64 })
            })
            .collect()
    }

    async fn aggregate_tool_usage(&self) -> Result<Vec<ToolUsage>, EventStoreError> {
        let rows = self
            .query(EventQuery { types: vec![EventType::ToolExecuted], ..Default::default() })
            .await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in rows {
            let tool = event
                .payload
                .get("tool")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            *counts.entry(tool).or_insert(0) += 1;
        }
        Ok(counts.into_iter().map(|(tool_name, count)| ToolUsage { tool_name, count }).collect())
    }

    async fn aggregate_error_stats(&self) -> Result<Vec<ErrorStat>, EventStoreError> {
        let rows = self
            .query(EventQuery { types: vec![EventType::ErrorOccurred], ..Default::default() })
            .await?;
        let mut counts: HashMap<(String, String), u64> = HashMap::new();
        for event in rows {
            let severity = event.payload.get("severity").and_then(|v| v.as_str()).unwrap_or("error").to_string();
            let error_type = event.payload.get("error_type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *counts.entry((severity, error_type)).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((severity, error_type), count)| ErrorStat { severity, error_type, count })
            .collect())
    }

    async fn sweep_retention(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Result<u64, EventStoreError> {
        let cutoff = now - retention;
        let result = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<Event, EventStoreError> {
    let id: String = row.get("id");
    let event_type: String = row.get("event_type");
    let timestamp: String = row.get("timestamp");
    let payload: String = row.get("payload");
    Ok(Event {
        id: Uuid::parse_str(&id).map_err(|e| EventStoreError::Serialization(e.to_string()))?,
        event_type: event_type_from_str(&event_type)
            .ok_or_else(|| EventStoreError::Serialization(format!("unknown event type {event_type}")))?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| EventStoreError::Serialization(e.to_string()))?
            .with_timezone(&Utc),
        session_key: row.get("session_key"),
        channel: row.get("channel"),
        payload: serde_json::from_str(&payload).map_err(|e| EventStoreError::Serialization(e.to_string()))?,
    })
}

/// A non-durable `EventStore` used by tests and embedded deployments.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: &Event) -> Result<(), EventStoreError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn insert_batch(&self, events: &[Event]) -> Result<(), EventStoreError> {
        self.events.lock().unwrap().extend(events.iter().cloned());
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<Event>, EventStoreError> {
        let events = self.events.lock().unwrap();
        let mut matches: Vec<Event> = events
            .iter()
            .filter(|e| query.types.is_empty() || query.types.contains(&e.event_type))
            .filter(|e| query.session_key.as_deref().is_none_or(|sk| e.session_key.as_deref() == Some(sk)))
            .filter(|e| query.channel.as_deref().is_none_or(|ch| e.channel.as_deref() == Some(ch)))
            .filter(|e| query.since.is_none_or(|since| e.timestamp >= since))
            .filter(|e| query.until.is_none_or(|until| e.timestamp <= until))
            .cloned()
            .collect();
        match query.order.unwrap_or(EventOrder::TimestampAsc) {
            EventOrder::TimestampAsc => matches.sort_by_key(|e| e.timestamp),
            EventOrder::TimestampDesc => matches.sort_by_key(|e| std::cmp::Reverse(e.timestamp)),
            EventOrder::TypeAsc => matches.sort_by_key(|e| e.event_type.as_str()),
            EventOrder::TypeDesc => matches.sort_by_key(|e| std::cmp::Reverse(e.event_type.as_str())),
        }
        if let Some(offset) = query.offset {
            matches = matches.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = query.limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Event>, EventStoreError> {
        Ok(self.events.lock().unwrap().iter().find(|e| e.id == id).cloned())
    }

    async fn count_by_type(&self, event_type: EventType) -> Result<u64, EventStoreError> {
        Ok(self.events.lock().unwrap().iter().filter(|e| e.event_type == event_type).count() as u64)
    }

    async fn aggregate_counts_by_time_bucket(
        &self,
        bucket: TimeBucket,
    ) -> Result<Vec<BucketCount>, EventStoreError> {
        let events = self.events.lock().unwrap();
        let mut counts: HashMap<DateTime<Utc>, u64> = HashMap::new();
        for event in events.iter() {
            let bucket_start = match bucket {
                TimeBucket::Hour => event.timestamp.date_naive().and_hms_opt(event.timestamp.time().hour(), 0, 0),
                TimeBucket::Day => event.timestamp.date_naive().and_hms_opt(0, 0, 0),
            };
            if let Some(naive) = bucket_start {
                *counts.entry(naive.and_utc()).or_insert(0) += 1;
            }
        }
        let mut result: Vec<BucketCount> =
            counts.into_iter().map(|(bucket_start, count)| BucketCount { bucket_start, count }).collect();
        result.sort_by_key(|b| b.bucket_start);
        Ok(result)
    }

    async fn aggregate_tool_usage(&self) -> Result<Vec<ToolUsage>, EventStoreError> {
        let events = self.events.lock().unwrap();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in events.iter().filter(|e| e.event_type == EventType::ToolExecuted) {
            let tool = event.payload.get("tool").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *counts.entry(tool).or_insert(0) += 1;
        }
        Ok(counts.into_iter().map(|(tool_name, count)| ToolUsage { tool_name, count }).collect())
    }

    async fn aggregate_error_stats(&self) -> Result<Vec<ErrorStat>, EventStoreError> {
        let events = self.events.lock().unwrap();
        let mut counts: HashMap<(String, String), u64> = HashMap::new();
        for event in events.iter().filter(|e| e.event_type == EventType::ErrorOccurred) {
            let severity = event.payload.get("severity").and_then(|v| v.as_str()).unwrap_or("error").to_string();
            let error_type = event.payload.get("error_type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *counts.entry((severity, error_type)).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((severity, error_type), count)| ErrorStat { severity, error_type, count })
            .collect())
    }

    async fn sweep_retention(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
    ) -> Result<u64, EventStoreError> {
        let cutoff = now - retention;
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((before - events.len()) as u64)
    }
}
