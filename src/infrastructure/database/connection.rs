//! SQLite connection pool management.
//!
//! Mirrors the teacher's WAL-mode pool setup: foreign keys on, a busy
//! timeout to absorb lock contention under the single-writer policy (§5),
//! and `create_if_missing` so a fresh state directory boots cleanly.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

use crate::domain::error::EventStoreError;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self, EventStoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| EventStoreError::Query(format!("invalid database URL: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .idle_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(30 * 60))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| EventStoreError::Query(format!("connection failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the event store schema. Task and job state are file-backed
    /// (see `infrastructure::filesystem`), so this pool only ever owns the
    /// `events` table — its "opaque to callers" format (§6) is the one
    /// persistent artifact this crate treats as a real database concern.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                session_key TEXT,
                channel TEXT,
                payload TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::Query(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_type_ts ON events(event_type, timestamp);")
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::Query(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp);")
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::Query(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_key);")
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::Query(e.to_string()))?;

        Ok(())
    }
}
