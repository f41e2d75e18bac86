//! SQLite-backed durable persistence for the event store (§4.2, §6).

pub mod connection;
pub mod event_repo;

pub use connection::DatabaseConnection;
pub use event_repo::{InMemoryEventStore, SqliteEventStore};
