//! Domain layer for the autonomous execution core.
//!
//! Pure business logic and models, framework-agnostic and free of
//! infrastructure concerns.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{
    ConfigError, EventStoreError, ProviderError, RestartError, SchedulerError, TaskError,
    WaitError,
};
