//! Concrete adapters for persistence, configuration, and logging.

pub mod config;
pub mod database;
pub mod filesystem;
pub mod logging;
