//! Coreloop: the autonomous execution core of a local agent runtime —
//! lane-limited task engine, cron scheduler, provider router, and event
//! bus, with the gateway and CLI as thin callers over it.

pub mod adapters;
pub mod cli;
pub mod context;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use context::AppContext;
