//! Messaging/notification port (§4.8 owner notifications, §6 `send_message` action).
//!
//! The messaging integration and web UI are external collaborators (§1);
//! this is the seam the Supervisor and Scheduler call through.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to the given channel/recipient. Best-effort: failures
    /// are logged, never fatal to the caller (§7 propagation policy).
    async fn send(&self, channel: &str, body: &str) -> anyhow::Result<()>;
}

/// A `Notifier` that records sends for tests instead of delivering them.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _channel: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
