//! Memory store port (§1: the embedded text/vector memory store is an
//! external collaborator, specified only as a capability consumed by
//! tools/actions — §6 `memory_update` action).

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn upsert(&self, namespace: &str, key: &str, value: Value) -> anyhow::Result<()>;
}

/// A `MemoryStore` that discards writes, for tests and minimal deployments.
#[derive(Debug, Default)]
pub struct NullMemoryStore;

#[async_trait]
impl MemoryStore for NullMemoryStore {
    async fn upsert(&self, _namespace: &str, _key: &str, _value: Value) -> anyhow::Result<()> {
        Ok(())
    }
}
