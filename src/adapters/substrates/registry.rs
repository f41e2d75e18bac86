//! Maps a provider id to its concrete backend connection, built once at
//! startup from configured providers (§4.3 Provider Router, `BackendRegistry`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ports::backend::{BackendRegistry, LlmBackend};

pub struct ConfiguredBackendRegistry {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
}

impl ConfiguredBackendRegistry {
    pub fn new(backends: HashMap<String, Arc<dyn LlmBackend>>) -> Self {
        Self { backends }
    }
}

impl BackendRegistry for ConfiguredBackendRegistry {
    fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmBackend>> {
        self.backends.get(provider_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderError;
    use crate::domain::ports::backend::{BackendRequest, BackendResponse};
    use async_trait::async_trait;

    struct StubBackend;

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn complete(&self, _request: BackendRequest) -> Result<BackendResponse, ProviderError> {
            Ok(BackendResponse { text: "stub".into(), response_time_ms: 0 })
        }
    }

    #[test]
    fn resolves_registered_provider_and_misses_unknown() {
        let mut map: HashMap<String, Arc<dyn LlmBackend>> = HashMap::new();
        map.insert("p1".into(), Arc::new(StubBackend));
        let registry = ConfiguredBackendRegistry::new(map);

        assert!(registry.get("p1").is_some());
        assert!(registry.get("missing").is_none());
    }
}
