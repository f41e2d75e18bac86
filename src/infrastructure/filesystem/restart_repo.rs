//! File-backed restart intent store: `<state_dir>/restart.json` (§4.10, §6).
//!
//! Absence of the file means no pending restart intent — callers treat a
//! missing file and an explicit `requested: false` document the same way.

use std::path::PathBuf;

use crate::domain::error::RestartError;
use crate::domain::models::RestartIntent;
use crate::infrastructure::filesystem::atomic::{read_json, write_json_atomic};

pub struct FileRestartStore {
    path: PathBuf,
}

impl FileRestartStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join("restart.json") }
    }

    pub async fn load(&self) -> Result<Option<RestartIntent>, RestartError> {
        read_json(&self.path).await.map_err(|e| RestartError::Io(e.to_string()))
    }

    pub async fn save(&self, intent: &RestartIntent) -> Result<(), RestartError> {
        write_json_atomic(&self.path, intent).await.map_err(|e| RestartError::Io(e.to_string()))
    }

    pub async fn clear(&self) -> Result<(), RestartError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RestartError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_intent() -> RestartIntent {
        RestartIntent {
            requested: true,
            requested_at: chrono::Utc::now(),
            reason: "config_reload".into(),
            message: Some("picking up new provider config".into()),
            target: None,
            metadata: json!({}),
            task_context: None,
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRestartStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_load_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRestartStore::new(dir.path());
        store.save(&sample_intent()).await.unwrap();
        assert!(store.load().await.unwrap().unwrap().requested);
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
