//! Active Runs Registry (§4.11 Active Runs Registry, C12).
//!
//! Process-wide in-memory bookkeeping for currently-executing runs. A
//! single mutex guards all three maps (§5 shared-resource policy): run id
//! to handle, session key to its run ids, and run id to end-waiters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::domain::models::ActiveRun;

/// Default `waitForRunEnd` timeout (§4.11).
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 15_000;

struct Registry {
    runs: HashMap<Uuid, ActiveRun>,
    by_session: HashMap<String, HashSet<Uuid>>,
    waiters: HashMap<Uuid, Vec<watch::Sender<bool>>>,
}

impl Registry {
    fn new() -> Self {
        Self { runs: HashMap::new(), by_session: HashMap::new(), waiters: HashMap::new() }
    }
}

pub struct ActiveRuns {
    inner: Mutex<Registry>,
}

impl Default for ActiveRuns {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Registry::new()) }
    }

    pub async fn register_active_run(&self, run: ActiveRun) {
        let mut registry = self.inner.lock().await;
        registry.by_session.entry(run.session_key.clone()).or_default().insert(run.run_id);
        registry.runs.insert(run.run_id, run);
    }

    /// Removes the run and resolves every pending `waitForRunEnd` call with `true`.
    pub async fn clear_active_run(&self, run_id: Uuid) {
        let mut registry = self.inner.lock().await;
        if let Some(run) = registry.runs.remove(&run_id) {
            if let Some(set) = registry.by_session.get_mut(&run.session_key) {
                set.remove(&run_id);
                if set.is_empty() {
                    registry.by_session.remove(&run.session_key);
                }
            }
        }
        if let Some(waiters) = registry.waiters.remove(&run_id) {
            for waiter in waiters {
                let _ = waiter.send(true);
            }
        }
    }

    pub async fn is_run_active(&self, run_id: Uuid) -> bool {
        self.inner.lock().await.runs.contains_key(&run_id)
    }

    pub async fn list_active_runs(&self) -> Vec<ActiveRun> {
        self.inner.lock().await.runs.values().cloned().collect()
    }

    pub async fn get_active_runs_for_session(&self, session_key: &str) -> Vec<ActiveRun> {
        let registry = self.inner.lock().await;
        registry
            .by_session
            .get(session_key)
            .into_iter()
            .flatten()
            .filter_map(|id| registry.runs.get(id).cloned())
            .collect()
    }

    /// Resolves `true` once `run_id` clears, or `false` if `timeout_ms`
    /// elapses first. Resolves synchronously if the run is already absent
    /// (§4.11).
    pub async fn wait_for_run_end(self: &Arc<Self>, run_id: Uuid, timeout_ms: Option<u64>) -> bool {
        let (tx, mut rx) = watch::channel(false);
        {
            let mut registry = self.inner.lock().await;
            if !registry.runs.contains_key(&run_id) {
                return true;
            }
            registry.waiters.entry(run_id).or_default().push(tx);
        }

        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));
        tokio::select! {
            changed = rx.changed() => changed.is_ok() && *rx.borrow(),
            _ = tokio::time::sleep(timeout) => false,
        }
    }
}
