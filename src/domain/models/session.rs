//! Session key grammar (§6): `<channel>:<kind>:<id>` or `agent:<agentId>:<scope>`.

use std::fmt;

/// A parsed, hierarchical session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    raw: String,
}

impl SessionKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The first colon-separated segment (`channel` or `agent`).
    pub fn namespace(&self) -> &str {
        self.raw.split(':').next().unwrap_or("")
    }

    pub fn is_agent_internal(&self) -> bool {
        self.namespace() == "agent"
    }

    pub fn system() -> Self {
        Self::new("agent:core:system")
    }

    pub fn startup_health() -> Self {
        Self::new("agent:core:startup-health")
    }

    pub fn for_task(task_id: uuid::Uuid) -> Self {
        Self::new(format!("agent:core:task:{task_id}"))
    }

    pub fn for_subagent(subagent_id: uuid::Uuid) -> Self {
        Self::new(format!("agent:core:subagent:{subagent_id}"))
    }

    /// The filesystem-safe form used for `sessions/<safeSessionKey>.jsonl`.
    pub fn safe_filename(&self) -> String {
        self.raw.replace([':', '/'], "_")
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<String> for SessionKey {
    fn from(raw: String) -> Self {
        Self { raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_extraction() {
        assert_eq!(SessionKey::new("msg:dm:123").namespace(), "msg");
        assert_eq!(SessionKey::new("agent:core:system").namespace(), "agent");
    }

    #[test]
    fn safe_filename_strips_colons() {
        assert_eq!(SessionKey::new("msg:dm:123").safe_filename(), "msg_dm_123");
    }

    #[test]
    fn well_known_scopes() {
        assert!(SessionKey::system().is_agent_internal());
        assert!(SessionKey::startup_health().as_str().ends_with("startup-health"));
    }
}
