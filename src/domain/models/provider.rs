//! Provider domain model (§3 Provider Handle, §4.3).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of connection a provider exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    OpenAiCompatible,
    CliSubprocess,
    Ollama,
}

/// Current health status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Healthy,
    Degraded,
    Cooldown,
    Offline,
}

/// Why a provider entered cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownReason {
    RateLimit,
    Quota,
    Auth,
    Maintenance,
    Error,
}

/// Active cooldown record on a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub until: DateTime<Utc>,
    pub reason: CooldownReason,
    pub started_at: DateTime<Utc>,
}

/// An action kind the Router resolves a provider for (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Chat,
    Tools,
    Embeddings,
    Summary,
    Subagent,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Tools => "tools",
            Self::Embeddings => "embeddings",
            Self::Summary => "summary",
            Self::Subagent => "subagent",
        }
    }
}

/// Candidate grouping used by the priority-ordering function (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderGroup {
    Configured,
    Local,
    Discovered,
}

/// Rolling request statistics over the last 100 requests (§5 resource limits).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStats {
    pub request_count: u64,
    pub error_count: u64,
    pub success_count: u64,
    #[serde(skip)]
    pub recent_response_times_ms: VecDeque<u64>,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Maximum rolling history length for request timestamps (§5).
pub const ROLLING_HISTORY_LEN: usize = 100;
/// Averaging window for response time (§4.3, §5).
pub const AVERAGING_WINDOW_LEN: usize = 20;

impl ProviderStats {
    pub fn record_success(&mut self, response_time_ms: u64) {
        self.request_count += 1;
        self.success_count += 1;
        self.last_request_at = Some(Utc::now());
        self.recent_response_times_ms.push_back(response_time_ms);
        if self.recent_response_times_ms.len() > ROLLING_HISTORY_LEN {
            self.recent_response_times_ms.pop_front();
        }
    }

    pub fn record_error(&mut self) {
        self.request_count += 1;
        self.error_count += 1;
        let now = Utc::now();
        self.last_request_at = Some(now);
        self.last_error_at = Some(now);
    }

    /// Error rate as a percentage over all recorded requests.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            (self.error_count as f64 / self.request_count as f64) * 100.0
        }
    }

    /// Average response time over the last `AVERAGING_WINDOW_LEN` successes.
    pub fn avg_response_time_ms(&self) -> f64 {
        let window: Vec<_> = self
            .recent_response_times_ms
            .iter()
            .rev()
            .take(AVERAGING_WINDOW_LEN)
            .copied()
            .collect();
        if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<u64>() as f64 / window.len() as f64
        }
    }
}

/// A configured LLM backend descriptor (§3 Provider Handle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub id: String,
    pub display_name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub group: ProviderGroup,
    pub status: ProviderStatus,
    pub stats: ProviderStats,
    pub cooldown: Option<CooldownRecord>,
    pub healthy_since: Option<DateTime<Utc>>,
    /// Configured fallback for actions this provider cannot serve (§4.3 router fallback).
    pub parent: Option<String>,
    /// Action kinds this provider can directly serve.
    pub supported_actions: Vec<ActionKind>,
}

impl ProviderHandle {
    pub fn supports(&self, action: ActionKind) -> bool {
        self.supported_actions.contains(&action)
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        match &self.cooldown {
            Some(record) => record.until > now,
            None => false,
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.stats.error_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_computation() {
        let mut stats = ProviderStats::default();
        for _ in 0..3 {
            stats.record_success(100);
        }
        stats.record_error();
        assert!((stats.error_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn avg_response_time_windowed() {
        let mut stats = ProviderStats::default();
        for i in 1..=25u64 {
            stats.record_success(i * 10);
        }
        // last 20 of 1..=25 (*10) => 6..=25 *10, average = (60+250)/2=155
        let avg = stats.avg_response_time_ms();
        assert!((avg - 155.0).abs() < 1.0);
    }
}
