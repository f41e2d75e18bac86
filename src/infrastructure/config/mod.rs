//! Layered configuration: defaults, overridden by a TOML file, overridden by
//! environment variables (§6 configuration precedence).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Top-level configuration tree. Every section has a standalone `Default`
/// impl so a missing `coreloop.toml` still yields a runnable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lanes: LaneConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub event_store: EventStoreSettings,
    pub scheduler: SchedulerSettings,
    pub providers: Vec<ProviderSettings>,
    pub restart: RestartSettings,
    pub task_defaults: TaskDefaultsConfig,
    pub supervisor: SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lanes: LaneConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            event_store: EventStoreSettings::default(),
            scheduler: SchedulerSettings::default(),
            providers: Vec::new(),
            restart: RestartSettings::default(),
            task_defaults: TaskDefaultsConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Task defaults (§5 Resource limits "Configuration-accepted options").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaultsConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_multiplier: u32,
    pub retry_backoff_cap_ms: u64,
    pub registry_cache_ttl_ms: u64,
}

impl Default for TaskDefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            retry_backoff_multiplier: 2,
            retry_backoff_cap_ms: 60_000,
            registry_cache_ttl_ms: 45_000,
        }
    }
}

/// Supervisor Loop settings (§4.8, "Supervisor:" options).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub enabled: bool,
    pub cycle_interval_ms: u64,
    pub owner_channel: Option<String>,
    pub duties_file: String,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_interval_ms: crate::services::supervisor::DEFAULT_CYCLE_INTERVAL_MS,
            owner_channel: None,
            duties_file: "AGENT_DUTIES.md".to_string(),
            max_attempts: 3,
            retry_backoff_ms: 1000,
            timeout_ms: 120_000,
        }
    }
}

/// Per-lane concurrency caps (§5 Resource limits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub main_max_concurrent: u32,
    pub autonomous_max_concurrent: u32,
    pub maintenance_max_concurrent: u32,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self { main_max_concurrent: 1, autonomous_max_concurrent: 5, maintenance_max_concurrent: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub state_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://.coreloop/events.db".to_string(), state_dir: ".coreloop/state".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), log_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStoreSettings {
    pub retention_days: i64,
    pub cleanup_on_startup: bool,
    pub cleanup_interval_hours: i64,
}

impl Default for EventStoreSettings {
    fn default() -> Self {
        Self { retention_days: 30, cleanup_on_startup: false, cleanup_interval_hours: 24 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub retry_on_failure: bool,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_on_failure: true,
            max_retries: 3,
            retry_base_backoff_ms: 1000,
            max_retry_backoff_ms: 60_000,
        }
    }
}

/// Statically configured provider entries (§3 Provider Group `configured`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub id: String,
    pub display_name: String,
    pub kind: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSettings {
    pub end_wait_default_ms: u64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self { end_wait_default_ms: 15_000 }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads `<path>` if given, else `coreloop.toml` if present, else defaults.
    /// Environment variables always apply last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Path::new("coreloop.toml");
        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CORELOOP_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("CORELOOP_STATE_DIR") {
            self.database.state_dir = val;
        }
        if let Ok(val) = std::env::var("CORELOOP_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CORELOOP_LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = std::env::var("CORELOOP_AUTONOMOUS_MAX_CONCURRENT") {
            if let Ok(v) = val.parse() {
                self.lanes.autonomous_max_concurrent = v;
            }
        }
    }
}
