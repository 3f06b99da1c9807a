//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `CHASM_*` environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::infrastructure::ollama::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL};
use crate::use_cases::simulation::SchedulerConfig;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "server.toml";

/// Prefix of environment overrides, e.g. `CHASM_TICK_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "CHASM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectPolicyKind {
    RoundRobin,
    PendingInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    Wander,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend: "memory" or "sqlite"
    pub storage: StorageBackend,
    /// SQLite database path (if using the sqlite backend)
    pub sqlite_path: String,

    /// Pause between simulation ticks
    pub tick_interval_ms: u64,
    /// Upper bound on one behavior decision
    pub decision_timeout_ms: u64,
    /// Turns running at once within a tick
    pub max_concurrent_turns: usize,
    /// Actor selection: "round-robin" or "pending-input"
    pub select_policy: SelectPolicyKind,
    /// Characters per round-robin tick, 0 for all
    pub batch_size: usize,

    /// Behavior collaborator: "wander" or "llm"
    pub behavior: BehaviorKind,
    /// Fixed seed for the wander behavior's dice; unset draws from the OS
    pub wander_seed: Option<u64>,
    /// Ollama API base URL (OpenAI-compatible)
    pub ollama_base_url: String,
    /// Model for LLM decisions
    pub ollama_model: String,
    /// Narrative entries given to the behavior as context
    pub narrative_context_entries: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            storage: StorageBackend::Sqlite,
            sqlite_path: "./data/world.db".to_string(),
            tick_interval_ms: duration_ms(scheduler.tick_interval),
            decision_timeout_ms: duration_ms(scheduler.decision_timeout),
            max_concurrent_turns: scheduler.max_concurrent_turns,
            select_policy: SelectPolicyKind::RoundRobin,
            batch_size: 0,
            behavior: BehaviorKind::Wander,
            wander_seed: None,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            narrative_context_entries: scheduler.recent_entries,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AppConfig {
    /// Load from defaults, a TOML file and the process environment.
    ///
    /// An explicit `path` must exist; the default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_turns == 0 {
            return Err(ConfigError::Message(
                "max_concurrent_turns must be at least 1".to_string(),
            ));
        }
        if self.decision_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "decision_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.storage == StorageBackend::Sqlite && self.sqlite_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "sqlite_path is required for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            decision_timeout: Duration::from_millis(self.decision_timeout_ms),
            max_concurrent_turns: self.max_concurrent_turns,
            recent_entries: self.narrative_context_entries,
        }
    }

    /// One parsed setting as text, `None` for an unknown key.
    pub fn get(&self, param: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        match value.get(param)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
