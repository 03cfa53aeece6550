//! Queue configuration.
//!
//! Loaded from a JSON document (missing fields take defaults) and/or from
//! `REPLAY_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_MAX_ATTEMPTS, QueueError};

pub const ENV_QUEUE_NAME: &str = "REPLAY_QUEUE_NAME";
pub const ENV_MAX_ATTEMPTS: &str = "REPLAY_MAX_ATTEMPTS";
pub const ENV_AUTO_PROCESS: &str = "REPLAY_AUTO_PROCESS";
pub const ENV_SCHEDULE_DELAY_MS: &str = "REPLAY_SCHEDULE_DELAY_MS";
pub const ENV_KEY_PREFIX: &str = "REPLAY_KEY_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Logical queue name; one manager instance per name.
    pub queue_name: String,

    /// Used when `enqueue` is called without an explicit ceiling.
    pub default_max_attempts: u32,

    /// Schedule a processing run after `enqueue` when online.
    pub auto_process: bool,

    /// Delay before an auto-scheduled run starts. 0 means a single yield.
    pub schedule_delay_ms: u64,

    /// Storage key is `{key_prefix}{queue_name}`.
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            auto_process: true,
            schedule_delay_ms: 0,
            key_prefix: "replay.queue.".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Self::default()
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}", self.key_prefix, self.queue_name)
    }

    pub fn from_json_str(s: &str) -> Result<Self, QueueError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| QueueError::Config(format!("json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, QueueError> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Override fields from a variable lookup (the environment, or a map in tests).
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, QueueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_QUEUE_NAME) {
            self.queue_name = v;
        }
        if let Some(v) = lookup(ENV_MAX_ATTEMPTS) {
            self.default_max_attempts = parse(ENV_MAX_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(ENV_AUTO_PROCESS) {
            self.auto_process = parse_bool(ENV_AUTO_PROCESS, &v)?;
        }
        if let Some(v) = lookup(ENV_SCHEDULE_DELAY_MS) {
            self.schedule_delay_ms = parse(ENV_SCHEDULE_DELAY_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_KEY_PREFIX) {
            self.key_prefix = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.queue_name.trim().is_empty() {
            return Err(QueueError::Config("queue_name must not be empty".to_string()));
        }
        if self.default_max_attempts == 0 {
            return Err(QueueError::Config(
                "default_max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, QueueError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QueueError::Config(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, QueueError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(QueueError::Config(format!("{key}={value:?}: expected a boolean"))),
    }
}
