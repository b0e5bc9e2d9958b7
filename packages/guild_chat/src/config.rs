use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connection::BackoffPolicy;

/// Top-level tunables, deserialized from defaults / config file / env vars.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Reconnect tunables (lives under `[connection]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Reconnect attempts before giving up and reporting `disconnected`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fraction of each delay that may be randomised away (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: default_max_retries(),
            jitter: default_jitter(),
        }
    }
}

impl ConnectionConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            max_retries: self.max_retries,
            jitter: self.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Thread registry tunables (lives under `[registry]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Recently-seen message ids remembered per thread for dedup
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

/// Queue sizes for the session actor (lives under `[session]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_intent_queue_capacity")]
    pub intent_queue_capacity: usize,
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            intent_queue_capacity: default_intent_queue_capacity(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60_000
}
fn default_max_retries() -> u32 {
    8
}
fn default_jitter() -> f64 {
    0.2
}
fn default_dedup_capacity() -> usize {
    512
}
fn default_intent_queue_capacity() -> usize {
    256
}
fn default_command_queue_capacity() -> usize {
    32
}
