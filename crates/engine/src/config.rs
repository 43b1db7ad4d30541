//! Engine configuration.
//!
//! Process-wide defaults come from [`EngineConfig`] (usually a TOML file);
//! each run may override them through the `config` map passed to
//! [`crate::WorkflowExecutor::execute`], and each node may override the
//! timeout and retry limit through its own `config`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::EngineError;

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on nodes executed in one run (cycles included).
    pub max_steps: u32,
    /// Deadline for a single capability call.
    pub step_timeout_ms: u64,
    /// Retries after a retryable step failure. `0` disables retry.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            step_timeout_ms: 30_000,
            max_retries: 0,
            retry_base_delay_ms: 100,
        }
    }
}

/// Per-node keys read by the engine.
pub const NODE_TIMEOUT_KEY: &str = "timeout_ms";
pub const NODE_MAX_RETRIES_KEY: &str = "max_retries";

/// Read `key` from `map` as a `u64`, warning about wrongly typed values.
pub(crate) fn read_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = map.get(key)?;
    let parsed = value.as_u64();
    if parsed.is_none() {
        warn!(key, %value, "ignoring non-integer config value");
    }
    parsed
}

fn read_u32(map: &Map<String, Value>, key: &str) -> Option<u32> {
    read_u64(map, key).map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

impl EngineConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(s)?)
    }

    /// A copy with the known keys of a per-run config map applied.
    /// Unknown keys are ignored.
    pub fn with_overrides(&self, run: &Map<String, Value>) -> Self {
        Self {
            max_steps: read_u32(run, "max_steps").unwrap_or(self.max_steps),
            step_timeout_ms: read_u64(run, "step_timeout_ms").unwrap_or(self.step_timeout_ms),
            max_retries: read_u32(run, "max_retries").unwrap_or(self.max_retries),
            retry_base_delay_ms: read_u64(run, "retry_base_delay_ms").unwrap_or(self.retry_base_delay_ms),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Timeout for a node, honouring its `timeout_ms` override.
    pub fn node_timeout(&self, node_config: &Map<String, Value>) -> Duration {
        read_u64(node_config, NODE_TIMEOUT_KEY)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.step_timeout())
    }

    /// Retry limit for a node, honouring its `max_retries` override.
    pub fn node_max_retries(&self, node_config: &Map<String, Value>) -> u32 {
        read_u32(node_config, NODE_MAX_RETRIES_KEY).unwrap_or(self.max_retries)
    }
}
