//! Engine configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the lifecycle engine.
///
/// Every field has a default so a partial TOML file (or none at all) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retries after the first failed create/delete attempt (0 = no retry)
    pub action_retry_limit: u32,
    /// Upper bound of the random jitter added to each backoff, in seconds
    pub jitter_max: f64,
    /// Multiplier applied to the `2^attempt` backoff, in seconds
    pub backoff_scale: f64,
    /// Check property values (types and constraints) during validation
    pub strict_validate: bool,
    /// Interval between `check_complete` polls
    pub poll_interval_ms: u64,
    /// Interval between re-reads of a paused hook
    pub hook_poll_interval_ms: u64,
    /// Global cap on generated physical names, overriding per-type limits
    pub physical_name_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_retry_limit: 5,
            jitter_max: 2.0,
            backoff_scale: 1.0,
            strict_validate: true,
            poll_interval_ms: 1000,
            hook_poll_interval_ms: 1000,
            physical_name_limit: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document, filling missing keys with defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Configuration that never retries and never waits. Used by tests and
    /// dry runs.
    pub fn immediate() -> Self {
        Self {
            action_retry_limit: 0,
            jitter_max: 0.0,
            poll_interval_ms: 0,
            hook_poll_interval_ms: 0,
            ..Default::default()
        }
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.action_retry_limit = limit;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn hook_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hook_poll_interval_ms)
    }
}
