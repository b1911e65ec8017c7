// Copyright (c) 2026 Taskweave
// SPDX-License-Identifier: AGPL-3.0
//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::application::delay_scheduler::DelaySchedulerConfig;
use crate::infrastructure::job_queue::RetryPolicy;

/// Top-level configuration for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: DelaySchedulerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Event bus buffer size before lagging subscribers drop events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: DelaySchedulerConfig::default(),
            retry: RetryPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.scheduler.interval_seconds, 60);
        assert!(config.scheduler.enabled);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.event_capacity, 1000);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"scheduler": {"interval_seconds": 5, "tick_lock_ttl_seconds": 4, "enabled": true}}"#)
                .unwrap();
        assert_eq!(config.scheduler.interval_seconds, 5);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
