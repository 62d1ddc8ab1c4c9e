//! Reordering engine configuration.
//!
//! Bounds the reordering latency and memory of the per-CPU ingestion path:
//! - Submission queue sizing (the backpressure point)
//! - Generation tick and retention window
//! - Heap shrink policy and metric sampling

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ReordererConfig {
    /// Capacity of the submission queue. The heap bypass triggers once the
    /// heap holds ten times this many records.
    #[serde(default = "default_queue_size")]
    #[validate(range(min = 1, max = 1048576))]
    pub queue_size: usize,

    /// Period of the generation tick (milliseconds).
    #[serde(default = "default_flush_interval")]
    #[validate(range(min = 1, max = 60000))]
    pub flush_interval_ms: u64,

    /// Number of generations a record is held before release.
    #[serde(default = "default_retention")]
    #[validate(range(max = 1000))]
    pub retention: u64,

    /// Period of the operational metric sample (milliseconds).
    #[serde(default = "default_metric_interval")]
    #[validate(range(min = 1, max = 3600000))]
    pub metric_interval_ms: u64,

    /// Spare heap capacity above which the backing array is reallocated.
    #[serde(default = "default_heap_shrink_delta")]
    pub heap_shrink_delta: usize,
}

fn default_queue_size() -> usize {
    10_000
}

fn default_flush_interval() -> u64 {
    50
}

fn default_retention() -> u64 {
    5
}

fn default_metric_interval() -> u64 {
    5_000
}

fn default_heap_shrink_delta() -> usize {
    1_000
}

impl ReordererConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn metric_interval(&self) -> Duration {
        Duration::from_millis(self.metric_interval_ms)
    }
}

impl Default for ReordererConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            flush_interval_ms: default_flush_interval(),
            retention: default_retention(),
            metric_interval_ms: default_metric_interval(),
            heap_shrink_delta: default_heap_shrink_delta(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ReordererConfig::default();
        config.validate().expect("Default reorderer config should be valid");
        assert_eq!(config.flush_interval(), Duration::from_millis(50));
    }

    #[test]
    fn zero_queue_is_rejected() {
        let config = ReordererConfig {
            queue_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
