//! Ingestion monitor configuration.
//!
//! Defines the reporting cadence, loss alerting and the event type table
//! used to label per-event-type counters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MonitorConfig {
    /// Period of the statistics report (milliseconds).
    #[validate(range(min = 100, max = 3600000))]
    #[serde(default = "default_stats_interval")]
    pub stats_interval_ms: u64,

    /// Lost records per map and report above which an alert is raised.
    #[validate(range(min = 1))]
    #[serde(default = "default_loss_alert_threshold")]
    pub loss_alert_threshold: u64,

    /// Event type names, indexed by the event type id on the wire.
    #[validate(custom(function = validation::validate_event_types))]
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,

    /// Suffix appended to a map name to find its kernel statistics table.
    #[serde(default = "default_stats_table_suffix")]
    pub stats_table_suffix: String,

    /// CPU count used to size the counter tables. Defaults to the host's.
    #[validate(range(min = 1, max = 4096))]
    #[serde(default = "default_num_cpus")]
    pub num_cpus: usize,
}

fn default_stats_interval() -> u64 {
    10_000
}

fn default_loss_alert_threshold() -> u64 {
    1
}

fn default_event_types() -> Vec<String> {
    [
        "unknown", "exec", "fork", "exit", "open", "mkdir", "rmdir", "unlink", "rename", "chmod",
        "chown", "link", "mount", "umount", "bind", "dns",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_stats_table_suffix() -> String {
    "_stats".into()
}

fn default_num_cpus() -> usize {
    num_cpus::get()
}

impl MonitorConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Name of the kernel statistics table backing `map`.
    pub fn stats_table_for(&self, map: &str) -> String {
        format!("{map}{}", self.stats_table_suffix)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_stats_interval(),
            loss_alert_threshold: default_loss_alert_threshold(),
            event_types: default_event_types(),
            stats_table_suffix: default_stats_table_suffix(),
            num_cpus: default_num_cpus(),
        }
    }
}
