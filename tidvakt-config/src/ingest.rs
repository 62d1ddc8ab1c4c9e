//! Event ingestion configuration.
//!
//! Selects and sizes the front end that drains kernel event buffers:
//! - Per-CPU perf buffers (reordered in user space)
//! - A single shared ring buffer (already globally ordered)

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct IngestConfig {
    /// Use the shared ring buffer instead of per-CPU perf buffers.
    #[serde(default)]
    pub use_ring_buffer: bool,

    /// Name of the event map the probe writes to.
    #[validate(custom(function = validation::validate_map_name))]
    #[serde(default = "default_events_map")]
    pub events_map: String,

    /// Pages per CPU for perf buffers.
    #[validate(range(min = 1, max = 65536))]
    #[validate(custom(function = validation::validate_power_of_two))]
    #[serde(default = "default_perf_buffer_pages")]
    pub perf_buffer_pages: usize,

    /// Ring buffer size in bytes.
    #[validate(range(min = 4096, max = 1073741824))]
    #[validate(custom(function = validation::validate_power_of_two))]
    #[serde(default = "default_ring_buffer_size", deserialize_with = "deserialize_size")]
    pub ring_buffer_size: usize,

    /// Upper bound on record buffers retained by the pool.
    #[validate(range(min = 16, max = 1048576))]
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Initial capacity of a freshly allocated record buffer (bytes).
    #[validate(range(min = 16, max = 65536))]
    #[serde(default = "default_record_size")]
    pub record_size: usize,

    /// Depth of the ring buffer dispatch queue.
    #[validate(range(min = 1, max = 1048576))]
    #[serde(default = "default_dispatch_queue_size")]
    pub dispatch_queue_size: usize,

    /// CPU the dispatch worker is pinned to, if any.
    #[serde(default)]
    pub dispatch_cpu: Option<usize>,

    /// Nice value requested for the dispatch worker.
    #[validate(range(min = -20, max = 19))]
    #[serde(default = "default_dispatch_priority")]
    pub dispatch_priority: i32,
}

fn default_events_map() -> String {
    "events".into()
}

fn default_perf_buffer_pages() -> usize {
    256
}

fn default_ring_buffer_size() -> usize {
    4 * 1024 * 1024
}

fn default_pool_capacity() -> usize {
    4096
}

fn default_record_size() -> usize {
    512
}

fn default_dispatch_queue_size() -> usize {
    4096
}

fn default_dispatch_priority() -> i32 {
    -10
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Custom deserializer to allow human‑friendly sizes (e.g. "4MiB") or direct numbers.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

pub(crate) fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(split);
    let number: f64 = num_part
        .parse()
        .map_err(|e| format!("invalid size {s:?}: {e}"))?;
    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "kb" | "kib" | "k" => 1024.0,
        "mb" | "mib" | "m" => 1024.0 * 1024.0,
        "gb" | "gib" | "g" => 1024.0 * 1024.0 * 1024.0,
        "" => 1.0,
        other => return Err(format!("unknown size unit {other:?}")),
    };
    Ok((number * multiplier) as usize)
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            use_ring_buffer: false,
            events_map: default_events_map(),
            perf_buffer_pages: default_perf_buffer_pages(),
            ring_buffer_size: default_ring_buffer_size(),
            pool_capacity: default_pool_capacity(),
            record_size: default_record_size(),
            dispatch_queue_size: default_dispatch_queue_size(),
            dispatch_cpu: None,
            dispatch_priority: default_dispatch_priority(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(parse_size("4MiB").unwrap(), 4 * 1024 * 1024);
        assert_eq!(parse_size("256 kb").unwrap(), 256 * 1024);
        assert_eq!(parse_size("8192").unwrap(), 8192);
        assert!(parse_size("12 parsecs").is_err());
    }

    #[test]
    fn ring_size_must_be_power_of_two() {
        let config = IngestConfig {
            ring_buffer_size: 3 * 4096,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn perf_pages_must_be_power_of_two() {
        assert!(IngestConfig::default().validate().is_ok());
        let config = IngestConfig {
            perf_buffer_pages: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_map_name_is_rejected() {
        let config = IngestConfig {
            events_map: "events-map".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
