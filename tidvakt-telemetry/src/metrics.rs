//! ## tidvakt-telemetry::metrics
//! **Metrics sink contract and Prometheus exporter**
//!
//! The monitor and the reorderer relay only ever talk to [`MetricsSink`].
//! [`PrometheusSink`] registers one vector per metric name on first use and
//! keys its labels on the tag keys of that first call.

use std::collections::HashMap;

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Metric names emitted by the ingestion path, relative to the configured
/// namespace.
pub mod names {
    pub const EVENTS_WRITE: &str = "perf_buffer.events.write";
    pub const BYTES_WRITE: &str = "perf_buffer.bytes.write";
    pub const EVENTS_LOST: &str = "perf_buffer.events.lost";
    pub const EVENTS_READ: &str = "perf_buffer.events.read";
    pub const BYTES_READ: &str = "perf_buffer.bytes.read";
    pub const LOST_USER: &str = "perf_buffer.lost_user";
    pub const SORTING_ERROR: &str = "perf_buffer.sorting_error";
    pub const RING_USAGE: &str = "ring_buffer.usage";
    pub const QUEUE_SIZE: &str = "reorderer.queue_size";
    pub const AVG_OP_DEPTH: &str = "reorderer.avg_op_depth";

    /// Joins a namespace and a metric name with a dot.
    pub fn qualified(namespace: &str, name: &str) -> String {
        if namespace.is_empty() {
            name.to_owned()
        } else {
            format!("{namespace}.{name}")
        }
    }
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metric {name} rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Exposition encoding failed: {0}")]
    Encoding(String),
}

/// Destination for counters and gauges.
///
/// An error from either call aborts the reporting cycle that issued it.
pub trait MetricsSink: Send + Sync {
    fn count(&self, name: &str, value: u64, tags: &[KeyValue]) -> Result<(), MetricsError>;

    fn gauge(&self, name: &str, value: f64, tags: &[KeyValue]) -> Result<(), MetricsError>;
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn count(&self, name: &str, value: u64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        (**self).count(name, value, tags)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        (**self).gauge(name, value, tags)
    }
}

#[derive(Default)]
pub struct PrometheusSink {
    pub registry: Registry,
    counters: Mutex<HashMap<String, IntCounterVec>>,
    gauges: Mutex<HashMap<String, GaugeVec>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders every registered metric in the text exposition format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    fn counter(&self, name: &str, label_names: &[&str]) -> Result<IntCounterVec, MetricsError> {
        let mut counters = self.counters.lock();
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }
        let counter = IntCounterVec::new(Opts::new(sanitize(name), name.to_owned()), label_names)?;
        self.registry.register(Box::new(counter.clone()))?;
        counters.insert(name.to_owned(), counter.clone());
        Ok(counter)
    }

    fn gauge_vec(&self, name: &str, label_names: &[&str]) -> Result<GaugeVec, MetricsError> {
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }
        let gauge = GaugeVec::new(Opts::new(sanitize(name), name.to_owned()), label_names)?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(name.to_owned(), gauge.clone());
        Ok(gauge)
    }
}

impl MetricsSink for PrometheusSink {
    fn count(&self, name: &str, value: u64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        let (keys, values) = split_tags(tags);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        self.counter(name, &keys)?
            .get_metric_with_label_values(&values)?
            .inc_by(value);
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        let (keys, values) = split_tags(tags);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        self.gauge_vec(name, &keys)?
            .get_metric_with_label_values(&values)?
            .set(value);
        Ok(())
    }
}

/// Splits tags into parallel key and value lists.
pub(crate) fn split_tags(tags: &[KeyValue]) -> (Vec<String>, Vec<String>) {
    tags.iter()
        .map(|kv| (kv.key.as_str().to_owned(), kv.value.as_str().into_owned()))
        .unzip()
}

/// Prometheus names only allow `[a-zA-Z0-9_:]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ':' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label_set() {
        let sink = PrometheusSink::new();
        let tags = [KeyValue::new("map", "events"), KeyValue::new("cpu", 0i64)];
        sink.count("tidvakt.perf_buffer.events.read", 3, &tags).unwrap();
        sink.count("tidvakt.perf_buffer.events.read", 4, &tags).unwrap();

        let text = sink.gather().unwrap();
        assert!(text.contains("tidvakt_perf_buffer_events_read{cpu=\"0\",map=\"events\"} 7"));
    }

    #[test]
    fn gauges_keep_last_value() {
        let sink = PrometheusSink::new();
        sink.gauge("tidvakt.reorderer.queue_size", 12.0, &[]).unwrap();
        sink.gauge("tidvakt.reorderer.queue_size", 5.0, &[]).unwrap();
        assert!(sink.gather().unwrap().contains("tidvakt_reorderer_queue_size 5"));
    }

    #[test]
    fn label_mismatch_is_an_error() {
        let sink = PrometheusSink::new();
        sink.count("tidvakt.x", 1, &[KeyValue::new("map", "events")]).unwrap();
        assert!(sink.count("tidvakt.x", 1, &[]).is_err());
    }

    #[test]
    fn qualified_names() {
        assert_eq!(names::qualified("tidvakt", names::QUEUE_SIZE), "tidvakt.reorderer.queue_size");
        assert_eq!(names::qualified("", names::QUEUE_SIZE), "reorderer.queue_size");
    }
}
