//! In-memory metrics sink.
//!
//! Keeps every call so a dry run can print a report and tests can assert on
//! what was emitted.

use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::KeyValue;
use parking_lot::Mutex;

use crate::metrics::{split_tags, MetricsError, MetricsSink};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedMetric {
    Count {
        name: String,
        value: u64,
        tags: Vec<(String, String)>,
    },
    Gauge {
        name: String,
        value: f64,
        tags: Vec<(String, String)>,
    },
}

impl RecordedMetric {
    pub fn name(&self) -> &str {
        match self {
            RecordedMetric::Count { name, .. } | RecordedMetric::Gauge { name, .. } => name,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        let tags = match self {
            RecordedMetric::Count { tags, .. } | RecordedMetric::Gauge { tags, .. } => tags,
        };
        tags.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<RecordedMetric>>,
    rejecting: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`MetricsError::Rejected`].
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::Relaxed);
    }

    pub fn samples(&self) -> Vec<RecordedMetric> {
        self.samples.lock().clone()
    }

    pub fn take(&self) -> Vec<RecordedMetric> {
        std::mem::take(&mut *self.samples.lock())
    }

    /// Sum of every count recorded under `name`.
    pub fn total_count(&self, name: &str) -> u64 {
        self.samples
            .lock()
            .iter()
            .filter_map(|m| match m {
                RecordedMetric::Count { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .sum()
    }

    /// Sum of counts under `name` carrying the tag `key=value`.
    pub fn count_tagged(&self, name: &str, key: &str, value: &str) -> u64 {
        self.samples
            .lock()
            .iter()
            .filter(|m| m.name() == name && m.tag(key) == Some(value))
            .filter_map(|m| match m {
                RecordedMetric::Count { value, .. } => Some(*value),
                _ => None,
            })
            .sum()
    }

    pub fn last_gauge(&self, name: &str) -> Option<f64> {
        self.samples.lock().iter().rev().find_map(|m| match m {
            RecordedMetric::Gauge { name: n, value, .. } if n == name => Some(*value),
            _ => None,
        })
    }

    fn check(&self, name: &str) -> Result<(), MetricsError> {
        if self.rejecting.load(Ordering::Relaxed) {
            return Err(MetricsError::Rejected {
                name: name.to_owned(),
                reason: "sink is rejecting".into(),
            });
        }
        Ok(())
    }
}

impl MetricsSink for RecordingSink {
    fn count(&self, name: &str, value: u64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        self.check(name)?;
        let (keys, values) = split_tags(tags);
        self.samples.lock().push(RecordedMetric::Count {
            name: name.to_owned(),
            value,
            tags: keys.into_iter().zip(values).collect(),
        });
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[KeyValue]) -> Result<(), MetricsError> {
        self.check(name)?;
        let (keys, values) = split_tags(tags);
        self.samples.lock().push(RecordedMetric::Gauge {
            name: name.to_owned(),
            value,
            tags: keys.into_iter().zip(values).collect(),
        });
        Ok(())
    }
}
