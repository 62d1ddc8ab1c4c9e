//! Monitor Module
//!
//! Counts what user space receives, mirrors what the kernel reports writing
//! and turns both into metrics on every [`IngestMonitor::send_stats`] call.
//!
//! Hot-path calls ([`count_event`](IngestMonitor::count_event),
//! [`count_lost`](IngestMonitor::count_lost)) only touch atomics and return
//! silently on unknown maps or out-of-range indices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::KeyValue;
use tidvakt_capture::{RingUsage, StatsTable};
use tidvakt_config::MonitorConfig;
use tidvakt_telemetry::metrics::{names, MetricsSink};
use tracing::{debug, trace, warn};

use crate::error::MonitorError;
use crate::stats::MapCounters;
use crate::usage::{size_bucket, utilisation};

/// Called with `(map, lost)` when a map's kernel-side losses for one
/// collection reach the alert threshold.
pub type LossAlert = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// A buffer the monitor keeps counters for.
pub struct MonitoredMap {
    pub name: String,
    pub stats_table: Option<Arc<dyn StatsTable>>,
    /// Ring size in bytes, set for shared ring buffers.
    pub ring_size: Option<usize>,
}

impl MonitoredMap {
    pub fn perf(name: impl Into<String>, stats_table: Option<Arc<dyn StatsTable>>) -> Self {
        Self {
            name: name.into(),
            stats_table,
            ring_size: None,
        }
    }

    pub fn ring(
        name: impl Into<String>,
        size: usize,
        stats_table: Option<Arc<dyn StatsTable>>,
    ) -> Self {
        Self {
            name: name.into(),
            stats_table,
            ring_size: Some(size),
        }
    }
}

struct MapEntry {
    map: MonitoredMap,
    counters: MapCounters,
}

struct MetricNames {
    events_write: String,
    bytes_write: String,
    events_lost: String,
    events_read: String,
    bytes_read: String,
    lost_user: String,
    sorting_error: String,
    ring_usage: String,
}

impl MetricNames {
    fn new(namespace: &str) -> Self {
        let q = |name| names::qualified(namespace, name);
        Self {
            events_write: q(names::EVENTS_WRITE),
            bytes_write: q(names::BYTES_WRITE),
            events_lost: q(names::EVENTS_LOST),
            events_read: q(names::EVENTS_READ),
            bytes_read: q(names::BYTES_READ),
            lost_user: q(names::LOST_USER),
            sorting_error: q(names::SORTING_ERROR),
            ring_usage: q(names::RING_USAGE),
        }
    }
}

pub struct IngestMonitor {
    entries: Vec<MapEntry>,
    index: HashMap<String, usize>,
    event_types: Vec<String>,
    num_cpus: usize,
    last_timestamp: AtomicU64,
    sink: Arc<dyn MetricsSink>,
    names: MetricNames,
    usage: Option<Arc<dyn RingUsage>>,
    loss_alert: Option<LossAlert>,
    loss_threshold: u64,
}

impl IngestMonitor {
    pub fn new(config: &MonitorConfig, namespace: &str, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            event_types: config.event_types.clone(),
            num_cpus: config.num_cpus,
            last_timestamp: AtomicU64::new(0),
            sink,
            names: MetricNames::new(namespace),
            usage: None,
            loss_alert: None,
            loss_threshold: config.loss_alert_threshold.max(1),
        }
    }

    pub fn with_map(mut self, map: MonitoredMap) -> Self {
        let counters = MapCounters::new(self.num_cpus, self.event_types.len());
        self.index.insert(map.name.clone(), self.entries.len());
        self.entries.push(MapEntry { map, counters });
        self
    }

    pub fn with_usage_query(mut self, usage: Arc<dyn RingUsage>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_loss_alert(mut self, alert: LossAlert) -> Self {
        self.loss_alert = Some(alert);
        self
    }

    pub fn maps(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.map.name.as_str())
    }

    fn counters(&self, map: &str) -> Option<&MapCounters> {
        self.index
            .get(map)
            .and_then(|&i| self.entries.get(i))
            .map(|e| &e.counters)
    }

    fn event_type_name(&self, event_type: usize) -> &str {
        self.event_types
            .get(event_type)
            .map_or("unknown", String::as_str)
    }

    /// Accounts `count` records of `size` bytes received from `map` on `cpu`
    /// and checks `timestamp` against the latest one seen.
    pub fn count_event(
        &self,
        event_type: u32,
        timestamp: u64,
        count: u64,
        size: u64,
        map: &str,
        cpu: u32,
    ) {
        let Some(counters) = self.counters(map) else {
            return;
        };
        let (cpu, event_type) = (cpu as usize, event_type as usize);
        let Some(slot) = counters.user(cpu, event_type) else {
            return;
        };
        slot.add(count, size);

        let previous = self.last_timestamp.fetch_max(timestamp, Ordering::Relaxed);
        if previous != 0 && timestamp < previous {
            if let Some(errors) = counters.sorting_errors(event_type) {
                errors.fetch_add(1, Ordering::Relaxed);
            }
            trace!(map, timestamp, previous, "sorting violation");
        }
    }

    /// Accounts records a reader reported as dropped.
    pub fn count_lost(&self, count: u64, map: &str, cpu: u32) {
        if let Some(lost) = self.counters(map).and_then(|c| c.user_lost(cpu as usize)) {
            lost.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Returns and resets the reader-reported losses of `map`, for one CPU or
    /// summed over all of them.
    pub fn get_and_reset_lost_count(&self, map: &str, cpu: Option<u32>) -> u64 {
        self.counters(map)
            .map_or(0, |c| c.take_user_lost(cpu.map(|c| c as usize)))
    }

    /// Sorting violations recorded for `(map, event_type)` since the last
    /// report.
    pub fn sorting_errors(&self, map: &str, event_type: u32) -> u64 {
        self.counters(map)
            .and_then(|c| c.sorting_errors(event_type as usize))
            .map_or(0, |e| e.load(Ordering::Relaxed))
    }

    /// Reads every kernel statistics table, emits the write-side deltas and
    /// raises loss alerts. Ring buffer fill levels are reported here too.
    ///
    /// All tables and ring fill levels are read before anything is emitted,
    /// so a failed lookup leaves every snapshot where it was. A snapshot
    /// advances only once its deltas went out.
    pub fn collect_kernel_stats(&self) -> Result<(), MonitorError> {
        let mut reads = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = entry.map.name.as_str();
            let rows = match &entry.map.stats_table {
                Some(table) => (0..self.event_types.len())
                    .map(|event_type| table.lookup(event_type as u32))
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            let fill = match (entry.map.ring_size, &self.usage) {
                (Some(size), Some(usage)) => Some((size, usage.ring_usage(name)?)),
                _ => None,
            };
            reads.push((entry, rows, fill));
        }

        for (entry, rows, fill) in reads {
            let name = entry.map.name.as_str();
            let mut map_lost = 0u64;
            for (event_type, per_cpu) in rows.iter().enumerate() {
                for (cpu, sample) in per_cpu.iter().enumerate() {
                    let Some(snapshot) = entry.counters.kernel(cpu, event_type) else {
                        break;
                    };
                    let delta = snapshot.delta(sample);
                    let tags = self.tags(name, event_type);
                    if delta.count > 0 {
                        self.sink.count(&self.names.events_write, delta.count, &tags)?;
                    }
                    if delta.bytes > 0 {
                        self.sink.count(&self.names.bytes_write, delta.bytes, &tags)?;
                    }
                    if delta.lost > 0 {
                        self.sink.count(&self.names.events_lost, delta.lost, &tags)?;
                    }
                    snapshot.commit(sample);
                    map_lost += delta.lost;
                }
            }
            if map_lost >= self.loss_threshold {
                warn!(map = name, lost = map_lost, "kernel dropped events");
                if let Some(alert) = &self.loss_alert {
                    alert(name, map_lost);
                }
            }

            if let Some((size, used)) = fill {
                let tags = [
                    KeyValue::new("map", name.to_owned()),
                    KeyValue::new("size", size_bucket(size)),
                ];
                self.sink
                    .gauge(&self.names.ring_usage, utilisation(used, size), &tags)?;
            }
        }
        Ok(())
    }

    /// Collects kernel statistics, then emits every user-side counter and
    /// subtracts what was emitted. The first failure aborts the report and
    /// leaves the unsent values for the next one.
    pub fn send_stats(&self) -> Result<(), MonitorError> {
        self.collect_kernel_stats()?;

        for entry in &self.entries {
            let name = entry.map.name.as_str();
            let counters = &entry.counters;
            for cpu in 0..counters.num_cpus() {
                for event_type in 0..counters.event_types() {
                    let Some(slot) = counters.user(cpu, event_type) else {
                        continue;
                    };
                    let values = slot.load();
                    let tags = self.tags(name, event_type);
                    if values.count > 0 {
                        self.sink.count(&self.names.events_read, values.count, &tags)?;
                    }
                    if values.bytes > 0 {
                        self.sink.count(&self.names.bytes_read, values.bytes, &tags)?;
                    }
                    slot.subtract(values);
                }

                if let Some(slot) = counters.user_lost(cpu) {
                    let lost = slot.load(Ordering::Relaxed);
                    if lost > 0 {
                        let tags = [
                            KeyValue::new("map", name.to_owned()),
                            KeyValue::new("cpu", cpu as i64),
                        ];
                        self.sink.count(&self.names.lost_user, lost, &tags)?;
                        slot.fetch_sub(lost, Ordering::Relaxed);
                    }
                }
            }

            for event_type in 0..counters.event_types() {
                let Some(slot) = counters.sorting_errors(event_type) else {
                    continue;
                };
                let errors = slot.load(Ordering::Relaxed);
                if errors > 0 {
                    let tags = self.tags(name, event_type);
                    self.sink.count(&self.names.sorting_error, errors, &tags)?;
                    slot.fetch_sub(errors, Ordering::Relaxed);
                }
            }
        }
        debug!(maps = self.entries.len(), "ingestion stats sent");
        Ok(())
    }

    fn tags(&self, map: &str, event_type: usize) -> [KeyValue; 2] {
        [
            KeyValue::new("map", map.to_owned()),
            KeyValue::new("event_type", self.event_type_name(event_type).to_owned()),
        ]
    }
}
