//! Kernel-side write statistics.
//!
//! Mirrors the per-CPU array map the probe updates for every record it
//! writes or fails to write. Values only grow, like the real counters.

use std::sync::atomic::{AtomicU64, Ordering};

use tidvakt_capture::{KernelCounters, KernelError, StatsTable};

#[derive(Debug, Default)]
struct Slot {
    bytes: AtomicU64,
    count: AtomicU64,
    lost: AtomicU64,
}

/// Indexed by `event_type * cpus + cpu`.
#[derive(Debug)]
pub struct SimStatsTable {
    name: String,
    cpus: usize,
    event_types: usize,
    slots: Box<[Slot]>,
}

impl SimStatsTable {
    pub fn new(name: impl Into<String>, cpus: usize, event_types: usize) -> Self {
        Self {
            name: name.into(),
            cpus,
            event_types,
            slots: (0..cpus * event_types).map(|_| Slot::default()).collect(),
        }
    }

    fn slot(&self, cpu: usize, event_type: usize) -> Option<&Slot> {
        if cpu >= self.cpus || event_type >= self.event_types {
            return None;
        }
        self.slots.get(event_type * self.cpus + cpu)
    }

    pub fn record_write(&self, cpu: usize, event_type: u32, bytes: usize) {
        if let Some(slot) = self.slot(cpu, event_type as usize) {
            slot.count.fetch_add(1, Ordering::Relaxed);
            slot.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub fn record_lost(&self, cpu: usize, event_type: u32) {
        if let Some(slot) = self.slot(cpu, event_type as usize) {
            slot.lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sum over all slots.
    pub fn totals(&self) -> KernelCounters {
        self.slots.iter().fold(KernelCounters::default(), |acc, s| KernelCounters {
            bytes: acc.bytes + s.bytes.load(Ordering::Relaxed),
            count: acc.count + s.count.load(Ordering::Relaxed),
            lost: acc.lost + s.lost.load(Ordering::Relaxed),
        })
    }
}

impl StatsTable for SimStatsTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, event_type: u32) -> Result<Vec<KernelCounters>, KernelError> {
        if event_type as usize >= self.event_types {
            return Err(KernelError::Lookup {
                map: self.name.clone(),
                reason: format!("no entry for event type {event_type}"),
            });
        }
        Ok((0..self.cpus)
            .filter_map(|cpu| self.slot(cpu, event_type as usize))
            .map(|s| KernelCounters {
                bytes: s.bytes.load(Ordering::Relaxed),
                count: s.count.load(Ordering::Relaxed),
                lost: s.lost.load(Ordering::Relaxed),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_one_entry_per_cpu() {
        let table = SimStatsTable::new("events_stats", 2, 3);
        table.record_write(1, 2, 64);
        table.record_write(1, 2, 32);
        table.record_lost(0, 2);
        table.record_write(5, 0, 10);

        let row = table.lookup(2).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], KernelCounters { bytes: 0, count: 0, lost: 1 });
        assert_eq!(row[1], KernelCounters { bytes: 96, count: 2, lost: 0 });
        assert_eq!(table.totals(), KernelCounters { bytes: 96, count: 2, lost: 1 });
    }

    #[test]
    fn unknown_event_type_fails() {
        let table = SimStatsTable::new("events_stats", 2, 3);
        assert!(matches!(table.lookup(3), Err(KernelError::Lookup { .. })));
    }
}
