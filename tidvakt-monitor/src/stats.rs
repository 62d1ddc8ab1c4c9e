//! Lock-free counter tables.
//!
//! Every table is a flat array indexed by `cpu * event_types + event_type`.
//! Producers increment with relaxed atomics. The reporting path subtracts
//! what it managed to emit, and kernel snapshots advance only after their
//! deltas went out.

use std::sync::atomic::{AtomicU64, Ordering};

use tidvakt_capture::KernelCounters;

/// `{bytes, count}` received by user space for one `(cpu, event type)` slot.
#[derive(Debug, Default)]
pub struct ReadCounters {
    pub bytes: AtomicU64,
    pub count: AtomicU64,
}

/// Plain copy of a [`ReadCounters`] slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadValues {
    pub bytes: u64,
    pub count: u64,
}

impl ReadCounters {
    pub fn add(&self, count: u64, bytes: u64) {
        self.count.fetch_add(count, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn load(&self) -> ReadValues {
        ReadValues {
            bytes: self.bytes.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
        }
    }

    /// Removes values that were reported. Increments that landed after the
    /// matching [`load`](Self::load) stay for the next report.
    pub fn subtract(&self, reported: ReadValues) {
        self.count.fetch_sub(reported.count, Ordering::Relaxed);
        self.bytes.fetch_sub(reported.bytes, Ordering::Relaxed);
    }
}

/// Last kernel-side `{bytes, count, lost}` reported for one slot.
#[derive(Debug, Default)]
pub struct KernelSnapshot {
    pub bytes: AtomicU64,
    pub count: AtomicU64,
    pub lost: AtomicU64,
}

/// Growth of a kernel slot between two reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelDelta {
    pub bytes: u64,
    pub count: u64,
    pub lost: u64,
}

impl KernelSnapshot {
    /// How much `sample` grew past the snapshot. The snapshot is untouched.
    pub fn delta(&self, sample: &KernelCounters) -> KernelDelta {
        KernelDelta {
            bytes: growth(self.bytes.load(Ordering::Relaxed), sample.bytes),
            count: growth(self.count.load(Ordering::Relaxed), sample.count),
            lost: growth(self.lost.load(Ordering::Relaxed), sample.lost),
        }
    }

    /// Makes `sample` the new snapshot.
    pub fn commit(&self, sample: &KernelCounters) {
        self.bytes.store(sample.bytes, Ordering::Relaxed);
        self.count.store(sample.count, Ordering::Relaxed);
        self.lost.store(sample.lost, Ordering::Relaxed);
    }
}

/// Growth from `previous` to `sample`. A sample below the previous value
/// means the kernel counter restarted, so the whole sample counts.
#[inline]
pub fn growth(previous: u64, sample: u64) -> u64 {
    if previous <= sample {
        sample - previous
    } else {
        sample
    }
}

/// All counters kept for one monitored map.
#[derive(Debug)]
pub struct MapCounters {
    num_cpus: usize,
    event_types: usize,
    /// Records seen by user space.
    user: Box<[ReadCounters]>,
    /// Last kernel-side values, used to compute write deltas.
    kernel: Box<[KernelSnapshot]>,
    /// Losses reported by the buffer readers, per CPU.
    user_lost: Box<[AtomicU64]>,
    /// Ordering violations, per event type.
    sorting_errors: Box<[AtomicU64]>,
}

impl MapCounters {
    pub fn new(num_cpus: usize, event_types: usize) -> Self {
        let slots = num_cpus * event_types;
        Self {
            num_cpus,
            event_types,
            user: (0..slots).map(|_| ReadCounters::default()).collect(),
            kernel: (0..slots).map(|_| KernelSnapshot::default()).collect(),
            user_lost: (0..num_cpus).map(|_| AtomicU64::new(0)).collect(),
            sorting_errors: (0..event_types).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn event_types(&self) -> usize {
        self.event_types
    }

    #[inline]
    fn slot(&self, cpu: usize, event_type: usize) -> Option<usize> {
        (cpu < self.num_cpus && event_type < self.event_types)
            .then(|| cpu * self.event_types + event_type)
    }

    pub fn user(&self, cpu: usize, event_type: usize) -> Option<&ReadCounters> {
        self.slot(cpu, event_type).and_then(|i| self.user.get(i))
    }

    pub fn kernel(&self, cpu: usize, event_type: usize) -> Option<&KernelSnapshot> {
        self.slot(cpu, event_type).and_then(|i| self.kernel.get(i))
    }

    pub fn user_lost(&self, cpu: usize) -> Option<&AtomicU64> {
        self.user_lost.get(cpu)
    }

    pub fn sorting_errors(&self, event_type: usize) -> Option<&AtomicU64> {
        self.sorting_errors.get(event_type)
    }

    /// Sums and resets the user-side losses, of one CPU or of all.
    pub fn take_user_lost(&self, cpu: Option<usize>) -> u64 {
        match cpu {
            Some(cpu) => self
                .user_lost
                .get(cpu)
                .map_or(0, |c| c.swap(0, Ordering::Relaxed)),
            None => self
                .user_lost
                .iter()
                .map(|c| c.swap(0, Ordering::Relaxed))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(bytes: u64, count: u64, lost: u64) -> KernelCounters {
        KernelCounters { bytes, count, lost }
    }

    #[test]
    fn growth_handles_counter_restart() {
        assert_eq!(growth(0, 10), 10);
        assert_eq!(growth(10, 15), 5);
        assert_eq!(growth(15, 15), 0);
        // Counter went backwards: the fresh sample is all new.
        assert_eq!(growth(15, 4), 4);
    }

    #[test]
    fn snapshot_moves_only_on_commit() {
        let snapshot = KernelSnapshot::default();
        let first = sample(640, 10, 2);
        assert_eq!(snapshot.delta(&first), KernelDelta { bytes: 640, count: 10, lost: 2 });
        // An uncommitted read is seen again in full.
        assert_eq!(snapshot.delta(&first).count, 10);

        snapshot.commit(&first);
        assert_eq!(snapshot.delta(&sample(704, 11, 2)), KernelDelta { bytes: 64, count: 1, lost: 0 });
    }

    #[test]
    fn slots_are_bounds_checked() {
        let counters = MapCounters::new(2, 3);
        assert!(counters.user(1, 2).is_some());
        assert!(counters.user(2, 0).is_none());
        assert!(counters.kernel(0, 3).is_none());
        assert!(counters.user_lost(2).is_none());
        assert!(counters.sorting_errors(3).is_none());
    }

    #[test]
    fn subtract_keeps_late_increments() {
        let counters = MapCounters::new(2, 2);
        let slot = counters.user(1, 1).unwrap();
        slot.add(3, 300);
        let reported = slot.load();
        assert_eq!(reported, ReadValues { bytes: 300, count: 3 });

        slot.add(1, 50);
        slot.subtract(reported);
        assert_eq!(slot.load(), ReadValues { bytes: 50, count: 1 });
    }

    proptest! {
        #[test]
        fn committed_deltas_sum_to_final_value(mut samples in prop::collection::vec(0u64..1_000_000, 1..50)) {
            samples.sort_unstable();
            let snapshot = KernelSnapshot::default();
            let mut total = 0;
            for &count in &samples {
                let read = sample(0, count, 0);
                total += snapshot.delta(&read).count;
                snapshot.commit(&read);
            }
            prop_assert_eq!(total, *samples.last().unwrap());
        }
    }
}
