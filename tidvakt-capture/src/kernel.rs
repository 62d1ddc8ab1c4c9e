//! Kernel-side interface.
//!
//! Attaching and loading the probe happen elsewhere; by the time an adapter
//! runs, the maps it needs are reachable through a [`MapRegistry`].

use std::sync::Arc;

use crate::error::KernelError;
use crate::lifecycle::Lifecycle;

/// Called with `(cpu, payload)` for every record read from a map. The payload
/// is kernel owned and only valid for the duration of the call.
pub type RecordFn = Arc<dyn Fn(u32, &[u8]) + Send + Sync>;

/// Called with `(count, cpu)` whenever a reader reports dropped records.
pub type LossFn = Arc<dyn Fn(u64, u32) + Send + Sync>;

#[derive(Clone)]
pub struct MapHandlers {
    pub on_record: RecordFn,
    pub on_loss: LossFn,
}

/// Per-CPU perf event buffer.
pub trait PerfMap: Send + Sync {
    fn name(&self) -> &str;

    /// Starts one reader per CPU. Readers run on their own threads, spawned
    /// through `lifecycle`, and stop when its token is cancelled.
    fn start(&self, handlers: MapHandlers, lifecycle: &mut Lifecycle) -> Result<(), KernelError>;

    /// Suspends kernel-side delivery.
    fn pause(&self) -> Result<(), KernelError>;

    fn resume(&self) -> Result<(), KernelError>;
}

/// Single shared ring buffer. Records arrive in global order.
pub trait RingMap: Send + Sync {
    fn name(&self) -> &str;

    /// Ring size in bytes.
    fn size(&self) -> usize;

    fn start(&self, handlers: MapHandlers, lifecycle: &mut Lifecycle) -> Result<(), KernelError>;
}

/// Kernel-maintained write-side counters for one `(event type, cpu)` slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelCounters {
    pub bytes: u64,
    pub count: u64,
    pub lost: u64,
}

/// Per-CPU statistics map keyed by event type.
pub trait StatsTable: Send + Sync {
    fn name(&self) -> &str;

    /// Returns one entry per CPU for `event_type`.
    fn lookup(&self, event_type: u32) -> Result<Vec<KernelCounters>, KernelError>;
}

/// Synchronous fill-level query for ring buffers.
pub trait RingUsage: Send + Sync {
    /// Bytes currently used in the ring named `map`.
    fn ring_usage(&self, map: &str) -> Result<u64, KernelError>;
}

pub trait MapRegistry: Send + Sync {
    fn perf_map(&self, name: &str) -> Result<Arc<dyn PerfMap>, KernelError>;

    fn ring_map(&self, name: &str) -> Result<Arc<dyn RingMap>, KernelError>;

    fn stats_table(&self, name: &str) -> Result<Arc<dyn StatsTable>, KernelError>;

    fn usage_query(&self) -> Option<Arc<dyn RingUsage>>;

    fn num_cpus(&self) -> usize;
}
