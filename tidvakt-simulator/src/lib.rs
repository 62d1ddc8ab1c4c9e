//! # Tidvakt Simulator
//!
//! An in-process stand-in for the kernel side of the probe. It implements
//! the capture crate's [`MapRegistry`] with perf buffers, ring buffers and
//! statistics tables fed by synthetic records, so the whole ingestion path
//! can run without a loaded kernel program.
//!
//! ## Key Components:
//! - **Kernel Clock:** Strictly increasing nanosecond timestamps shared by all CPUs.
//! - **Perf Buffers:** Per-CPU readers with seeded poll jitter, producing cross-CPU disorder.
//! - **Ring Buffers:** A single globally ordered reader with a finite capacity.
//! - **Loss Model:** Seeded kernel-side drops reported through the loss callbacks.
//! - **Stream Digest:** BLAKE3 hash and ordering check over the delivered stream.

use std::collections::HashMap;
use std::sync::Arc;

use tidvakt_capture::{KernelError, MapRegistry, PerfMap, RingMap, RingUsage, StatsTable};

pub mod clock;
pub mod config;
pub mod digest;
pub mod models;
pub mod perf;
pub mod ring;
pub mod stats;
mod writer;

pub use clock::KernelClock;
pub use config::{load_sim_config, SimConfig, SimConfigError};
pub use digest::{DigestSummary, StreamDigest};
pub use perf::SimPerfMap;
pub use ring::{SimRingMap, SimUsage};
pub use stats::SimStatsTable;

pub struct SimulatedKernel {
    config: SimConfig,
    clock: Arc<KernelClock>,
    perf: HashMap<String, Arc<SimPerfMap>>,
    rings: HashMap<String, Arc<SimRingMap>>,
    stats: HashMap<String, Arc<SimStatsTable>>,
    usage: Arc<SimUsage>,
}

impl SimulatedKernel {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            clock: Arc::new(KernelClock::new()),
            perf: HashMap::new(),
            rings: HashMap::new(),
            stats: HashMap::new(),
            usage: Arc::new(SimUsage::default()),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn new_stats_table(&mut self, name: Option<&str>) -> Option<Arc<SimStatsTable>> {
        let name = name?;
        let table = Arc::new(SimStatsTable::new(
            name,
            self.config.cpus,
            self.config.event_types as usize,
        ));
        self.stats.insert(name.to_owned(), Arc::clone(&table));
        Some(table)
    }

    /// Adds a per-CPU perf buffer, optionally with a statistics table.
    pub fn with_perf_map(mut self, name: &str, stats: Option<&str>) -> Self {
        let table = self.new_stats_table(stats);
        let map = SimPerfMap::new(name, self.config.clone(), Arc::clone(&self.clock), table);
        self.perf.insert(name.to_owned(), Arc::new(map));
        self
    }

    /// Adds a shared ring buffer of `size` bytes, optionally with a
    /// statistics table.
    pub fn with_ring_map(mut self, name: &str, size: usize, stats: Option<&str>) -> Self {
        let table = self.new_stats_table(stats);
        let map = SimRingMap::new(
            name,
            size,
            self.config.clone(),
            Arc::clone(&self.clock),
            table,
            &self.usage,
        );
        self.rings.insert(name.to_owned(), Arc::new(map));
        self
    }

    /// Statistics table by name, for comparing kernel-side totals after a run.
    pub fn stats(&self, name: &str) -> Option<Arc<SimStatsTable>> {
        self.stats.get(name).cloned()
    }
}

impl MapRegistry for SimulatedKernel {
    fn perf_map(&self, name: &str) -> Result<Arc<dyn PerfMap>, KernelError> {
        match self.perf.get(name) {
            Some(map) => Ok(Arc::clone(map) as Arc<dyn PerfMap>),
            None if self.rings.contains_key(name) => Err(KernelError::WrongMapKind {
                name: name.to_owned(),
                expected: "perf event array",
            }),
            None => Err(KernelError::MapNotFound(name.to_owned())),
        }
    }

    fn ring_map(&self, name: &str) -> Result<Arc<dyn RingMap>, KernelError> {
        match self.rings.get(name) {
            Some(map) => Ok(Arc::clone(map) as Arc<dyn RingMap>),
            None if self.perf.contains_key(name) => Err(KernelError::WrongMapKind {
                name: name.to_owned(),
                expected: "ring buffer",
            }),
            None => Err(KernelError::MapNotFound(name.to_owned())),
        }
    }

    fn stats_table(&self, name: &str) -> Result<Arc<dyn StatsTable>, KernelError> {
        self.stats
            .get(name)
            .map(|t| Arc::clone(t) as Arc<dyn StatsTable>)
            .ok_or_else(|| KernelError::MapNotFound(name.to_owned()))
    }

    fn usage_query(&self) -> Option<Arc<dyn RingUsage>> {
        (!self.rings.is_empty()).then(|| Arc::clone(&self.usage) as Arc<dyn RingUsage>)
    }

    fn num_cpus(&self) -> usize {
        self.config.cpus
    }
}
