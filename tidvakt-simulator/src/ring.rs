//! Simulated shared ring buffer.
//!
//! A single reader thread. All CPUs write into the same ring, so records
//! come out in global timestamp order. Records a poll cannot fit into the
//! ring are lost and reported against the CPU that wrote them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use tidvakt_capture::{KernelError, Lifecycle, MapHandlers, RingMap, RingUsage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::KernelClock;
use crate::config::SimConfig;
use crate::models::{seeded_rng, LossModel, ReadJitter};
use crate::stats::SimStatsTable;
use crate::writer::{spread, RecordWriter};

/// Stream offset keeping ring RNGs apart from the per-CPU readers.
const RING_STREAM: u64 = 1 << 32;

/// Fill levels of every simulated ring, by map name.
#[derive(Debug, Default)]
pub struct SimUsage {
    rings: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl SimUsage {
    fn register(&self, name: &str) -> Arc<AtomicU64> {
        Arc::clone(
            self.rings
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(AtomicU64::new(0))),
        )
    }
}

impl RingUsage for SimUsage {
    fn ring_usage(&self, map: &str) -> Result<u64, KernelError> {
        self.rings
            .read()
            .get(map)
            .map(|used| used.load(Ordering::Relaxed))
            .ok_or_else(|| KernelError::Usage(format!("no ring buffer named {map}")))
    }
}

pub struct SimRingMap {
    name: String,
    size: usize,
    config: SimConfig,
    clock: Arc<KernelClock>,
    stats: Option<Arc<SimStatsTable>>,
    used: Arc<AtomicU64>,
    started: AtomicBool,
}

impl SimRingMap {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        config: SimConfig,
        clock: Arc<KernelClock>,
        stats: Option<Arc<SimStatsTable>>,
        usage: &SimUsage,
    ) -> Self {
        let name = name.into();
        let used = usage.register(&name);
        Self {
            name,
            size,
            config,
            clock,
            stats,
            used,
            started: AtomicBool::new(false),
        }
    }
}

impl RingMap for SimRingMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.size
    }

    fn start(&self, handlers: MapHandlers, lifecycle: &mut Lifecycle) -> Result<(), KernelError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(KernelError::AlreadyReading(self.name.clone()));
        }
        let seed = self.config.seed;
        let reader = RingReader {
            size: self.size as u64,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            used: Arc::clone(&self.used),
            jitter: ReadJitter::new(self.config.jitter_ms, seeded_rng(seed, RING_STREAM)),
            writer: RecordWriter::new(
                self.config.event_types,
                self.config.payload_len,
                seeded_rng(seed, RING_STREAM + 1),
                LossModel::new(self.config.loss_probability, seeded_rng(seed, RING_STREAM + 2)),
                self.stats.clone(),
            ),
            handlers,
        };
        let cancel = lifecycle.child_token();
        lifecycle.spawn_thread("tidvakt-ring", move || reader.run(cancel))?;
        info!(map = %self.name, size = self.size, "simulated ring reader started");
        Ok(())
    }
}

struct RingReader {
    size: u64,
    config: SimConfig,
    clock: Arc<KernelClock>,
    used: Arc<AtomicU64>,
    jitter: ReadJitter,
    writer: RecordWriter,
    handlers: MapHandlers,
}

impl RingReader {
    fn run(mut self, cancel: CancellationToken) {
        let cpus = self.config.cpus;
        let rate = self.config.events_per_sec * cpus as u64;
        let mut last = self.clock.now_ns();
        let (mut delivered, mut lost) = (0u64, 0u64);
        let mut batch: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut batch_lost: Vec<u64> = vec![0; cpus.max(1)];

        while !cancel.is_cancelled() {
            thread::sleep(self.jitter.apply(self.config.poll_interval()));
            let now = self.clock.now_ns();
            let n = self.writer.due(last, now, rate);

            let mut fill = 0u64;
            let record_len = self.writer.record_len() as u64;
            for i in 0..n {
                let cpu = self.writer.pick_cpu(cpus);
                if fill + record_len > self.size {
                    self.writer.reject(cpu);
                    batch_lost[cpu as usize] += 1;
                    continue;
                }
                let ts = spread(last, now, i, n);
                let written = self.writer.write(cpu, ts, |payload| {
                    batch.push((cpu as u32, payload.to_vec()));
                });
                if written {
                    fill += record_len;
                } else {
                    batch_lost[cpu as usize] += 1;
                }
            }
            self.used.store(fill, Ordering::Relaxed);

            for (cpu, payload) in batch.drain(..) {
                (self.handlers.on_record)(cpu, &payload);
                let remaining = self.used.load(Ordering::Relaxed);
                self.used
                    .store(remaining.saturating_sub(payload.len() as u64), Ordering::Relaxed);
                delivered += 1;
            }
            for (cpu, count) in batch_lost.iter_mut().enumerate() {
                if *count > 0 {
                    (self.handlers.on_loss)(*count, cpu as u32);
                    lost += *count;
                    *count = 0;
                }
            }
            last = now;
        }
        self.used.store(0, Ordering::Relaxed);
        debug!(delivered, lost, "simulated ring reader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tidvakt_core::events::{EventHeader, HEADER_LEN};

    fn config() -> SimConfig {
        SimConfig {
            cpus: 4,
            events_per_sec: 2_000,
            poll_interval_ms: 2,
            jitter_ms: 2,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn delivers_in_global_order() {
        let usage = SimUsage::default();
        let map = SimRingMap::new(
            "events",
            1 << 20,
            config(),
            Arc::new(KernelClock::new()),
            None,
            &usage,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = MapHandlers {
            on_record: Arc::new(move |cpu: u32, payload: &[u8]| {
                let header = EventHeader::parse(payload).unwrap();
                assert_eq!(header.cpu, cpu as u64);
                sink.lock().push(header.timestamp);
            }),
            on_loss: Arc::new(|_: u64, _: u32| panic!("ring is large enough")),
        };
        let mut lifecycle = Lifecycle::current();
        map.start(handlers, &mut lifecycle).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        lifecycle.shutdown().await;

        let seen = seen.lock();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(usage.ring_usage("events").unwrap(), 0);
        assert!(matches!(usage.ring_usage("other"), Err(KernelError::Usage(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overflow_is_reported_as_loss() {
        let usage = SimUsage::default();
        let config = config();
        let record = (HEADER_LEN + config.payload_len) as u64;
        // Room for two records per poll.
        let map = SimRingMap::new(
            "events",
            2 * record as usize,
            SimConfig {
                events_per_sec: 50_000,
                ..config
            },
            Arc::new(KernelClock::new()),
            None,
            &usage,
        );
        let counts = Arc::new(Mutex::new((0u64, 0u64)));
        let (records, losses) = (Arc::clone(&counts), Arc::clone(&counts));
        let handlers = MapHandlers {
            on_record: Arc::new(move |_: u32, _: &[u8]| records.lock().0 += 1),
            on_loss: Arc::new(move |count: u64, _: u32| losses.lock().1 += count),
        };
        let mut lifecycle = Lifecycle::current();
        map.start(handlers, &mut lifecycle).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        lifecycle.shutdown().await;

        let (delivered, lost) = *counts.lock();
        assert!(delivered > 0);
        assert!(lost > 0);
    }
}
