//! Simulated per-CPU perf buffers.
//!
//! One reader thread per CPU. Every poll the reader first "writes" the
//! records its CPU produced since the last poll, stamped with kernel clock
//! times spread over that interval, then delivers them. Readers poll with
//! independent jitter, so across CPUs records arrive out of timestamp order
//! by up to one poll interval plus jitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tidvakt_capture::{KernelError, Lifecycle, MapHandlers, PerfMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::KernelClock;
use crate::config::SimConfig;
use crate::models::{seeded_rng, LossModel, ReadJitter};
use crate::stats::SimStatsTable;
use crate::writer::{spread, RecordWriter};

pub struct SimPerfMap {
    name: String,
    config: SimConfig,
    clock: Arc<KernelClock>,
    stats: Option<Arc<SimStatsTable>>,
    paused: Arc<AtomicBool>,
    started: AtomicBool,
}

impl SimPerfMap {
    pub fn new(
        name: impl Into<String>,
        config: SimConfig,
        clock: Arc<KernelClock>,
        stats: Option<Arc<SimStatsTable>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            stats,
            paused: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl PerfMap for SimPerfMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, handlers: MapHandlers, lifecycle: &mut Lifecycle) -> Result<(), KernelError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(KernelError::AlreadyReading(self.name.clone()));
        }
        for cpu in 0..self.config.cpus {
            let seed = self.config.seed;
            let stream = cpu as u64 * 3;
            let reader = CpuReader {
                cpu: cpu as u32,
                config: self.config.clone(),
                clock: Arc::clone(&self.clock),
                paused: Arc::clone(&self.paused),
                jitter: ReadJitter::new(self.config.jitter_ms, seeded_rng(seed, stream)),
                writer: RecordWriter::new(
                    self.config.event_types,
                    self.config.payload_len,
                    seeded_rng(seed, stream + 1),
                    LossModel::new(self.config.loss_probability, seeded_rng(seed, stream + 2)),
                    self.stats.clone(),
                ),
                handlers: handlers.clone(),
            };
            let cancel = lifecycle.child_token();
            lifecycle.spawn_thread(&format!("tidvakt-perf-{cpu}"), move || reader.run(cancel))?;
        }
        info!(map = %self.name, cpus = self.config.cpus, "simulated perf readers started");
        Ok(())
    }

    fn pause(&self) -> Result<(), KernelError> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn resume(&self) -> Result<(), KernelError> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}

struct CpuReader {
    cpu: u32,
    config: SimConfig,
    clock: Arc<KernelClock>,
    paused: Arc<AtomicBool>,
    jitter: ReadJitter,
    writer: RecordWriter,
    handlers: MapHandlers,
}

impl CpuReader {
    fn run(mut self, cancel: CancellationToken) {
        let mut last = self.clock.now_ns();
        let (mut delivered, mut lost) = (0u64, 0u64);
        while !cancel.is_cancelled() {
            thread::sleep(self.jitter.apply(self.config.poll_interval()));
            let now = self.clock.now_ns();
            // Paused buffers produce nothing.
            if self.paused.load(Ordering::Acquire) {
                last = now;
                continue;
            }

            let n = self.writer.due(last, now, self.config.events_per_sec);
            let mut batch_lost = 0u64;
            for i in 0..n {
                let ts = spread(last, now, i, n);
                let on_record = &self.handlers.on_record;
                let cpu = self.cpu;
                if self.writer.write(cpu as u64, ts, |payload| on_record(cpu, payload)) {
                    delivered += 1;
                } else {
                    batch_lost += 1;
                }
            }
            if batch_lost > 0 {
                (self.handlers.on_loss)(batch_lost, self.cpu);
                lost += batch_lost;
            }
            last = now;
        }
        debug!(cpu = self.cpu, delivered, lost, "simulated perf reader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tidvakt_core::events::EventHeader;

    fn config() -> SimConfig {
        SimConfig {
            cpus: 3,
            events_per_sec: 5_000,
            poll_interval_ms: 2,
            jitter_ms: 3,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_cpu_delivers_its_own_ordered_stream() {
        let stats = Arc::new(SimStatsTable::new("events_stats", 3, 16));
        let map = SimPerfMap::new(
            "events",
            config(),
            Arc::new(KernelClock::new()),
            Some(Arc::clone(&stats)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = MapHandlers {
            on_record: Arc::new(move |cpu: u32, payload: &[u8]| {
                sink.lock().push((cpu, EventHeader::parse(payload).unwrap()));
            }),
            on_loss: Arc::new(|_: u64, _: u32| {}),
        };

        let mut lifecycle = Lifecycle::current();
        map.start(handlers.clone(), &mut lifecycle).unwrap();
        assert!(matches!(
            map.start(handlers, &mut lifecycle),
            Err(KernelError::AlreadyReading(_))
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        lifecycle.shutdown().await;

        let seen = seen.lock();
        assert!(!seen.is_empty());
        for cpu in 0..3u32 {
            let stamps: Vec<u64> = seen
                .iter()
                .filter(|(c, _)| *c == cpu)
                .inspect(|(c, h)| assert_eq!(h.cpu, *c as u64))
                .map(|(_, h)| h.timestamp)
                .collect();
            assert!(!stamps.is_empty(), "cpu {cpu} delivered nothing");
            assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        }
        assert_eq!(stats.totals().count, seen.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn losses_reach_handler_and_stats() {
        let stats = Arc::new(SimStatsTable::new("events_stats", 3, 16));
        let map = SimPerfMap::new(
            "events",
            SimConfig {
                loss_probability: 1.0,
                ..config()
            },
            Arc::new(KernelClock::new()),
            Some(Arc::clone(&stats)),
        );
        let lost = Arc::new(Mutex::new(0u64));
        let sink = Arc::clone(&lost);
        let handlers = MapHandlers {
            on_record: Arc::new(|_: u32, _: &[u8]| panic!("every record is lost")),
            on_loss: Arc::new(move |count: u64, _: u32| *sink.lock() += count),
        };
        let mut lifecycle = Lifecycle::current();
        map.start(handlers, &mut lifecycle).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        lifecycle.shutdown().await;

        let lost = *lost.lock();
        assert!(lost > 0);
        assert_eq!(stats.totals().lost, lost);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn paused_map_is_silent() {
        let map = SimPerfMap::new("events", config(), Arc::new(KernelClock::new()), None);
        map.pause().unwrap();
        assert!(map.is_paused());
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let handlers = MapHandlers {
            on_record: Arc::new(move |_: u32, _: &[u8]| *sink.lock() += 1),
            on_loss: Arc::new(|_: u64, _: u32| {}),
        };
        let mut lifecycle = Lifecycle::current();
        map.start(handlers, &mut lifecycle).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*count.lock(), 0);

        map.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        lifecycle.shutdown().await;
        assert!(*count.lock() > 0);
    }
}
