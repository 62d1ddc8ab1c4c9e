//! Probe runtime.
//!
//! Wires configuration, the kernel map registry and the downstream handler
//! into a running ingestion pipeline:
//!
//! ```text
//! kernel maps -> adapter -> [reorderer] -> counting handler -> handler
//!                   |                                 |
//!                   +------ losses ------> monitor <--+
//! ```
//!
//! The monitor reports on a fixed period until shutdown. The per-CPU path
//! also runs the reorderer's telemetry relay.

use std::sync::Arc;

use opentelemetry::KeyValue;
use parking_lot::RwLock;
use tidvakt_capture::{Ingestor, IngestorKind, Lifecycle, MapRegistry};
use tidvakt_config::TidvaktConfig;
use tidvakt_core::alloc::RecordPool;
use tidvakt_core::events::EventHandler;
use tidvakt_core::reorder::{ReOrderer, ReOrdererOptions, ReOrdererRelay};
use tidvakt_monitor::{IngestMonitor, LossAlert, MonitoredMap};
use tidvakt_telemetry::{EventLogger, MetricsSink};
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::counting::CountingHandler;
use crate::error::RuntimeError;

pub struct Probe {
    config: TidvaktConfig,
    pool: Arc<RecordPool>,
    monitor: Arc<IngestMonitor>,
    ingestor: IngestorKind,
    reorderer: Option<Arc<ReOrderer>>,
    sink: Arc<dyn MetricsSink>,
    alert_hook: Arc<RwLock<Option<LossAlert>>>,
}

fn reorderer_options(config: &TidvaktConfig) -> ReOrdererOptions {
    let r = &config.reorderer;
    ReOrdererOptions {
        queue_size: r.queue_size,
        flush_interval: r.flush_interval(),
        retention: r.retention,
        metric_interval: r.metric_interval(),
        heap_shrink_delta: r.heap_shrink_delta,
    }
}

impl Probe {
    /// Builds every component and resolves the kernel maps. A missing event
    /// map is fatal; a missing statistics table only disables the
    /// kernel-side counters for that map.
    pub fn new(
        config: TidvaktConfig,
        registry: Arc<dyn MapRegistry>,
        handler: Arc<dyn EventHandler>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, RuntimeError> {
        let ingest = &config.ingest;
        let map = ingest.events_map.as_str();
        let namespace = config.telemetry.namespace.as_str();
        let pool = RecordPool::new(ingest.pool_capacity, ingest.record_size);

        let stats_name = config.monitor.stats_table_for(map);
        let stats_table = match registry.stats_table(&stats_name) {
            Ok(table) => Some(table),
            Err(e) => {
                debug!(table = %stats_name, error = %e, "no kernel statistics for map");
                None
            }
        };
        let monitored = if ingest.use_ring_buffer {
            let ring = registry.ring_map(map)?;
            MonitoredMap::ring(map, ring.size(), stats_table)
        } else {
            MonitoredMap::perf(map, stats_table)
        };

        // The registry knows how many CPUs actually deliver records.
        let mut monitor_config = config.monitor.clone();
        monitor_config.num_cpus = registry.num_cpus().max(1);

        let alert_hook: Arc<RwLock<Option<LossAlert>>> = Arc::default();
        let hook = Arc::clone(&alert_hook);
        let mut monitor = IngestMonitor::new(&monitor_config, namespace, Arc::clone(&sink))
            .with_map(monitored)
            .with_loss_alert(Arc::new(move |map: &str, lost: u64| {
                EventLogger::log_event(
                    "events_lost",
                    &[
                        KeyValue::new("map", map.to_owned()),
                        KeyValue::new("lost", lost as i64),
                    ],
                );
                if let Some(hook) = hook.read().as_ref() {
                    hook(map, lost);
                }
            }));
        if ingest.use_ring_buffer {
            if let Some(usage) = registry.usage_query() {
                monitor = monitor.with_usage_query(usage);
            }
        }
        let monitor = Arc::new(monitor);

        let counting: Arc<dyn EventHandler> =
            Arc::new(CountingHandler::new(handler, Arc::clone(&monitor), map));
        let (mut ingestor, reorderer) = if ingest.use_ring_buffer {
            (IngestorKind::single_buffer(counting, Arc::clone(&pool)), None)
        } else {
            let reorderer = Arc::new(ReOrderer::new(
                counting,
                Arc::clone(&pool),
                reorderer_options(&config),
            ));
            (IngestorKind::per_cpu(Arc::clone(&reorderer)), Some(reorderer))
        };

        let observer_monitor = Arc::clone(&monitor);
        ingestor.set_loss_observer(Arc::new(move |count: u64, map: &str, cpu: u32| {
            observer_monitor.count_lost(count, map, cpu);
        }));
        ingestor.init(registry.as_ref(), ingest)?;

        info!(adapter = ingestor.name(), map, "probe initialised");
        Ok(Self {
            config,
            pool,
            monitor,
            ingestor,
            reorderer,
            sink,
            alert_hook,
        })
    }

    /// Additionally calls `alert` for every loss alert the monitor raises.
    pub fn on_loss_alert(&self, alert: LossAlert) {
        *self.alert_hook.write() = Some(alert);
    }

    pub fn monitor(&self) -> &Arc<IngestMonitor> {
        &self.monitor
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }

    pub fn adapter(&self) -> &'static str {
        self.ingestor.name()
    }

    /// Runs until `shutdown` is cancelled, then stops every worker and
    /// publishes one last report.
    #[instrument(level = "info", name = "probe", skip_all)]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), RuntimeError> {
        let mut lifecycle = Lifecycle::with_token(shutdown.child_token(), Handle::current());
        if let Err(e) = self.start(&mut lifecycle) {
            lifecycle.shutdown().await;
            return Err(e);
        }

        let period = self.config.monitor.stats_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.report(),
            }
        }

        info!("shutting down");
        lifecycle.shutdown().await;
        self.report();
        info!(pool = %self.pool.stats(), "probe stopped");
        Ok(())
    }

    fn start(&mut self, lifecycle: &mut Lifecycle) -> Result<(), RuntimeError> {
        if let Some(reorderer) = &self.reorderer {
            lifecycle.track(reorderer.start(lifecycle.child_token())?);
            if let Some(samples) = reorderer.metric_stream() {
                let relay =
                    ReOrdererRelay::new(Arc::clone(&self.sink), &self.config.telemetry.namespace);
                let cancel = lifecycle.child_token();
                lifecycle.spawn(relay.run(samples, cancel));
            }
        }
        self.ingestor.start(lifecycle)?;
        info!(adapter = self.ingestor.name(), workers = lifecycle.workers(), "probe running");
        Ok(())
    }

    fn report(&self) {
        if let Err(e) = self.monitor.send_stats() {
            error!(error = %e, "statistics report aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tidvakt_simulator::{SimConfig, SimulatedKernel, StreamDigest};
    use tidvakt_telemetry::RecordingSink;

    fn config(use_ring_buffer: bool) -> TidvaktConfig {
        let mut config = TidvaktConfig::default();
        config.reorderer.flush_interval_ms = 10;
        config.reorderer.retention = 10;
        config.reorderer.metric_interval_ms = 50;
        config.monitor.stats_interval_ms = 100;
        config.ingest.use_ring_buffer = use_ring_buffer;
        config.ingest.dispatch_priority = 0;
        config
    }

    fn sim(loss_probability: f64) -> SimConfig {
        SimConfig {
            cpus: 4,
            events_per_sec: 2_000,
            poll_interval_ms: 2,
            jitter_ms: 3,
            loss_probability,
            ..Default::default()
        }
    }

    async fn run_for(probe: Probe, duration: Duration) {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(probe.run(shutdown.clone()));
        tokio::time::sleep(duration).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn per_cpu_pipeline_delivers_in_order() {
        let kernel = Arc::new(SimulatedKernel::new(sim(0.0)).with_perf_map("events", Some("events_stats")));
        let sink = Arc::new(RecordingSink::new());
        let digest = Arc::new(StreamDigest::new());
        let probe = Probe::new(config(false), kernel.clone(), digest.clone(), sink.clone()).unwrap();
        assert_eq!(probe.adapter(), "per_cpu");
        let pool = Arc::clone(probe.pool());

        run_for(probe, Duration::from_millis(400)).await;

        let summary = digest.summary();
        assert!(summary.delivered > 0);
        assert_eq!(summary.inversions, 0);
        assert_eq!(sink.total_count("tidvakt.perf_buffer.events.read"), summary.delivered);
        assert_eq!(sink.total_count("tidvakt.perf_buffer.sorting_error"), 0);
        let written = kernel.stats("events_stats").unwrap().totals().count;
        assert_eq!(sink.total_count("tidvakt.perf_buffer.events.write"), written);
        assert!(sink.last_gauge("tidvakt.reorderer.queue_size").is_some());
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ring_pipeline_skips_reorderer() {
        let kernel = Arc::new(SimulatedKernel::new(sim(0.0)).with_ring_map(
            "events",
            4 << 20,
            Some("events_stats"),
        ));
        let sink = Arc::new(RecordingSink::new());
        let digest = Arc::new(StreamDigest::new());
        let probe = Probe::new(config(true), kernel, digest.clone(), sink.clone()).unwrap();
        assert_eq!(probe.adapter(), "single_buffer");

        run_for(probe, Duration::from_millis(300)).await;

        let summary = digest.summary();
        assert!(summary.delivered > 0);
        assert_eq!(summary.inversions, 0);
        assert!(sink.last_gauge("tidvakt.ring_buffer.usage").is_some());
        assert!(sink.last_gauge("tidvakt.reorderer.queue_size").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn losses_are_counted_and_alerted() {
        let kernel = Arc::new(SimulatedKernel::new(sim(0.3)).with_perf_map("events", Some("events_stats")));
        let sink = Arc::new(RecordingSink::new());
        let probe = Probe::new(
            config(false),
            kernel.clone(),
            Arc::new(StreamDigest::new()),
            sink.clone(),
        )
        .unwrap();
        let alerted = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&alerted);
        probe.on_loss_alert(Arc::new(move |map: &str, lost: u64| {
            assert_eq!(map, "events");
            counter.fetch_add(lost, Ordering::Relaxed);
        }));

        run_for(probe, Duration::from_millis(300)).await;

        let kernel_lost = kernel.stats("events_stats").unwrap().totals().lost;
        assert!(kernel_lost > 0);
        assert_eq!(sink.total_count("tidvakt.perf_buffer.events.lost"), kernel_lost);
        assert_eq!(sink.total_count("tidvakt.perf_buffer.lost_user"), kernel_lost);
        assert_eq!(alerted.load(Ordering::Relaxed), kernel_lost);
    }

    #[tokio::test]
    async fn missing_event_map_is_fatal() {
        let kernel = Arc::new(SimulatedKernel::new(sim(0.0)).with_perf_map("other", None));
        let result = Probe::new(
            config(false),
            kernel.clone(),
            Arc::new(StreamDigest::new()),
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(result, Err(RuntimeError::Ingest(_))));

        let result = Probe::new(
            config(true),
            kernel,
            Arc::new(StreamDigest::new()),
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(result, Err(RuntimeError::Kernel(_))));
    }
}
