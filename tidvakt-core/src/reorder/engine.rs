//! ## tidvakt-core::reorder::engine
//! **Single-owner reordering worker**
//!
//! Producers hand records over a bounded channel; a full channel stalls them.
//! One tokio task owns the [`ReorderHeap`] and reacts to record arrival, the
//! flush tick (which advances the generation) and the metric tick.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::heap::ReorderHeap;
use super::metric::ReOrdererMetric;
use crate::alloc::RecordPool;
use crate::error::ReorderError;
use crate::events::{EventHandler, RawRecord};

/// Heap size, as a multiple of the queue size, above which records bypass
/// the heap.
pub const SAFETY_VALVE_FACTOR: usize = 10;

#[derive(Debug, Clone)]
pub struct ReOrdererOptions {
    pub queue_size: usize,
    pub flush_interval: Duration,
    pub retention: u64,
    pub metric_interval: Duration,
    pub heap_shrink_delta: usize,
}

impl Default for ReOrdererOptions {
    fn default() -> Self {
        Self {
            queue_size: 10_000,
            flush_interval: Duration::from_millis(50),
            retention: 5,
            metric_interval: Duration::from_secs(5),
            heap_shrink_delta: 1_000,
        }
    }
}

pub struct ReOrderer {
    tx: mpsc::Sender<RawRecord>,
    pool: Arc<RecordPool>,
    worker: Mutex<Option<Worker>>,
    metrics: Mutex<Option<mpsc::Receiver<ReOrdererMetric>>>,
}

impl ReOrderer {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        pool: Arc<RecordPool>,
        options: ReOrdererOptions,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_size.max(1));
        let (metric_tx, metric_rx) = mpsc::channel(1);
        let worker = Worker {
            rx,
            metric_tx,
            handler,
            pool: Arc::clone(&pool),
            heap: ReorderHeap::new(),
            generation: 0,
            last_timestamp: 0,
            options,
        };
        Self {
            tx,
            pool,
            worker: Mutex::new(Some(worker)),
            metrics: Mutex::new(Some(metric_rx)),
        }
    }

    /// Queues a record, waiting while the queue is full.
    pub async fn submit(&self, record: RawRecord) -> Result<(), ReorderError> {
        match self.tx.send(record).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(record)) => self.reject(record),
        }
    }

    /// Blocking variant of [`submit`](Self::submit) for producer threads
    /// outside the async runtime.
    pub fn submit_blocking(&self, record: RawRecord) -> Result<(), ReorderError> {
        match self.tx.blocking_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(record)) => self.reject(record),
        }
    }

    fn reject(&self, record: RawRecord) -> Result<(), ReorderError> {
        trace!(cpu = record.cpu, "reorderer closed, record returned to pool");
        self.pool.release_record(record);
        Err(ReorderError::Closed)
    }

    /// Spawns the worker on the current tokio runtime. The worker exits when
    /// `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, ReorderError> {
        let worker = self.worker.lock().take().ok_or(ReorderError::AlreadyStarted)?;
        Ok(tokio::spawn(worker.run(cancel)))
    }

    /// Takes the metric stream. Only the first caller gets it.
    pub fn metric_stream(&self) -> Option<mpsc::Receiver<ReOrdererMetric>> {
        self.metrics.lock().take()
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }
}

struct Worker {
    rx: mpsc::Receiver<RawRecord>,
    metric_tx: mpsc::Sender<ReOrdererMetric>,
    handler: Arc<dyn EventHandler>,
    pool: Arc<RecordPool>,
    heap: ReorderHeap,
    generation: u64,
    last_timestamp: u64,
    options: ReOrdererOptions,
}

impl Worker {
    async fn run(mut self, cancel: CancellationToken) {
        let now = Instant::now();
        let flush_period = self.options.flush_interval;
        let metric_period = self.options.metric_interval;
        let mut flush = interval_at(now + flush_period, flush_period);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut metric = interval_at(now + metric_period, metric_period);
        metric.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            queue_size = self.options.queue_size,
            retention = self.options.retention,
            flush_ms = flush_period.as_millis() as u64,
            "reorderer started"
        );

        // Ticks are polled before the queue so a saturated queue cannot
        // starve generation advancement.
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = flush.tick() => {
                    self.generation += 1;
                    self.release();
                }
                _ = metric.tick() => self.sample(),
                received = self.rx.recv() => match received {
                    Some(record) => self.on_record(record),
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(record) = self.rx.try_recv() {
            self.pool.release_record(record);
        }
        let pool = Arc::clone(&self.pool);
        let dropped = self.heap.drain(|record| pool.release_record(record));
        debug!(dropped, generation = self.generation, "reorderer stopped");
    }

    fn on_record(&mut self, record: RawRecord) {
        let Some(info) = record.quick_info() else {
            trace!(cpu = record.cpu, len = record.data.len(), "short record dropped");
            self.pool.release_record(record);
            return;
        };

        let timestamp = if info.timestamp == 0 {
            self.last_timestamp
        } else {
            info.timestamp
        };
        if timestamp == 0 {
            trace!(cpu = record.cpu, "record without timestamp dropped");
            self.pool.release_record(record);
            return;
        }
        self.last_timestamp = timestamp;

        if self.heap.len() > self.options.queue_size * SAFETY_VALVE_FACTOR {
            trace!(heap = self.heap.len(), "heap overloaded, delivering directly");
            self.deliver(record);
            return;
        }

        self.heap.enqueue(record, timestamp, self.generation);
        self.release();
    }

    fn release(&mut self) {
        let Some(threshold) = self.generation.checked_sub(self.options.retention) else {
            return;
        };
        let handler = &self.handler;
        let pool = &self.pool;
        self.heap.dequeue(threshold, |record| {
            handler.handle_event(record.cpu, &record.data);
            pool.release_record(record);
        });
        self.heap.shrink(self.options.heap_shrink_delta);
    }

    fn deliver(&self, record: RawRecord) {
        self.handler.handle_event(record.cpu, &record.data);
        self.pool.release_record(record);
    }

    fn sample(&mut self) {
        let metric = ReOrdererMetric::new(self.heap.take_ops(), self.heap.len());
        if self.metric_tx.try_send(metric).is_err() {
            trace!("metric stream full, sample dropped");
        }
    }
}
