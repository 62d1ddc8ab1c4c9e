//! Shared ring buffer adapter.
//!
//! The ring already delivers in global order, so records skip the reorderer.
//! The kernel callback copies each record into a pool buffer and pushes it on
//! a bounded queue, returning the kernel slot straight away. A dedicated
//! dispatch thread drains the queue into the handler.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use tidvakt_config::IngestConfig;
use tidvakt_core::alloc::RecordPool;
use tidvakt_core::events::{EventHandler, RawRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::{Ingestor, LossObserver};
use crate::error::IngestError;
use crate::kernel::{MapHandlers, MapRegistry, RingMap};
use crate::lifecycle::Lifecycle;
use crate::priority;

/// How often an idle dispatch thread checks for cancellation.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct DispatchSettings {
    queue_size: usize,
    cpu: Option<usize>,
    priority: i32,
}

pub struct RingIngestor {
    handler: Arc<dyn EventHandler>,
    pool: Arc<RecordPool>,
    map: Option<Arc<dyn RingMap>>,
    settings: Option<DispatchSettings>,
    observer: Option<LossObserver>,
    started: bool,
}

impl RingIngestor {
    pub fn new(handler: Arc<dyn EventHandler>, pool: Arc<RecordPool>) -> Self {
        Self {
            handler,
            pool,
            map: None,
            settings: None,
            observer: None,
            started: false,
        }
    }
}

impl Ingestor for RingIngestor {
    fn init(
        &mut self,
        registry: &dyn MapRegistry,
        config: &IngestConfig,
    ) -> Result<(), IngestError> {
        let map = registry.ring_map(&config.events_map)?;
        info!(map = map.name(), size = map.size(), "ring buffer ingestor initialised");
        self.map = Some(map);
        self.settings = Some(DispatchSettings {
            queue_size: config.dispatch_queue_size,
            cpu: config.dispatch_cpu,
            priority: config.dispatch_priority,
        });
        Ok(())
    }

    #[instrument(level = "info", name = "ring_ingestor", skip_all)]
    fn start(&mut self, lifecycle: &mut Lifecycle) -> Result<(), IngestError> {
        if self.started {
            return Err(IngestError::AlreadyStarted);
        }
        let (Some(map), Some(settings)) = (self.map.clone(), self.settings.clone()) else {
            return Err(IngestError::NotInitialized);
        };

        let (tx, rx) = channel::bounded::<RawRecord>(settings.queue_size.max(1));

        let handler = Arc::clone(&self.handler);
        let pool = Arc::clone(&self.pool);
        let cancel = lifecycle.child_token();
        lifecycle.spawn_thread("tidvakt-dispatch", move || {
            priority::elevate_current_thread(settings.cpu, settings.priority);
            dispatch(rx, handler, pool, cancel);
        })?;

        let pool = Arc::clone(&self.pool);
        let on_record = Arc::new(move |cpu: u32, payload: &[u8]| {
            let record = pool.fill(cpu, payload);
            if let Err(channel::SendError(record)) = tx.send(record) {
                trace!(cpu, "dispatch worker gone, record returned to pool");
                pool.release_record(record);
            }
        });

        let observer = self.observer.clone();
        let name = map.name().to_owned();
        let on_loss = Arc::new(move |count: u64, cpu: u32| {
            if let Some(observer) = &observer {
                observer(count, &name, cpu);
            }
        });

        map.start(MapHandlers { on_record, on_loss }, lifecycle)?;
        self.started = true;
        info!(map = map.name(), "ring buffer reader started");
        Ok(())
    }

    /// Ring buffers have no kernel-side pause.
    fn pause(&self) -> Result<(), IngestError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), IngestError> {
        Ok(())
    }

    fn set_loss_observer(&mut self, observer: LossObserver) {
        self.observer = Some(observer);
    }
}

fn dispatch(
    rx: Receiver<RawRecord>,
    handler: Arc<dyn EventHandler>,
    pool: Arc<RecordPool>,
    cancel: CancellationToken,
) {
    let mut delivered = 0u64;
    while !cancel.is_cancelled() {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(record) => {
                handler.handle_event(record.cpu, &record.data);
                pool.release_record(record);
                delivered += 1;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let mut dropped = 0u64;
    while let Ok(record) = rx.try_recv() {
        pool.release_record(record);
        dropped += 1;
    }
    debug!(delivered, dropped, "dispatch worker stopped");
}
