//! Per-CPU perf buffer adapter.
//!
//! Readers copy each record into a pool buffer and submit it to the
//! reorderer, blocking while its queue is full. Loss reports go to the
//! observer tagged with the map name.

use std::sync::Arc;

use tidvakt_config::IngestConfig;
use tidvakt_core::reorder::ReOrderer;
use tracing::{info, instrument, trace};

use super::{Ingestor, LossObserver};
use crate::error::IngestError;
use crate::kernel::{MapHandlers, MapRegistry, PerfMap};
use crate::lifecycle::Lifecycle;

pub struct PerCpuIngestor {
    reorderer: Arc<ReOrderer>,
    map: Option<Arc<dyn PerfMap>>,
    observer: Option<LossObserver>,
    started: bool,
}

impl PerCpuIngestor {
    pub fn new(reorderer: Arc<ReOrderer>) -> Self {
        Self {
            reorderer,
            map: None,
            observer: None,
            started: false,
        }
    }

    fn map(&self) -> Result<&Arc<dyn PerfMap>, IngestError> {
        self.map.as_ref().ok_or(IngestError::NotInitialized)
    }
}

impl Ingestor for PerCpuIngestor {
    fn init(
        &mut self,
        registry: &dyn MapRegistry,
        config: &IngestConfig,
    ) -> Result<(), IngestError> {
        let map = registry.perf_map(&config.events_map)?;
        info!(
            map = map.name(),
            pages = config.perf_buffer_pages,
            "perf buffer ingestor initialised"
        );
        self.map = Some(map);
        Ok(())
    }

    #[instrument(level = "info", name = "per_cpu_ingestor", skip_all)]
    fn start(&mut self, lifecycle: &mut Lifecycle) -> Result<(), IngestError> {
        if self.started {
            return Err(IngestError::AlreadyStarted);
        }
        let map = Arc::clone(self.map()?);

        let reorderer = Arc::clone(&self.reorderer);
        let on_record = Arc::new(move |cpu: u32, payload: &[u8]| {
            let record = reorderer.pool().fill(cpu, payload);
            if let Err(e) = reorderer.submit_blocking(record) {
                trace!(cpu, error = %e, "record not submitted");
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
        info!(map = map.name(), "perf buffer readers started");
        Ok(())
    }

    fn pause(&self) -> Result<(), IngestError> {
        Ok(self.map()?.pause()?)
    }

    fn resume(&self) -> Result<(), IngestError> {
        Ok(self.map()?.resume()?)
    }

    fn set_loss_observer(&mut self, observer: LossObserver) {
        self.observer = Some(observer);
    }
}
