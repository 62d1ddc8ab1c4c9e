//! Handler wrapper feeding the monitor.

use std::sync::Arc;

use tidvakt_core::events::{EventHandler, EventHeader};
use tidvakt_monitor::IngestMonitor;
use tracing::trace;

/// Accounts every delivered record with the monitor, then forwards it.
/// Sorting violations are therefore measured on the stream the downstream
/// handler actually sees.
pub struct CountingHandler {
    inner: Arc<dyn EventHandler>,
    monitor: Arc<IngestMonitor>,
    map: String,
}

impl CountingHandler {
    pub fn new(inner: Arc<dyn EventHandler>, monitor: Arc<IngestMonitor>, map: &str) -> Self {
        Self {
            inner,
            monitor,
            map: map.to_owned(),
        }
    }
}

impl EventHandler for CountingHandler {
    fn handle_event(&self, cpu: u32, payload: &[u8]) {
        match EventHeader::parse(payload) {
            Some(header) => self.monitor.count_event(
                header.event_type,
                header.timestamp,
                1,
                payload.len() as u64,
                &self.map,
                cpu,
            ),
            None => trace!(cpu, len = payload.len(), "record without event header"),
        }
        self.inner.handle_event(cpu, payload);
    }
}
