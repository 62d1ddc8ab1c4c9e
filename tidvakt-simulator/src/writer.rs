//! Record generation on the kernel side of a simulated buffer.

use std::sync::Arc;

use bytes::BytesMut;
use rand::rngs::SmallRng;
use rand::Rng;
use tidvakt_core::events::{EventHeader, HEADER_LEN};

use crate::models::LossModel;
use crate::stats::SimStatsTable;

pub(crate) struct RecordWriter {
    event_types: u32,
    payload_len: usize,
    rng: SmallRng,
    loss: LossModel,
    stats: Option<Arc<SimStatsTable>>,
    buf: BytesMut,
    /// Fractional record owed from the previous batch.
    carry: f64,
}

impl RecordWriter {
    pub fn new(
        event_types: u32,
        payload_len: usize,
        rng: SmallRng,
        loss: LossModel,
        stats: Option<Arc<SimStatsTable>>,
    ) -> Self {
        Self {
            event_types: event_types.max(1),
            payload_len,
            rng,
            loss,
            stats,
            buf: BytesMut::with_capacity(HEADER_LEN + payload_len),
            carry: 0.0,
        }
    }

    /// Records a source producing `rate` records per second writes between
    /// `from` and `to` (nanoseconds).
    pub fn due(&mut self, from: u64, to: u64, rate: u64) -> u64 {
        let owed = to.saturating_sub(from) as f64 * rate as f64 / 1e9 + self.carry;
        let n = owed.floor();
        self.carry = owed - n;
        n as u64
    }

    /// Picks the CPU for the next record of a shared buffer.
    pub fn pick_cpu(&mut self, cpus: usize) -> u64 {
        self.rng.random_range(0..cpus.max(1)) as u64
    }

    /// Size of every record this writer produces.
    pub fn record_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Counts a record the buffer had no room for.
    pub fn reject(&mut self, cpu: u64) {
        let event_type = self.rng.random_range(0..self.event_types);
        if let Some(stats) = &self.stats {
            stats.record_lost(cpu as usize, event_type);
        }
    }

    /// Writes one record stamped `timestamp` and hands it to `emit`. Returns
    /// `false` if the kernel dropped it instead.
    pub fn write(&mut self, cpu: u64, timestamp: u64, mut emit: impl FnMut(&[u8])) -> bool {
        if self.loss.should_drop() {
            self.reject(cpu);
            return false;
        }

        let event_type = self.rng.random_range(0..self.event_types);
        self.buf.clear();
        EventHeader::new(cpu, timestamp, event_type).write_to(&mut self.buf);
        self.buf.resize(self.record_len(), 0);
        self.rng.fill(&mut self.buf[HEADER_LEN..]);

        if let Some(stats) = &self.stats {
            stats.record_write(cpu as usize, event_type, self.buf.len());
        }
        emit(&self.buf);
        true
    }
}

/// Timestamp of record `i` out of `n` spread evenly over `(from, to]`.
#[inline]
pub(crate) fn spread(from: u64, to: u64, i: u64, n: u64) -> u64 {
    let span = to.saturating_sub(from);
    (from + span * (i + 1) / n.max(1)).max(1)
}
