//! ## tidvakt-core::alloc::pool
//! **Reusable record buffers**
//!
//! Producers take a buffer with [`RecordPool::get`], fill it and hand it down
//! the pipeline; whoever delivers the record gives it back with
//! [`RecordPool::release`]. The pool keeps at most `capacity` idle buffers and
//! lets any surplus drop.

use std::sync::Arc;

use bytes::BytesMut;
use concurrent_queue::ConcurrentQueue;

use super::stats::{PoolStats, PoolStatsSnapshot};
use crate::events::RawRecord;

pub struct RecordPool {
    free: ConcurrentQueue<BytesMut>,
    record_size: usize,
    stats: PoolStats,
}

impl RecordPool {
    /// Creates a pool retaining up to `capacity` idle buffers, each starting
    /// with room for `record_size` bytes.
    pub fn new(capacity: usize, record_size: usize) -> Arc<Self> {
        Arc::new(Self {
            free: ConcurrentQueue::bounded(capacity.max(1)),
            record_size,
            stats: PoolStats::new(),
        })
    }

    /// Returns an empty buffer, reusing an idle one when available.
    #[inline]
    pub fn get(&self) -> BytesMut {
        match self.free.pop() {
            Ok(mut buf) => {
                buf.clear();
                self.stats.increment_reuses();
                buf
            }
            Err(_) => {
                self.stats.increment_allocations();
                BytesMut::with_capacity(self.record_size)
            }
        }
    }

    /// Takes a buffer and fills it with a copy of `payload`.
    #[inline]
    pub fn fill(&self, cpu: u32, payload: &[u8]) -> RawRecord {
        let mut data = self.get();
        data.extend_from_slice(payload);
        RawRecord { cpu, data }
    }

    #[inline]
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        match self.free.push(buf) {
            Ok(()) => self.stats.increment_releases(),
            Err(_) => self.stats.increment_discards(),
        }
    }

    #[inline]
    pub fn release_record(&self, record: RawRecord) {
        self.release(record.data);
    }

    /// Number of idle buffers currently retained.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for RecordPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPool")
            .field("idle", &self.free.len())
            .field("record_size", &self.record_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_buffer_is_empty() {
        let pool = RecordPool::new(4, 64);
        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 64);
        assert_eq!(pool.stats().allocations, 1);
    }

    #[test]
    fn released_buffer_is_reused_and_cleared() {
        let pool = RecordPool::new(4, 64);
        let record = pool.fill(3, b"payload");
        assert_eq!(record.cpu, 3);
        assert_eq!(&record.data[..], b"payload");
        pool.release_record(record);
        assert_eq!(pool.idle(), 1);

        let buf = pool.get();
        assert!(buf.is_empty());
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn surplus_buffers_are_discarded() {
        let pool = RecordPool::new(2, 8);
        let bufs: Vec<_> = (0..3).map(|_| pool.get()).collect();
        for buf in bufs {
            pool.release(buf);
        }
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.stats().discards, 1);
    }

    #[test]
    fn concurrent_get_release() {
        let pool = RecordPool::new(64, 32);
        let handles: Vec<_> = (0..4)
            .map(|cpu| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..1000u32 {
                        let record = pool.fill(cpu, &i.to_ne_bytes());
                        assert_eq!(record.data.len(), 4);
                        pool.release_record(record);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.allocations + stats.reuses, 4000);
        assert_eq!(stats.releases + stats.discards, 4000);
        assert!(pool.idle() <= 64);
    }
}
