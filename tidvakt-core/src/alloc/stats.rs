//! ## tidvakt-core::alloc::stats
//! **Record pool usage counters**

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters are updated with relaxed atomics from any thread touching the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    allocations: AtomicU64,
    reuses: AtomicU64,
    releases: AtomicU64,
    discards: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Buffers allocated because the pool was empty.
    pub allocations: u64,
    /// Buffers handed out from the idle set.
    pub reuses: u64,
    /// Buffers taken back into the idle set.
    pub releases: u64,
    /// Buffers dropped because the idle set was full.
    pub discards: u64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_allocations(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reuses(&self) {
        self.reuses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_releases(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_discards(&self) {
        self.discards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
        }
    }
}

impl PoolStatsSnapshot {
    /// Buffers currently handed out and not yet returned or discarded.
    pub fn outstanding(&self) -> u64 {
        (self.allocations + self.reuses).saturating_sub(self.releases + self.discards)
    }
}

impl std::fmt::Display for PoolStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "allocated={} reused={} released={} discarded={}",
            self.allocations, self.reuses, self.releases, self.discards
        )
    }
}
