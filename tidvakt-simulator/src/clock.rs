//! # Simulated kernel clock
//!
//! Monotonic nanosecond timestamps shared by every simulated CPU.
//!
//! ## Expectations:
//! - Strictly increasing across all callers
//! - Never returns zero
//! - Lock‑free operations

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct KernelClock {
    start: Instant,
    last: AtomicU64,
}

impl KernelClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    /// Current time in nanoseconds since the clock was created. Two calls
    /// never return the same value.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        let elapsed = self.start.elapsed().as_nanos() as u64 + 1;
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(elapsed.max(last + 1))
            })
            .unwrap_or(0);
        elapsed.max(previous + 1)
    }
}

impl Default for KernelClock {
    fn default() -> Self {
        Self::new()
    }
}
