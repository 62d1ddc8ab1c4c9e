//! Delivered stream summary.

use std::fmt;

use blake3::Hasher;
use parking_lot::Mutex;
use tidvakt_core::events::{EventHandler, QuickInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSummary {
    pub delivered: u64,
    /// Records whose timestamp was below the one delivered before them.
    pub inversions: u64,
    pub hash: blake3::Hash,
}

impl fmt::Display for DigestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={} inversions={} blake3={}",
            self.delivered,
            self.inversions,
            self.hash.to_hex()
        )
    }
}

#[derive(Default)]
struct State {
    hasher: Hasher,
    delivered: u64,
    inversions: u64,
    last_timestamp: u64,
}

/// Terminal handler that hashes every delivered payload in delivery order
/// and checks the timestamps are non-decreasing.
#[derive(Default)]
pub struct StreamDigest {
    state: Mutex<State>,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> DigestSummary {
        let state = self.state.lock();
        DigestSummary {
            delivered: state.delivered,
            inversions: state.inversions,
            hash: state.hasher.finalize(),
        }
    }
}

impl EventHandler for StreamDigest {
    fn handle_event(&self, _cpu: u32, payload: &[u8]) {
        let mut state = self.state.lock();
        state.hasher.update(payload);
        state.delivered += 1;
        if let Some(info) = QuickInfo::extract(payload) {
            if info.timestamp < state.last_timestamp {
                state.inversions += 1;
            }
            state.last_timestamp = info.timestamp;
        }
    }
}
