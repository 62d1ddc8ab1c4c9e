//! ## tidvakt-core::reorder::heap
//! **Generation-windowed min-heap over pooled nodes**
//!
//! Nodes live in an index-based arena and are recycled through an intrusive
//! free list, so steady-state enqueue/dequeue never allocates. A node is free
//! when its timestamp is zero.
//!
//! The heap is ordered by timestamp. Generation tags are not pinned to the
//! records: the heap keeps a count of outstanding records per generation and
//! the root always answers for the oldest one. Each release consumes one unit
//! of the oldest outstanding generation, so [`ReorderHeap::dequeue`] never
//! stalls behind a freshly tagged root while older records are still queued,
//! and records still leave in timestamp order.

use std::collections::BTreeMap;

use crate::events::RawRecord;

pub type NodeId = usize;

#[derive(Debug)]
struct Node {
    record: Option<RawRecord>,
    timestamp: u64,
    next_free: Option<NodeId>,
}

/// Arena of heap nodes with an O(1) free list.
#[derive(Debug, Default)]
pub struct NodePool {
    nodes: Vec<Node>,
    free: Option<NodeId>,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a free node, growing the arena only when the free list is empty.
    fn alloc(&mut self, record: RawRecord, timestamp: u64) -> NodeId {
        debug_assert_ne!(timestamp, 0, "zero timestamp marks a free node");
        match self.free {
            Some(id) => {
                let node = &mut self.nodes[id];
                debug_assert_eq!(node.timestamp, 0);
                self.free = node.next_free.take();
                node.record = Some(record);
                node.timestamp = timestamp;
                id
            }
            None => {
                self.nodes.push(Node {
                    record: Some(record),
                    timestamp,
                    next_free: None,
                });
                self.nodes.len() - 1
            }
        }
    }

    /// Returns a node to the free list and hands back its record.
    fn free(&mut self, id: NodeId) -> Option<RawRecord> {
        let node = &mut self.nodes[id];
        node.timestamp = 0;
        node.next_free = self.free;
        self.free = Some(id);
        node.record.take()
    }

    /// Nodes ever allocated, free or not.
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free;
        while let Some(id) = cursor {
            count += 1;
            cursor = self.nodes[id].next_free;
        }
        count
    }
}

/// Operation counters accumulated between two metric samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapOps {
    pub total_op: u64,
    pub total_depth: u64,
}

#[derive(Debug, Default)]
pub struct ReorderHeap {
    pool: NodePool,
    heap: Vec<NodeId>,
    /// Records still queued per arrival generation.
    outstanding: BTreeMap<u64, usize>,
    ops: HeapOps,
}

impl ReorderHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Capacity of the backing array.
    pub fn capacity(&self) -> usize {
        self.heap.capacity()
    }

    pub fn nodes(&self) -> &NodePool {
        &self.pool
    }

    /// Inserts a record tagged with `generation`. `timestamp` must be non-zero.
    pub fn enqueue(&mut self, record: RawRecord, timestamp: u64, generation: u64) {
        let id = self.pool.alloc(record, timestamp);
        self.heap.push(id);
        *self.outstanding.entry(generation).or_default() += 1;
        self.ops.total_op += 1;
        let last = self.heap.len() - 1;
        self.sift_up(last);
    }

    /// Pops roots in timestamp order while the oldest outstanding generation
    /// is at or below `max_generation`, handing each record to `deliver`.
    /// Returns the count.
    pub fn dequeue<F>(&mut self, max_generation: u64, mut deliver: F) -> usize
    where
        F: FnMut(RawRecord),
    {
        let mut released = 0;
        while let Some(mut oldest) = self.outstanding.first_entry() {
            if *oldest.key() > max_generation {
                break;
            }
            let left = oldest.get_mut();
            *left -= 1;
            if *left == 0 {
                oldest.remove();
            }
            if let Some(id) = self.pop() {
                if let Some(record) = self.pool.free(id) {
                    deliver(record);
                    released += 1;
                }
            }
        }
        released
    }

    /// Empties the heap in timestamp order regardless of generation.
    pub fn drain<F>(&mut self, mut deliver: F) -> usize
    where
        F: FnMut(RawRecord),
    {
        self.dequeue(u64::MAX, &mut deliver)
    }

    /// Reallocates the backing array once its spare capacity exceeds `delta`.
    pub fn shrink(&mut self, delta: usize) -> bool {
        if self.heap.capacity() - self.heap.len() > delta {
            self.heap.shrink_to_fit();
            true
        } else {
            false
        }
    }

    /// Returns the counters since the last call and resets them.
    pub fn take_ops(&mut self) -> HeapOps {
        std::mem::take(&mut self.ops)
    }

    fn pop(&mut self) -> Option<NodeId> {
        let last = self.heap.len().checked_sub(1)?;
        self.heap.swap(0, last);
        let id = self.heap.pop()?;
        self.ops.total_op += 1;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(id)
    }

    #[inline]
    fn timestamp_at(&self, pos: usize) -> u64 {
        self.pool.nodes[self.heap[pos]].timestamp
    }

    fn swap(&mut self, parent: usize, child: usize) {
        self.heap.swap(parent, child);
        self.ops.total_depth += 1;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.timestamp_at(parent) <= self.timestamp_at(pos) {
                break;
            }
            self.swap(parent, pos);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.timestamp_at(right) < self.timestamp_at(left) {
                smallest = right;
            }
            if self.timestamp_at(pos) <= self.timestamp_at(smallest) {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn record(timestamp: u64) -> RawRecord {
        RawRecord::new(0, BytesMut::from(&timestamp.to_ne_bytes()[..]))
    }

    fn stamp(record: &RawRecord) -> u64 {
        u64::from_ne_bytes(record.data[..8].try_into().unwrap())
    }

    #[test]
    fn releases_in_timestamp_order() {
        let mut rng = SmallRng::seed_from_u64(0x7169);
        let mut heap = ReorderHeap::new();
        for _ in 0..200 {
            let ts = rng.random_range(1..=255u64);
            heap.enqueue(record(ts), ts, 1);
        }

        let mut out = Vec::new();
        let released = heap.dequeue(1, |r| out.push(stamp(&r)));
        assert_eq!(released, 200);
        assert_eq!(out.len(), 200);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert!(heap.is_empty());
    }

    #[test]
    fn retention_window_partitions_releases() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut heap = ReorderHeap::new();
        for generation in 1..=3u64 {
            let mut stamps: Vec<u64> = (1..=30).map(|i| (generation - 1) * 30 + i).collect();
            stamps.shuffle(&mut rng);
            for ts in stamps {
                heap.enqueue(record(ts), ts, generation);
            }
        }

        let mut out = Vec::new();
        heap.dequeue(0, |r| out.push(stamp(&r)));
        assert!(out.is_empty());
        heap.dequeue(1, |r| out.push(stamp(&r)));
        assert_eq!(out.len(), 30);
        heap.dequeue(2, |r| out.push(stamp(&r)));
        assert_eq!(out.len(), 60);
        heap.dequeue(3, |r| out.push(stamp(&r)));
        assert_eq!(out.len(), 90);
        assert_eq!(out, (1..=90).collect::<Vec<_>>());
    }

    #[test]
    fn older_generation_released_first() {
        let mut heap = ReorderHeap::new();
        heap.enqueue(record(20), 20, 2);
        heap.enqueue(record(10), 10, 1);

        let mut out = Vec::new();
        heap.dequeue(1, |r| out.push(stamp(&r)));
        assert_eq!(out, vec![10]);
        heap.dequeue(2, |r| out.push(stamp(&r)));
        assert_eq!(out, vec![10, 20]);
    }

    #[test]
    fn older_generation_behind_newer_root_is_not_held() {
        let mut heap = ReorderHeap::new();
        heap.enqueue(record(10), 10, 2);
        heap.enqueue(record(20), 20, 1);

        let mut out = Vec::new();
        assert_eq!(heap.dequeue(0, |r| out.push(stamp(&r))), 0);
        assert_eq!(heap.dequeue(1, |r| out.push(stamp(&r))), 1);
        assert_eq!(out, vec![10]);
        assert_eq!(heap.dequeue(2, |r| out.push(stamp(&r))), 1);
        assert_eq!(out, vec![10, 20]);
        assert!(heap.is_empty());
    }

    #[test]
    fn mixed_generations_release_per_generation_count() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut heap = ReorderHeap::new();
        let mut per_gen = [0usize; 4];
        for _ in 0..300 {
            let ts = rng.random_range(1..=10_000u64);
            let generation = rng.random_range(0..4u64);
            per_gen[generation as usize] += 1;
            heap.enqueue(record(ts), ts, generation);
        }

        let mut out = Vec::new();
        let mut expected = 0;
        for (generation, count) in per_gen.iter().enumerate() {
            expected += count;
            heap.dequeue(generation as u64, |r| out.push(stamp(&r)));
            assert_eq!(out.len(), expected);
        }
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn late_small_timestamp_takes_the_older_slot() {
        let mut heap = ReorderHeap::new();
        heap.enqueue(record(10), 10, 1);
        heap.enqueue(record(5), 5, 4);

        // The late, small timestamp leaves on generation 1's turn.
        let mut out = Vec::new();
        heap.dequeue(1, |r| out.push(stamp(&r)));
        assert_eq!(out, vec![5]);
        assert_eq!(heap.len(), 1);
        heap.dequeue(3, |r| out.push(stamp(&r)));
        assert_eq!(out, vec![5]);
        heap.dequeue(4, |r| out.push(stamp(&r)));
        assert_eq!(out, vec![5, 10]);
    }

    #[test]
    fn nodes_are_recycled() {
        let mut heap = ReorderHeap::new();
        for ts in 1..=64 {
            heap.enqueue(record(ts), ts, 0);
        }
        assert_eq!(heap.drain(drop), 64);
        assert_eq!(heap.nodes().allocated(), 64);
        assert_eq!(heap.nodes().free_count(), 64);

        for ts in 1..=64 {
            heap.enqueue(record(ts), ts, 0);
        }
        assert_eq!(heap.nodes().allocated(), 64);
        assert_eq!(heap.nodes().free_count(), 0);
    }

    #[test]
    fn ops_are_counted_and_reset() {
        let mut heap = ReorderHeap::new();
        heap.enqueue(record(3), 3, 0);
        heap.enqueue(record(2), 2, 0);
        heap.enqueue(record(1), 1, 0);
        let ops = heap.take_ops();
        assert_eq!(ops.total_op, 3);
        assert_eq!(ops.total_depth, 2);
        assert_eq!(heap.take_ops(), HeapOps::default());

        heap.drain(drop);
        assert_eq!(heap.take_ops().total_op, 3);
    }

    #[test]
    fn shrink_only_past_delta() {
        let mut heap = ReorderHeap::new();
        for ts in 1..=1000 {
            heap.enqueue(record(ts), ts, 0);
        }
        heap.drain(drop);
        assert!(!heap.shrink(usize::MAX));
        assert!(heap.shrink(10));
        assert!(heap.capacity() <= 10);
    }

    proptest! {
        #[test]
        fn single_generation_is_sorted(stamps in prop::collection::vec(1u64..u64::MAX, 0..500)) {
            let mut heap = ReorderHeap::new();
            for &ts in &stamps {
                heap.enqueue(record(ts), ts, 7);
            }
            let mut out = Vec::new();
            heap.dequeue(7, |r| out.push(stamp(&r)));

            let mut expected = stamps.clone();
            expected.sort_unstable();
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn every_node_returns_to_the_free_list(
            entries in prop::collection::vec((1u64..10_000, 0u64..8), 1..300),
            target in 0u64..8,
        ) {
            let mut heap = ReorderHeap::new();
            for &(ts, generation) in &entries {
                heap.enqueue(record(ts), ts, generation);
            }
            let released = heap.dequeue(target, drop);
            let remaining = heap.drain(drop);
            prop_assert_eq!(released + remaining, entries.len());
            prop_assert!(heap.nodes().free_count() == heap.nodes().allocated());
        }
    }
}
