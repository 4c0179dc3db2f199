//! Priority Heap
//!
//! The dirty heap holds the nodes that need to recompute during the next
//! flush, bucketed by height. Draining the heap in ascending height order is
//! what makes updates glitch-free: a node only runs once everything below it
//! has already settled.
//!
//! # Removal
//!
//! Removal is lazy. `remove` only clears the `IN_HEAP` flag; the queued entry
//! stays in its bucket as a tombstone and is skipped when popped. Since
//! `insert` refuses nodes whose `IN_HEAP` flag is set, a live node has at most
//! one non-tombstone entry at any time.

use std::collections::VecDeque;
use std::sync::Arc;

use super::node::{GraphNode, DISPOSED, IN_HEAP};

/// Initial number of height buckets. Grows on demand for deeper graphs.
const INITIAL_BUCKETS: usize = 64;

/// A height-indexed queue of dirty nodes.
///
/// Each bucket is FIFO, so nodes at the same height run in insertion order.
pub struct PriorityHeap<N: GraphNode> {
    buckets: Vec<VecDeque<Arc<N>>>,
    min: usize,
    max: usize,
}

impl<N: GraphNode> PriorityHeap<N> {
    /// Create a new empty heap.
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(INITIAL_BUCKETS);
        buckets.resize_with(INITIAL_BUCKETS, VecDeque::new);
        Self {
            buckets,
            min: 0,
            max: 0,
        }
    }

    /// Queue a node at its current height.
    ///
    /// No-op when the node is already queued or disposed.
    pub fn insert(&mut self, node: Arc<N>) {
        if node.has_flag(IN_HEAP) || node.has_flag(DISPOSED) {
            return;
        }
        node.add_flag(IN_HEAP);

        let height = node.height() as usize;
        if height >= self.buckets.len() {
            self.buckets.resize_with(height + 1, VecDeque::new);
        }
        self.buckets[height].push_back(node);

        if height > self.max {
            self.max = height;
        }
        if height < self.min {
            self.min = height;
        }
    }

    /// Queue every node in the iterator.
    pub fn insert_all(&mut self, nodes: impl IntoIterator<Item = Arc<N>>) {
        for node in nodes {
            self.insert(node);
        }
    }

    /// Unqueue a node. The bucket entry becomes a tombstone.
    pub fn remove(&mut self, node: &N) {
        node.remove_flag(IN_HEAP);
    }

    /// Pop the queued node with the smallest height, clearing its `IN_HEAP`
    /// flag. Returns `None` once the heap is empty and resets the height
    /// hints so the next flush starts at 0.
    ///
    /// The scan restarts from `min` on every call, so nodes inserted at or
    /// below the current height while processing are still returned.
    pub fn pop(&mut self) -> Option<Arc<N>> {
        let mut height = self.min;
        while height <= self.max {
            while let Some(node) = self.buckets[height].pop_front() {
                if !node.has_flag(IN_HEAP) {
                    // tombstone
                    continue;
                }
                node.remove_flag(IN_HEAP);
                self.min = height;
                return Some(node);
            }
            height += 1;
        }

        self.min = 0;
        self.max = 0;
        None
    }

    /// Drain the heap in ascending height order, calling `process` on each
    /// node. `process` may insert more nodes, including at heights already
    /// passed; they are still drained.
    pub fn drain(&mut self, mut process: impl FnMut(Arc<N>)) {
        while let Some(node) = self.pop() {
            process(node);
        }
    }

    /// Number of queued entries, tombstones included.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    /// Check whether no entries are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<N: GraphNode> Default for PriorityHeap<N> {
    fn default() -> Self {
        Self::new()
    }
}
