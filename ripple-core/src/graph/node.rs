//! Graph Nodes
//!
//! This module defines the erased "node face" that the scheduler and the
//! priority heap see: a stable identifier, a topological height, and a small
//! word of state flags. The concrete reactive types (signals, memos, effects)
//! implement [`GraphNode`] and carry the rest of their payload themselves.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Bitset of node state flags.
pub type NodeFlags = u32;

/// The node is currently queued in the dirty heap.
pub const IN_HEAP: NodeFlags = 1 << 0;

/// The effect is already queued on its lane for this flush pass.
pub const ENQUEUED: NodeFlags = 1 << 1;

/// The node's computation is running right now. A dirty-heap visit that
/// lands on a node mid-compute is skipped instead of re-entered.
pub const RECOMPUTING: NodeFlags = 1 << 2;

/// The node has been disposed and never runs again. Queued heap entries for
/// a disposed node become tombstones.
pub const DISPOSED: NodeFlags = 1 << 3;

/// The scheduler-facing face of a reactive node.
///
/// The heap orders nodes by `height` and mirrors queue membership in the
/// `IN_HEAP` flag; everything else about a node is opaque at this layer.
pub trait GraphNode {
    /// Get the node's ID.
    fn id(&self) -> NodeId;

    /// The node's topological depth: 0 for source signals, one more than the
    /// deepest dependency for derived nodes. Heights only grow.
    fn height(&self) -> u32;

    /// Check if the given flag is set.
    fn has_flag(&self, flag: NodeFlags) -> bool;

    /// Set the given flag.
    fn add_flag(&self, flag: NodeFlags);

    /// Clear the given flag.
    fn remove_flag(&self, flag: NodeFlags);
}
