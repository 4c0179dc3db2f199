//! Dependency Graph
//!
//! The erased layer underneath the reactive primitives: node identity and
//! flags, the height-ordered dirty heap, and the flush scheduler with its
//! logical clock. Nothing here knows about values or closures; the
//! `reactive` module plugs its node types in through the [`GraphNode`] trait.

pub mod heap;
pub mod node;
pub mod scheduler;

pub use heap::PriorityHeap;
pub use node::{GraphNode, NodeFlags, NodeId};
pub use scheduler::{RuntimeError, Scheduler, Tick, MAX_FLUSH_ITERATIONS};
