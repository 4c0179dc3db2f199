//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime: a dependency graph
//! of signals (mutable leaf values), memos (cached derivations), and effects
//! (side-effect runners), recomputed incrementally and glitch-free when
//! signals change.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the reactive primitives: signals, memos, effects, owners,
//!   batching, and the per-thread runtime that coordinates them
//! - `graph`: the erased dependency-graph layer: node identity and flags,
//!   the height-ordered dirty heap, and the flush scheduler
//!
//! Updates propagate in topological order (dependencies strictly before
//! dependents), staged values commit atomically at the end of each pass, and
//! effects observe only fully settled state. Each host thread gets its own
//! runtime; signals may still be shared across threads by value handles.
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{Signal, Memo, Effect};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let count_for_memo = count.clone();
//! let doubled = Memo::new(move || count_for_memo.get() * 2);
//!
//! // Create an effect
//! let count_for_effect = count.clone();
//! Effect::new(move || {
//!     println!("Count: {}, Doubled: {}", count_for_effect.get(), doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod graph;
pub mod reactive;
