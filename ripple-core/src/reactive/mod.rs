//! Reactive Primitives
//!
//! This module implements the reactive system: signals, memos, effects, and
//! the owner tree that scopes their lifetimes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside a memo or
//! effect registers that computation as a subscriber; writing it stages the
//! new value and schedules precisely the subscribers whose output can
//! change.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result and recomputes during
//! the flush, in dependency order. A memo whose output did not change stops
//! propagation to its own subscribers.
//!
//! ## Effects
//!
//! An Effect runs for its side effects whenever a dependency changes. Bodies
//! run after all recomputation and commit work of a pass, so they only ever
//! observe settled, consistent values.
//!
//! ## Owners
//!
//! An Owner scopes the lifetime of the nodes created under it: disposing it
//! runs cleanups and permanently retires descendant memos and effects.
//!
//! # Update discipline
//!
//! Writes are glitch-free and atomic: within a flush pass, memos recompute
//! in ascending dependency height (so a diamond `a → b,c → d` never shows
//! `d` a half-updated pair), all staged values commit together, and only
//! then do effects run, render lane before user lane. `batch` defers the
//! whole pipeline past several writes; `untrack` opts individual reads out
//! of dependency capture.

mod batch;
mod context;
mod effect;
mod memo;
mod owner;
mod queue;
mod runtime;
mod signal;
mod tracker;

pub use batch::batch;
pub use context::Context;
pub use effect::Effect;
pub use memo::Memo;
pub use owner::{on_cleanup, Owner};
pub use queue::{on_render_settled, on_settled, on_user_settled};
pub use signal::Signal;
pub use tracker::untrack;

pub use crate::graph::scheduler::RuntimeError;
