//! Batching
//!
//! A batch defers the flush: writes inside it still stage pending values and
//! queue dirty subscribers, but nothing recomputes until the outermost batch
//! ends. N writes to one signal inside a batch cost at most one recomputation
//! of each downstream node, and every effect sees only the final values.
//!
//! Batches nest; only the outermost one triggers the flush.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::runtime::Runtime;

/// Per-runtime batch depth counter.
pub(crate) struct Batcher {
    depth: AtomicUsize,
}

impl Batcher {
    pub(crate) fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
        }
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn enter(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the batch depth even when the batched closure unwinds.
struct DepthGuard<'a>(&'a Batcher);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

/// Run `f` with updates deferred until it returns.
///
/// # Panics
///
/// Panics when the flush at batch end detects an infinite update loop.
///
/// # Example
///
/// ```rust,ignore
/// batch(|| {
///     count.set(10);
///     count.set(20);
///     // Dependents have not run yet.
/// });
/// // One flush: effects see 20, never 10.
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let runtime = Runtime::current();

    runtime.batcher().enter();
    let result = {
        let _guard = DepthGuard(runtime.batcher());
        f()
    };

    if !runtime.batcher().is_batching() {
        if let Err(err) = runtime.flush() {
            panic!("{err}");
        }
    }

    result
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
