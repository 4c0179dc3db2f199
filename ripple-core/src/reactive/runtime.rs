//! Reactive Runtime
//!
//! The runtime is the per-thread coordinator that connects signals, memos,
//! and effects: it owns the dirty heap, the flush scheduler, the batcher, the
//! tracker, and the flush queues.
//!
//! # The flush pipeline
//!
//! A write stages its value, queues the signal's subscribers in the dirty
//! heap, and calls [`Runtime::schedule`]. Unless a batch or another flush is
//! active, that runs the scheduler loop; each pass
//!
//! 1. drains the heap in ascending height order: memos recompute in place
//!    and push their own subscribers, effects get queued on their lane,
//! 2. commits every pending value, making the pass atomic to observers,
//! 3. runs the render lane, then its settled callbacks, then the user lane,
//!    then its settled callbacks.
//!
//! Writes made by effect bodies re-arm the scheduler and the loop repeats;
//! when it finally quiesces, the top-level settled callbacks run.
//!
//! # Per-thread isolation
//!
//! Each host thread lazily gets its own runtime from a process-wide registry
//! (dropped again when the thread exits). There is no shared graph state
//! between runtimes, but signals are shared by reference, so a write on
//! thread B schedules and flushes B's runtime, re-running even subscribers
//! that were created on thread A. Dependency *tracking* stays thread-correct
//! through the tracker's executing-thread check.
//!
//! No lock is held while user code runs. State is split per component with
//! each lock taken briefly, which is what lets effect bodies freely write
//! signals, create nodes, and dispose owners mid-flush.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::{self, ThreadId};

use tracing::trace;

use crate::graph::heap::PriorityHeap;
use crate::graph::node::{GraphNode, DISPOSED, ENQUEUED, RECOMPUTING};
use crate::graph::scheduler::{RuntimeError, Scheduler};

use super::batch::Batcher;
use super::memo::{ComputedCore, NodeKind};
use super::owner::OwnerCore;
use super::queue::{
    EffectLane, EffectQueue, PendingQueue, SettledCallback, SettledLane, SettledQueue,
};
use super::signal::SignalCore;
use super::tracker::Tracker;

/// Process-wide registry of per-thread runtimes.
static REGISTRY: OnceLock<RwLock<HashMap<ThreadId, Arc<Runtime>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<ThreadId, Arc<Runtime>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Removes the thread's registry entry when the thread exits.
struct RegistryGuard {
    thread: ThreadId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Some(lock) = REGISTRY.get() {
            lock.write()
                .expect("runtime registry lock poisoned")
                .remove(&self.thread);
        }
    }
}

thread_local! {
    static CURRENT: std::cell::OnceCell<(Arc<Runtime>, RegistryGuard)> =
        const { std::cell::OnceCell::new() };
}

/// Clears `RECOMPUTING` on drop so a compute panic that resumes past the
/// owner chain cannot leave the memo refusing every future recompute.
struct RecomputingGuard<'a>(&'a ComputedCore);

impl Drop for RecomputingGuard<'_> {
    fn drop(&mut self) {
        self.0.remove_flag(RECOMPUTING);
    }
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    heap: Mutex<PriorityHeap<ComputedCore>>,
    scheduler: Scheduler,
    batcher: Batcher,
    tracker: Tracker,
    pending: PendingQueue,
    effects: EffectQueue,
    settled: SettledQueue,
    root_owner: Arc<OwnerCore>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            heap: Mutex::new(PriorityHeap::new()),
            scheduler: Scheduler::new(),
            batcher: Batcher::new(),
            tracker: Tracker::new(),
            pending: PendingQueue::new(),
            effects: EffectQueue::new(),
            settled: SettledQueue::new(),
            root_owner: OwnerCore::root(),
        }
    }

    /// The calling thread's runtime, created on first use.
    pub(crate) fn current() -> Arc<Runtime> {
        CURRENT.with(|cell| {
            cell.get_or_init(|| {
                let thread = thread::current().id();
                let runtime = Arc::new(Runtime::new());
                registry()
                    .write()
                    .expect("runtime registry lock poisoned")
                    .insert(thread, runtime.clone());
                (runtime, RegistryGuard { thread })
            })
            .0
            .clone()
        })
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    pub(crate) fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Anchor for nodes created outside any owner scope; lives as long as
    /// the thread.
    pub(crate) fn root_owner(&self) -> Arc<OwnerCore> {
        self.root_owner.clone()
    }

    /// Register a signal for the commit step of the current/next flush.
    pub(crate) fn enqueue_pending(&self, signal: Arc<SignalCore>) {
        self.pending.push(signal);
    }

    /// Queue dirty subscribers in the heap.
    pub(crate) fn insert_dirty(&self, nodes: Vec<Arc<ComputedCore>>) {
        self.heap
            .lock()
            .expect("dirty heap lock poisoned")
            .insert_all(nodes);
    }

    /// Register a settled callback.
    pub(crate) fn on_settled(&self, lane: SettledLane, callback: SettledCallback) {
        self.settled.push(lane, callback);
    }

    /// Request a flush pass.
    ///
    /// With `force`, the request is recorded even while a flush is running
    /// (the loop picks it up before exiting); without, a running flush makes
    /// this a no-op. The flush happens on this stack unless a batch is open
    /// or a flush is already running above us.
    pub(crate) fn schedule(&self, force: bool) -> Result<(), RuntimeError> {
        if !force && self.scheduler.is_running() {
            return Ok(());
        }

        self.scheduler.schedule();

        if !self.batcher.is_batching() && !self.scheduler.is_running() {
            self.flush()?;
        }
        Ok(())
    }

    /// Run the scheduler loop to quiescence, then the top-level settled
    /// callbacks.
    pub(crate) fn flush(&self) -> Result<(), RuntimeError> {
        let ran = self.scheduler.run(|| {
            trace!(tick = self.scheduler.time(), "flush pass");

            self.drain_heap();
            self.pending.commit();

            self.run_lane(EffectLane::Render);
            self.run_settled(SettledLane::Render);
            self.run_lane(EffectLane::User);
            self.run_settled(SettledLane::User);
        })?;

        if ran {
            self.run_settled(SettledLane::Flush);
        }
        Ok(())
    }

    /// Drain the dirty heap in ascending height order. The lock is released
    /// around each callback so processing may queue more work.
    fn drain_heap(&self) {
        loop {
            let node = self.heap.lock().expect("dirty heap lock poisoned").pop();
            match node {
                Some(node) => self.process(&node),
                None => break,
            }
        }
    }

    fn process(&self, node: &Arc<ComputedCore>) {
        match node.kind() {
            NodeKind::Memo => self.recompute_memo(node),
            NodeKind::Effect(_) => self.enqueue_effect(node),
        }
    }

    /// Queue an effect on its lane for this pass.
    pub(crate) fn enqueue_effect(&self, node: &Arc<ComputedCore>) {
        if node.has_flag(DISPOSED) || node.has_flag(ENQUEUED) {
            return;
        }
        node.add_flag(ENQUEUED);

        if let NodeKind::Effect(lane) = node.kind() {
            self.effects.enqueue(lane, node.clone());
        }
    }

    /// Recompute a memo in place: tear down the previous run, re-run the
    /// derivation under tracking, stage the result, and propagate only when
    /// the output changed.
    pub(crate) fn recompute_memo(&self, node: &Arc<ComputedCore>) {
        if node.has_flag(DISPOSED) || node.has_flag(RECOMPUTING) {
            return;
        }
        trace!(node = node.id().raw(), height = node.height(), "recompute");
        node.add_flag(RECOMPUTING);
        let _recomputing = RecomputingGuard(node);

        let signal = node.signal_core().clone();
        let old = signal.effective_value();

        node.reset_scope();
        node.clear_deps();
        signal.set_version(self.scheduler.time());

        self.tracker.run_with_computation(node, || {
            if let Some(value) = node.run_memo_compute() {
                if signal.stage(value) {
                    self.pending.push(signal.clone());
                }
            }
        });

        let new = signal.effective_value();
        if !signal.values_equal(&old, &new) {
            self.insert_dirty(signal.subscribers());
        }
    }

    fn run_lane(&self, lane: EffectLane) {
        for node in self.effects.take(lane) {
            self.run_effect(&node);
        }
    }

    fn run_settled(&self, lane: SettledLane) {
        for callback in self.settled.take(lane) {
            callback();
        }
    }

    /// Run one queued effect: previous cleanup, scope teardown, then the
    /// body under tracking. Every pending value has already been committed,
    /// so the body and the cleanups observe a settled graph.
    fn run_effect(&self, node: &Arc<ComputedCore>) {
        node.remove_flag(ENQUEUED);
        if node.has_flag(DISPOSED) {
            return;
        }
        trace!(node = node.id().raw(), "run effect");

        if let Some(cleanup) = node.take_cleanup() {
            cleanup();
        }
        node.reset_scope();
        node.clear_deps();
        node.signal_core().set_version(self.scheduler.time());

        self.tracker.run_with_computation(node, || {
            let cleanup = node.run_effect_body();
            node.store_cleanup(cleanup);
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
