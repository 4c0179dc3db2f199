//! Memo Implementation
//!
//! A Memo is a cached derived value. Structurally it is a composition: an
//! owner scope (so nested reactive nodes created during its computation are
//! disposed before the next run) plus a signal (so subscribers can link to
//! its output like any other dependency) plus the compute closure.
//!
//! # How Memos Recompute
//!
//! A memo does not poll. When one of its dependencies stages a new value, the
//! memo is queued in the dirty heap at its height; the flush drain calls back
//! into the runtime, which tears down the previous run (child scopes, old
//! dependency links), re-runs the compute under tracking, and stages the
//! result into the memo's own pending slot. Subscribers are only queued when
//! the output actually changed, so an unchanged memo cuts propagation short.
//!
//! # Height
//!
//! A memo's height is one more than its deepest dependency, raised lazily as
//! links are created. Heights only grow; the drain still visits every dirty
//! node, so a stale-high height costs at most ordering slack, never
//! correctness.
//!
//! The same core also backs effects: an effect is a computed whose
//! drain-time callback enqueues onto an effect lane instead of recomputing in
//! place (see the `effect` module).

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::graph::node::{GraphNode, NodeFlags, NodeId, DISPOSED, ENQUEUED, IN_HEAP};

use super::effect::Cleanup;
use super::owner::OwnerCore;
use super::queue::EffectLane;
use super::runtime::Runtime;
use super::signal::{downcast, typed_eq, AnyValue, EqFn, SignalCore};

/// What a computed node does when the flush drain reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Recompute in place during the drain.
    Memo,
    /// Enqueue onto the given effect lane; the body runs after commit.
    Effect(EffectLane),
}

/// Erased memo derivation.
pub(crate) type ComputeFn = Box<dyn FnMut() -> AnyValue + Send>;

/// Erased effect body returning an optional cleanup.
pub(crate) type EffectFn = Box<dyn FnMut() -> Option<Cleanup> + Send>;

pub(crate) enum ComputeKind {
    Memo(ComputeFn),
    Effect(EffectFn),
}

/// The subscriber-side half of one dependency edge.
///
/// The mirrored half lives on the dependency's subscriber list; both halves
/// are destroyed together by [`ComputedCore::clear_deps`] or disposal.
pub(crate) struct DependencyLink {
    pub(crate) dep: Arc<SignalCore>,
}

/// The erased computed node backing memos and effects.
pub(crate) struct ComputedCore {
    /// The owner scope this node runs in. Weak: the owner holds the node,
    /// not the other way around.
    owner: Weak<OwnerCore>,
    /// Output face: subscribers link to this signal.
    signal: Arc<SignalCore>,
    kind: NodeKind,
    flags: AtomicU32,
    compute: Mutex<ComputeKind>,
    deps: Mutex<Vec<DependencyLink>>,
    /// Cleanup returned by the previous effect run, if any.
    cleanup: Mutex<Option<Cleanup>>,
    /// Self-handle for the subscriber side of link records.
    weak_self: Weak<ComputedCore>,
}

impl ComputedCore {
    /// Create a memo node and run its first computation synchronously.
    pub(crate) fn new_memo(runtime: &Runtime, compute: ComputeFn, equals: EqFn) -> Arc<Self> {
        let core = Self::build(runtime, NodeKind::Memo, ComputeKind::Memo(compute), equals);
        runtime.recompute_memo(&core);
        core
    }

    /// Create an effect node and queue its first run on its lane. Outside a
    /// batch the triggered flush runs the body before this returns.
    ///
    /// # Panics
    ///
    /// Panics when the triggered flush detects an infinite update loop.
    pub(crate) fn new_effect(runtime: &Runtime, lane: EffectLane, body: EffectFn) -> Arc<Self> {
        let core = Self::build(
            runtime,
            NodeKind::Effect(lane),
            ComputeKind::Effect(body),
            Box::new(|_, _| false),
        );
        runtime.enqueue_effect(&core);
        if let Err(err) = runtime.schedule(true) {
            panic!("{err}");
        }
        core
    }

    fn build(
        runtime: &Runtime,
        kind: NodeKind,
        compute: ComputeKind,
        equals: EqFn,
    ) -> Arc<Self> {
        let parent = runtime
            .tracker()
            .current_owner()
            .unwrap_or_else(|| runtime.root_owner());
        let owner = OwnerCore::child_of(&parent);

        let core = Arc::new_cyclic(|weak_self| Self {
            owner: Arc::downgrade(&owner),
            signal: SignalCore::placeholder(equals),
            kind,
            flags: AtomicU32::new(0),
            compute: Mutex::new(compute),
            deps: Mutex::new(Vec::new()),
            cleanup: Mutex::new(None),
            weak_self: weak_self.clone(),
        });
        owner.set_owned(core.clone());
        core
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn signal_core(&self) -> &Arc<SignalCore> {
        &self.signal
    }

    /// Upgrade the owner scope. `None` once the owner tree has dropped this
    /// node, which the runtime treats like disposal.
    pub(crate) fn owner(&self) -> Option<Arc<OwnerCore>> {
        self.owner.upgrade()
    }

    /// Create a dependency link from `dep` to this node.
    ///
    /// A repeat read of the most recent dependency is deduped; the height is
    /// raised so this node drains after the dependency.
    pub(crate) fn link(&self, dep: &SignalCore) {
        {
            let mut deps = self.deps.lock().expect("dep list lock poisoned");
            if let Some(last) = deps.last() {
                if last.dep.id() == dep.id() {
                    return;
                }
            }
            deps.push(DependencyLink { dep: dep.arc() });
        }

        dep.add_subscriber(self.id(), self.weak_self.clone());
        self.signal.raise_height(dep.height() + 1);
    }

    /// Sever every dependency link from both ends.
    pub(crate) fn clear_deps(&self) {
        let links = std::mem::take(&mut *self.deps.lock().expect("dep list lock poisoned"));
        for link in links {
            link.dep.remove_subscriber(self.id());
        }
    }

    /// Dispose child scopes and run one-shot cleanups from the previous run.
    pub(crate) fn reset_scope(&self) {
        if let Some(owner) = self.owner() {
            owner.reset();
        }
    }

    pub(crate) fn run_memo_compute(&self) -> Option<AnyValue> {
        // The lock is held across user code; recover from poisoning so a
        // caught panic in one run does not wedge the node forever.
        let mut compute = self
            .compute
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &mut *compute {
            ComputeKind::Memo(f) => Some(f()),
            ComputeKind::Effect(_) => None,
        }
    }

    pub(crate) fn run_effect_body(&self) -> Option<Cleanup> {
        let mut compute = self
            .compute
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &mut *compute {
            ComputeKind::Effect(f) => f(),
            ComputeKind::Memo(_) => None,
        }
    }

    pub(crate) fn take_cleanup(&self) -> Option<Cleanup> {
        self.cleanup.lock().expect("cleanup lock poisoned").take()
    }

    pub(crate) fn store_cleanup(&self, cleanup: Option<Cleanup>) {
        *self.cleanup.lock().expect("cleanup lock poisoned") = cleanup;
    }

    /// Terminal teardown: the node never runs again, queued heap entries
    /// become tombstones, and its dependency links are severed so writes to
    /// former dependencies schedule no work.
    pub(crate) fn mark_disposed(&self) {
        self.add_flag(DISPOSED);
        self.remove_flag(IN_HEAP);
        self.remove_flag(ENQUEUED);
        self.clear_deps();
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.has_flag(DISPOSED)
    }
}

impl GraphNode for ComputedCore {
    fn id(&self) -> NodeId {
        self.signal.id()
    }

    fn height(&self) -> u32 {
        self.signal.height()
    }

    fn has_flag(&self, flag: NodeFlags) -> bool {
        self.flags.load(Ordering::SeqCst) & flag != 0
    }

    fn add_flag(&self, flag: NodeFlags) {
        self.flags.fetch_or(flag, Ordering::SeqCst);
    }

    fn remove_flag(&self, flag: NodeFlags) {
        self.flags.fetch_and(!flag, Ordering::SeqCst);
    }
}

/// A cached derived value that recomputes during the flush when a dependency
/// changed, and only notifies its own subscribers when its output changed.
///
/// # Type Parameters
///
/// - `T`: the computed value type. The `PartialEq` bound is what lets an
///   unchanged memo stop propagation (a memo may produce the same output for
///   different inputs).
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(1);
/// let doubled = Memo::new(move || count.get() * 2);
/// assert_eq!(doubled.get(), 2);
/// ```
pub struct Memo<T> {
    core: Arc<ComputedCore>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo. The computation runs once, immediately, to produce
    /// the initial value and record its dependencies.
    pub fn new<F>(mut compute: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let runtime = Runtime::current();
        let erased: ComputeFn = Box::new(move || Arc::new(compute()) as AnyValue);
        let core = ComputedCore::new_memo(&runtime, erased, typed_eq::<T>());
        Self {
            core,
            marker: PhantomData,
        }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    /// Get the current value, registering the calling computation as a
    /// subscriber when inside one.
    pub fn get(&self) -> T {
        downcast(&self.core.signal_core().read(&Runtime::current()))
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        downcast(&self.core.signal_core().effective_value())
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            marker: PhantomData,
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.core.id().raw())
            .field("height", &self.core.height())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn memo_computes_on_creation() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let memo = Memo::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.get(), 42);
        // Reads do not recompute.
        assert_eq!(memo.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_on_dependency_write() {
        let count = Signal::new(2);
        let count_clone = count.clone();
        let doubled = Memo::new(move || count_clone.get() * 2);

        assert_eq!(doubled.get(), 4);

        count.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn memo_depends_on_memo() {
        let base = Signal::new(5);
        let base_clone = base.clone();
        let doubled = Memo::new(move || base_clone.get() * 2);
        let doubled_clone = doubled.clone();
        let plus_ten = Memo::new(move || doubled_clone.get() + 10);

        assert_eq!(doubled.get(), 10);
        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn memo_sits_above_its_dependencies() {
        let base = Signal::new(1);
        let base_clone = base.clone();
        let derived = Memo::new(move || base_clone.get() + 1);
        let derived_clone = derived.clone();
        let second = Memo::new(move || derived_clone.get() + 1);

        assert_eq!(derived.core.height(), 1);
        assert_eq!(second.core.height(), 2);
    }

    #[test]
    fn unchanged_memo_does_not_propagate() {
        let count = Signal::new(1);
        let count_clone = count.clone();
        let zeroed = Memo::new(move || count_clone.get() * 0);

        let downstream_runs = Arc::new(AtomicI32::new(0));
        let runs_clone = downstream_runs.clone();
        let zeroed_clone = zeroed.clone();
        let downstream = Memo::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            zeroed_clone.get() + 1
        });

        assert_eq!(downstream.get(), 1);
        assert_eq!(downstream_runs.load(Ordering::SeqCst), 1);

        count.set(10);
        // zeroed recomputed to the same value, so downstream stayed put.
        assert_eq!(downstream_runs.load(Ordering::SeqCst), 1);
        assert_eq!(downstream.get(), 1);
    }

    #[test]
    fn memo_clone_shares_state() {
        let signal = Signal::new(3);
        let signal_clone = signal.clone();
        let memo1 = Memo::new(move || signal_clone.get() * 3);
        let memo2 = memo1.clone();

        assert_eq!(memo1.id(), memo2.id());
        signal.set(4);
        assert_eq!(memo2.get(), 12);
    }
}
