//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal is written, the new value is *staged* rather than
//!    applied: it sits in the pending slot, all subscribers are queued in the
//!    dirty heap, and a flush is requested. The flush recomputes the
//!    subscribers and then commits every pending value in one step, so no
//!    observer ever sees half of an update.
//!
//! 3. Until commit, readers see the pending value; after commit it is the
//!    committed one. The two are made equal exactly once per flush pass.
//!
//! # Thread Safety
//!
//! A signal's value, pending slot, and subscriber list sit behind a
//! per-signal lock, so reads from unrelated threads never serialize on the
//! runtime. Dependency tracking is suppressed for readers on a thread other
//! than the one running the current computation.
//!
//! # Equality
//!
//! Writes that do not change the value are dropped before any scheduling
//! happens. The comparison is a per-signal predicate: the typed constructor
//! installs `PartialEq`, and [`Signal::with_eq`] accepts a custom one. The
//! erased core never inspects types itself.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::graph::node::NodeId;
use crate::graph::scheduler::{RuntimeError, Tick};

use super::memo::ComputedCore;
use super::runtime::Runtime;

/// A type-erased reactive value.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// Per-signal equality predicate over erased values.
pub(crate) type EqFn = Box<dyn Fn(&AnyValue, &AnyValue) -> bool + Send + Sync>;

/// Extract a typed value out of an erased one.
pub(crate) fn downcast<T: Clone + 'static>(value: &AnyValue) -> T {
    value
        .downcast_ref::<T>()
        .expect("reactive value type mismatch")
        .clone()
}

/// Equality predicate backed by the value type's `PartialEq`.
pub(crate) fn typed_eq<T: PartialEq + 'static>() -> EqFn {
    Box::new(|a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

/// One subscriber entry on a signal's list.
///
/// The link record is jointly held: the subscriber keeps the dependency side
/// in its dep list, the signal keeps this mirrored half. Holding the
/// subscriber weakly means a dropped computation falls off the list instead
/// of being kept alive by the signals it read.
struct SubEntry {
    id: NodeId,
    node: Weak<ComputedCore>,
}

impl SubEntry {
    fn is_live(&self) -> bool {
        self.node.strong_count() > 0
    }
}

/// State behind the per-signal lock.
struct SignalState {
    value: AnyValue,
    /// Staged value awaiting commit. Its presence is also the signal's
    /// membership token for the runtime's pending queue.
    pending: Option<AnyValue>,
    subscribers: Vec<SubEntry>,
}

/// The erased signal core shared by plain signals and memo outputs.
pub(crate) struct SignalCore {
    id: NodeId,
    height: AtomicU32,
    version: AtomicU64,
    equals: EqFn,
    state: Mutex<SignalState>,
    /// Self-handle for the places that need an owning reference: pending
    /// registration and the dependency side of link records.
    weak_self: Weak<SignalCore>,
}

impl SignalCore {
    pub(crate) fn new(value: AnyValue, equals: EqFn) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: NodeId::new(),
            height: AtomicU32::new(0),
            version: AtomicU64::new(0),
            equals,
            state: Mutex::new(SignalState {
                value,
                pending: None,
                subscribers: Vec::new(),
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// An owning handle to this core.
    pub(crate) fn arc(&self) -> Arc<SignalCore> {
        self.weak_self.upgrade().expect("signal core dropped while in use")
    }

    /// Core for a memo/effect output: placeholder value, equality supplied by
    /// the owner of the core.
    pub(crate) fn placeholder(equals: EqFn) -> Arc<Self> {
        Self::new(Arc::new(()), equals)
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }

    /// Heights grow monotonically; raising to a lower value is a no-op.
    pub(crate) fn raise_height(&self, height: u32) {
        self.height.fetch_max(height, Ordering::SeqCst);
    }

    pub(crate) fn version(&self) -> Tick {
        self.version.load(Ordering::SeqCst)
    }

    pub(crate) fn set_version(&self, tick: Tick) {
        self.version.store(tick, Ordering::SeqCst);
    }

    pub(crate) fn values_equal(&self, a: &AnyValue, b: &AnyValue) -> bool {
        (self.equals)(a, b)
    }

    /// Read the signal, registering the current computation (if any) as a
    /// subscriber.
    pub(crate) fn read(&self, runtime: &Runtime) -> AnyValue {
        runtime.tracker().track(self);
        self.effective_value()
    }

    /// The value readers currently see: pending if staged, committed
    /// otherwise.
    pub(crate) fn effective_value(&self) -> AnyValue {
        let state = self.state.lock().expect("signal state lock poisoned");
        state
            .pending
            .clone()
            .unwrap_or_else(|| state.value.clone())
    }

    /// Write a new value: stage it, queue subscribers, request a flush.
    ///
    /// Dropped entirely when the equality predicate accepts the old and new
    /// values. Propagates `InfiniteLoop` from the flush this write triggers.
    pub(crate) fn write(&self, runtime: &Runtime, value: AnyValue) -> Result<(), RuntimeError> {
        if (self.equals)(&self.effective_value(), &value) {
            return Ok(());
        }

        let newly_pending = self.stage(value);
        self.set_version(runtime.scheduler().time());

        if newly_pending {
            runtime.enqueue_pending(self.arc());
        }
        runtime.insert_dirty(self.subscribers());
        runtime.schedule(true)
    }

    /// Stage a value into the pending slot. Returns true when the slot was
    /// previously empty, i.e. the signal is not yet on the pending queue.
    pub(crate) fn stage(&self, value: AnyValue) -> bool {
        let mut state = self.state.lock().expect("signal state lock poisoned");
        let newly_pending = state.pending.is_none();
        state.pending = Some(value);
        newly_pending
    }

    /// Apply the pending value, if any.
    pub(crate) fn commit(&self) {
        let mut state = self.state.lock().expect("signal state lock poisoned");
        if let Some(pending) = state.pending.take() {
            state.value = pending;
        }
    }

    /// Snapshot the live subscribers, pruning entries whose computation has
    /// been dropped.
    pub(crate) fn subscribers(&self) -> Vec<Arc<ComputedCore>> {
        let mut state = self.state.lock().expect("signal state lock poisoned");
        state.subscribers.retain(SubEntry::is_live);
        state
            .subscribers
            .iter()
            .filter_map(|entry| entry.node.upgrade())
            .collect()
    }

    /// Add the dependency-side half of a link. Appends at the tail so
    /// same-height subscribers recompute in subscription order.
    pub(crate) fn add_subscriber(&self, id: NodeId, node: Weak<ComputedCore>) {
        let mut state = self.state.lock().expect("signal state lock poisoned");
        state.subscribers.push(SubEntry { id, node });
    }

    /// Remove every link entry for the given subscriber.
    pub(crate) fn remove_subscriber(&self, id: NodeId) {
        let mut state = self.state.lock().expect("signal state lock poisoned");
        state.subscribers.retain(|entry| entry.id != id);
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        let state = self.state.lock().expect("signal state lock poisoned");
        state.subscribers.len()
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal is cheap and shares the underlying state, so a signal
/// can be moved into closures and across threads freely.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value (tracked inside memos/effects)
/// let value = count.get();
///
/// // Update the value (stages, then flushes)
/// count.set(5);
/// ```
pub struct Signal<T> {
    core: Arc<SignalCore>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Writes are compared with `PartialEq`; equal writes propagate nothing.
    pub fn new(value: T) -> Self {
        Self::from_core(SignalCore::new(Arc::new(value), typed_eq::<T>()))
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal with a custom equality predicate, for value types
    /// without a usable `PartialEq`.
    pub fn with_eq(value: T, equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        let equals: EqFn = Box::new(move |a, b| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => equals(a, b),
                _ => false,
            }
        });
        Self::from_core(SignalCore::new(Arc::new(value), equals))
    }

    fn from_core(core: Arc<SignalCore>) -> Self {
        Self {
            core,
            marker: PhantomData,
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    /// Get the current value.
    ///
    /// If called within a memo or effect, this also registers that
    /// computation as a subscriber.
    pub fn get(&self) -> T {
        downcast(&self.core.read(&Runtime::current()))
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        downcast(&self.core.effective_value())
    }

    /// Set a new value and propagate to subscribers.
    ///
    /// # Panics
    ///
    /// Panics when the flush triggered by this write exceeds the iteration
    /// bound ([`RuntimeError::InfiniteLoop`]).
    pub fn set(&self, value: T) {
        if let Err(err) = self.core.write(&Runtime::current(), Arc::new(value)) {
            panic!("{err}");
        }
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get_untracked();
        self.set(f(&current));
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            marker: PhantomData,
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.core.id().raw())
            .field("value", &self.get_untracked())
            .field("version", &self.core.version())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
