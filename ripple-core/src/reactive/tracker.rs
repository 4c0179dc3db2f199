//! Tracker (Execution Context)
//!
//! The tracker holds what is currently running on this runtime: the current
//! owner scope, the current computation, and whether dependency tracking is
//! enabled. Signals consult it on every read; when a computation is current
//! (and the read happens on the thread executing it), the read becomes a
//! dependency link.
//!
//! Every user closure (compute, effect body, owner-scoped block) runs
//! through one of the `run_with_*` entry points. They save and restore the
//! slots around the call and install the panic barrier: a payload unwinding
//! out of user code is delivered to the nearest ancestor owner with error
//! handlers only *after* the slots are restored, so a caught panic can never
//! leave the tracker pointing at a dead computation.
//!
//! # Cross-thread reads
//!
//! The executing thread is recorded alongside the computation. A compute may
//! hand a signal to another thread and block on it; reads over there must not
//! register dependencies on a computation that is mid-run elsewhere, so
//! [`Tracker::track`] requires the caller's thread to match.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use super::memo::ComputedCore;
use super::owner::OwnerCore;
use super::runtime::Runtime;
use super::signal::SignalCore;

struct TrackerState {
    tracking: bool,
    current_owner: Option<Arc<OwnerCore>>,
    current_computation: Option<Arc<ComputedCore>>,
    executing_thread: Option<ThreadId>,
}

/// Per-runtime execution context.
pub(crate) struct Tracker {
    state: Mutex<TrackerState>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                tracking: true,
                current_owner: None,
                current_computation: None,
                executing_thread: None,
            }),
        }
    }

    pub(crate) fn current_owner(&self) -> Option<Arc<OwnerCore>> {
        self.state
            .lock()
            .expect("tracker state lock poisoned")
            .current_owner
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn current_computation(&self) -> Option<Arc<ComputedCore>> {
        self.state
            .lock()
            .expect("tracker state lock poisoned")
            .current_computation
            .clone()
    }

    /// Run `f` with `owner` as the current scope.
    ///
    /// Returns `None` when `f` panicked and an owner on the chain absorbed
    /// the payload.
    pub(crate) fn run_with_owner<T>(
        &self,
        owner: &Arc<OwnerCore>,
        f: impl FnOnce() -> T,
    ) -> Option<T> {
        let saved = {
            let mut state = self.state.lock().expect("tracker state lock poisoned");
            let saved = (state.current_owner.take(), state.executing_thread);
            state.current_owner = Some(owner.clone());
            state.executing_thread = Some(thread::current().id());
            saved
        };

        let result = catch_unwind(AssertUnwindSafe(f));

        {
            let mut state = self.state.lock().expect("tracker state lock poisoned");
            state.current_owner = saved.0;
            state.executing_thread = saved.1;
        }

        match result {
            Ok(value) => Some(value),
            Err(payload) => {
                deliver_panic(Some(owner.clone()), payload);
                None
            }
        }
    }

    /// Run `f` as the body of `node`: the node becomes the current
    /// computation (so reads inside `f` link to it) and its owner the
    /// current scope.
    pub(crate) fn run_with_computation(&self, node: &Arc<ComputedCore>, f: impl FnOnce()) {
        let owner = node.owner();

        let saved = {
            let mut state = self.state.lock().expect("tracker state lock poisoned");
            let saved = (
                state.current_owner.take(),
                state.current_computation.take(),
                state.executing_thread,
            );
            state.current_owner = owner.clone();
            state.current_computation = Some(node.clone());
            state.executing_thread = Some(thread::current().id());
            saved
        };

        let result = catch_unwind(AssertUnwindSafe(f));

        {
            let mut state = self.state.lock().expect("tracker state lock poisoned");
            state.current_owner = saved.0;
            state.current_computation = saved.1;
            state.executing_thread = saved.2;
        }

        if let Err(payload) = result {
            deliver_panic(owner, payload);
        }
    }

    /// Run `f` with dependency tracking disabled.
    pub(crate) fn run_untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let saved = {
            let mut state = self.state.lock().expect("tracker state lock poisoned");
            std::mem::replace(&mut state.tracking, false)
        };

        let result = catch_unwind(AssertUnwindSafe(f));

        self.state
            .lock()
            .expect("tracker state lock poisoned")
            .tracking = saved;

        match result {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Record a read of `signal` as a dependency of the current computation,
    /// when there is one, tracking is on, and the caller is on the thread
    /// executing it.
    pub(crate) fn track(&self, signal: &SignalCore) {
        let computation = {
            let state = self.state.lock().expect("tracker state lock poisoned");
            if !state.tracking || state.executing_thread != Some(thread::current().id()) {
                None
            } else {
                state.current_computation.clone()
            }
        };

        if let Some(node) = computation {
            node.link(signal);
        }
    }
}

/// Walk the owner chain looking for error handlers; the first owner that has
/// any absorbs the payload. Without one, the panic resumes.
fn deliver_panic(owner: Option<Arc<OwnerCore>>, payload: Box<dyn std::any::Any + Send>) {
    let mut current = owner;
    while let Some(owner) = current {
        let handlers = owner.error_handlers();
        if !handlers.is_empty() {
            for handler in &handlers {
                handler(payload.as_ref());
            }
            return;
        }
        current = owner.parent();
    }
    resume_unwind(payload)
}

/// Run `f` without registering any dependencies on the enclosing
/// computation.
///
/// # Example
///
/// ```rust,ignore
/// Effect::new(move || {
///     // Re-runs when `watched` changes, but not when `peeked` does.
///     let a = watched.get();
///     let b = untrack(|| peeked.get());
///     println!("{a} {b}");
/// });
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    Runtime::current().tracker().run_untracked(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
