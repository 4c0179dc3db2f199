//! Flush Queues
//!
//! Three queues feed the flush pipeline:
//!
//! - the **effect lanes** hold effects scheduled for this pass; Render drains
//!   before User so render-side work always precedes user-side work,
//! - the **settled lanes** hold one-shot callbacks observing the end of a
//!   lane or of the whole flush,
//! - the **pending queue** holds signals whose staged value awaits commit.
//!
//! Each queue snapshots under its lock and runs the snapshot unlocked, so
//! work enqueued from inside a callback lands in the next pass instead of
//! deadlocking.

use std::sync::{Arc, Mutex};

use super::memo::ComputedCore;
use super::runtime::Runtime;
use super::signal::SignalCore;

/// Which effect lane a node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EffectLane {
    /// Runs first in each pass (display synchronization and the like).
    Render,
    /// Runs after the render lane.
    User,
}

/// The two effect lanes of one runtime.
pub(crate) struct EffectQueue {
    render: Mutex<Vec<Arc<ComputedCore>>>,
    user: Mutex<Vec<Arc<ComputedCore>>>,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self {
            render: Mutex::new(Vec::new()),
            user: Mutex::new(Vec::new()),
        }
    }

    fn lane(&self, lane: EffectLane) -> &Mutex<Vec<Arc<ComputedCore>>> {
        match lane {
            EffectLane::Render => &self.render,
            EffectLane::User => &self.user,
        }
    }

    pub(crate) fn enqueue(&self, lane: EffectLane, node: Arc<ComputedCore>) {
        self.lane(lane)
            .lock()
            .expect("effect lane lock poisoned")
            .push(node);
    }

    /// Snapshot and clear a lane.
    pub(crate) fn take(&self, lane: EffectLane) -> Vec<Arc<ComputedCore>> {
        std::mem::take(&mut *self.lane(lane).lock().expect("effect lane lock poisoned"))
    }
}

/// A one-shot callback observing the end of a flush or lane.
pub(crate) type SettledCallback = Box<dyn FnOnce() + Send>;

/// Which settling point a callback observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SettledLane {
    /// End of the whole flush, after every chained pass has quiesced.
    Flush,
    /// End of the render lane, each pass.
    Render,
    /// End of the user lane, each pass.
    User,
}

/// The three settled lanes of one runtime.
pub(crate) struct SettledQueue {
    flush: Mutex<Vec<SettledCallback>>,
    render: Mutex<Vec<SettledCallback>>,
    user: Mutex<Vec<SettledCallback>>,
}

impl SettledQueue {
    pub(crate) fn new() -> Self {
        Self {
            flush: Mutex::new(Vec::new()),
            render: Mutex::new(Vec::new()),
            user: Mutex::new(Vec::new()),
        }
    }

    fn lane(&self, lane: SettledLane) -> &Mutex<Vec<SettledCallback>> {
        match lane {
            SettledLane::Flush => &self.flush,
            SettledLane::Render => &self.render,
            SettledLane::User => &self.user,
        }
    }

    pub(crate) fn push(&self, lane: SettledLane, callback: SettledCallback) {
        self.lane(lane)
            .lock()
            .expect("settled lane lock poisoned")
            .push(callback);
    }

    pub(crate) fn take(&self, lane: SettledLane) -> Vec<SettledCallback> {
        std::mem::take(
            &mut *self
                .lane(lane)
                .lock()
                .expect("settled lane lock poisoned"),
        )
    }
}

/// Signals whose staged value awaits the commit step of the current flush.
pub(crate) struct PendingQueue {
    signals: Mutex<Vec<Arc<SignalCore>>>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
        }
    }

    /// Register a signal for commit. Callers gate on the pending slot having
    /// been empty, so a signal is queued at most once per flush.
    pub(crate) fn push(&self, signal: Arc<SignalCore>) {
        self.signals
            .lock()
            .expect("pending queue lock poisoned")
            .push(signal);
    }

    /// Commit every queued signal, in insertion order.
    pub(crate) fn commit(&self) {
        let signals =
            std::mem::take(&mut *self.signals.lock().expect("pending queue lock poisoned"));
        for signal in signals {
            signal.commit();
        }
    }
}

/// Schedule a one-shot callback for the end of the next flush, after every
/// chained effect pass has settled.
pub fn on_settled(f: impl FnOnce() + Send + 'static) {
    Runtime::current().on_settled(SettledLane::Flush, Box::new(f));
}

/// Schedule a one-shot callback to run right after the next render-lane
/// drain, before user effects.
pub fn on_render_settled(f: impl FnOnce() + Send + 'static) {
    Runtime::current().on_settled(SettledLane::Render, Box::new(f));
}

/// Schedule a one-shot callback to run right after the next user-lane drain.
/// Unlike [`on_settled`], this does not wait for effects chained through
/// further writes.
pub fn on_user_settled(f: impl FnOnce() + Send + 'static) {
    Runtime::current().on_settled(SettledLane::User, Box::new(f));
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
