//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a
//! dependency changes. Unlike a memo it produces no value; what it produces,
//! optionally, is a cleanup closure that runs immediately before the next
//! body and once more at disposal.
//!
//! # When Effects Run
//!
//! Effect bodies never run during the dirty-heap drain. Reaching an effect in
//! the drain only queues it on one of two lanes; the lanes run after every
//! pending value has been committed, so an effect body always observes a
//! fully settled graph. Render-lane effects run before user-lane effects in
//! the same pass; within a lane, insertion order is preserved.
//!
//! The first run is queued the same way, with a flush requested right away:
//! outside a batch the body has run by the time `Effect::new` returns, inside
//! a batch it waits for the outermost batch to end like any other update.
//!
//! # Cleanup
//!
//! Two spellings work:
//!
//! ```rust,ignore
//! // No cleanup
//! Effect::new(move || println!("count = {}", count.get()));
//!
//! // Body returns the cleanup for its run
//! Effect::with_cleanup(move || {
//!     let id = subscribe(count.get());
//!     move || unsubscribe(id)
//! });
//! ```
//!
//! One-shot cleanups can also be registered from inside the body with
//! [`on_cleanup`](crate::reactive::on_cleanup); they run at the same points.

use std::fmt::Debug;
use std::sync::Arc;

use crate::graph::node::{GraphNode, NodeId};

use super::memo::{ComputedCore, EffectFn};
use super::queue::EffectLane;
use super::runtime::Runtime;

/// A cleanup closure captured from an effect body.
pub(crate) type Cleanup = Box<dyn FnOnce() + Send>;

/// A reactive runner whose body executes for side effects.
///
/// The effect is owned by the owner scope active at creation and lives until
/// that scope is disposed; the returned handle is only a window onto it and
/// may be dropped freely.
pub struct Effect {
    core: Arc<ComputedCore>,
}

impl Effect {
    /// Create a user-lane effect. The body runs immediately (or at batch end
    /// when created inside a batch) and re-runs when a dependency changes.
    pub fn new<F>(mut body: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::create(
            EffectLane::User,
            Box::new(move || {
                body();
                None
            }),
        )
    }

    /// Create a user-lane effect whose body returns the cleanup for its run.
    /// The cleanup runs before the next body and once more at disposal.
    pub fn with_cleanup<C, F>(mut body: F) -> Self
    where
        C: FnOnce() + Send + 'static,
        F: FnMut() -> C + Send + 'static,
    {
        Self::create(
            EffectLane::User,
            Box::new(move || Some(Box::new(body()) as Cleanup)),
        )
    }

    /// Create a render-lane effect. Render effects run before user effects
    /// in every flush pass.
    pub fn new_render<F>(mut body: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::create(
            EffectLane::Render,
            Box::new(move || {
                body();
                None
            }),
        )
    }

    fn create(lane: EffectLane, body: EffectFn) -> Self {
        let runtime = Runtime::current();
        let core = ComputedCore::new_effect(&runtime, lane, body);
        Self { core }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    /// Check whether the owning scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.core.id().raw())
            .field("disposed", &self.is_disposed())
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
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_dependency_write() {
        let count = Signal::new(0);
        let observed = Arc::new(AtomicI32::new(-1));

        let count_clone = count.clone();
        let observed_clone = observed.clone();
        let _effect = Effect::new(move || {
            observed_clone.store(count_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(observed.load(Ordering::SeqCst), 0);

        count.set(42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn returned_cleanup_runs_before_next_body() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let count = Signal::new(0);

        let count_clone = count.clone();
        let log_clone = log.clone();
        let _effect = Effect::with_cleanup(move || {
            let value = count_clone.get();
            log_clone.lock().unwrap().push(format!("run {value}"));

            let log = log_clone.clone();
            move || log.lock().unwrap().push(format!("cleanup {value}"))
        });

        count.set(1);
        count.set(2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1", "run 2"]
        );
    }

    #[test]
    fn equal_write_does_not_rerun() {
        let count = Signal::new(7);
        let runs = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            count_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        count.set(7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(8);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn render_effects_run_before_user_effects() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let count = Signal::new(0);

        let count_clone = count.clone();
        let log_clone = log.clone();
        let _user = Effect::new(move || {
            count_clone.get();
            log_clone.lock().unwrap().push("user");
        });

        let count_clone = count.clone();
        let log_clone = log.clone();
        let _render = Effect::new_render(move || {
            count_clone.get();
            log_clone.lock().unwrap().push("render");
        });

        log.lock().unwrap().clear();
        count.set(1);

        assert_eq!(*log.lock().unwrap(), vec!["render", "user"]);
    }
}
