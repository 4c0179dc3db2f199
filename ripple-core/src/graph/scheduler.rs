//! Update Scheduler
//!
//! The scheduler owns the logical clock and the two flags that coordinate a
//! flush: `scheduled` (a write happened, a pass is needed) and `running` (a
//! flush is in progress on some stack). The single entry point [`Scheduler::run`]
//! is re-entrancy safe: at most one caller wins the `running` CAS, and every
//! other caller returns immediately, leaving the winner's loop to pick up the
//! re-armed `scheduled` flag.
//!
//! The loop is bounded. An effect that keeps writing one of its own
//! dependencies re-arms `scheduled` forever; after [`MAX_FLUSH_ITERATIONS`]
//! passes the run fails with [`RuntimeError::InfiniteLoop`] instead of
//! spinning. The `running` flag is cleared on every exit path, so the runtime
//! stays usable after a failed flush.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

/// A logical clock tick. Advanced once per flush iteration and stamped on
/// nodes for staleness detection.
pub type Tick = u64;

/// Upper bound on flush iterations before the update loop is declared
/// divergent.
pub const MAX_FLUSH_ITERATIONS: usize = 100_000;

/// Errors produced by the update scheduler.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The flush loop exceeded [`MAX_FLUSH_ITERATIONS`].
    #[error("possible infinite update loop detected")]
    InfiniteLoop,
}

/// Flush coordination state: logical clock plus scheduled/running flags.
pub struct Scheduler {
    clock: AtomicU64,
    scheduled: AtomicBool,
    running: AtomicBool,
}

/// Clears `running` on drop so a panicking flush body cannot wedge the
/// scheduler.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    /// Create a new scheduler with the clock at zero.
    pub fn new() -> Self {
        Self {
            clock: AtomicU64::new(0),
            scheduled: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Request a flush pass. If a run loop is active it picks this up before
    /// exiting; otherwise the next [`Scheduler::run`] does.
    pub fn schedule(&self) {
        self.scheduled.store(true, Ordering::SeqCst);
    }

    /// Check whether a flush pass has been requested.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Check whether a run loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current clock tick.
    pub fn time(&self) -> Tick {
        self.clock.load(Ordering::SeqCst)
    }

    /// Run `body` while passes keep being scheduled.
    ///
    /// Returns `Ok(false)` when another run loop is already active (the call
    /// is a no-op), `Ok(true)` when this call ran the loop to quiescence, and
    /// [`RuntimeError::InfiniteLoop`] when the iteration bound is exceeded.
    pub fn run(&self, mut body: impl FnMut()) -> Result<bool, RuntimeError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        let _guard = RunningGuard(&self.running);

        let mut iterations = 0usize;
        while self.scheduled.swap(false, Ordering::SeqCst) {
            iterations += 1;
            if iterations > MAX_FLUSH_ITERATIONS {
                return Err(RuntimeError::InfiniteLoop);
            }

            self.clock.fetch_add(1, Ordering::SeqCst);

            body();
        }

        Ok(true)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_without_schedule_is_a_no_op() {
        let scheduler = Scheduler::new();
        let mut calls = 0;

        let ran = scheduler.run(|| calls += 1).unwrap();

        assert!(ran);
        assert_eq!(calls, 0);
        assert_eq!(scheduler.time(), 0);
    }

    #[test]
    fn run_consumes_the_scheduled_flag() {
        let scheduler = Scheduler::new();
        let mut calls = 0;

        scheduler.schedule();
        scheduler.run(|| calls += 1).unwrap();

        assert_eq!(calls, 1);
        assert_eq!(scheduler.time(), 1);
        assert!(!scheduler.is_scheduled());
    }

    #[test]
    fn rearmed_schedule_repeats_the_loop() {
        let scheduler = Scheduler::new();
        let mut calls = 0;

        scheduler.schedule();
        scheduler
            .run(|| {
                calls += 1;
                if calls < 3 {
                    scheduler.schedule();
                }
            })
            .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(scheduler.time(), 3);
    }

    #[test]
    fn detects_infinite_loops() {
        let scheduler = Scheduler::new();

        scheduler.schedule();
        let result = scheduler.run(|| scheduler.schedule());

        assert!(matches!(result, Err(RuntimeError::InfiniteLoop)));
        // The scheduler must remain usable afterwards.
        assert!(!scheduler.is_running());
        scheduler.schedule();
        assert!(scheduler.run(|| {}).unwrap());
    }

    #[test]
    fn nested_run_returns_early() {
        let scheduler = Scheduler::new();
        let mut outer_calls = 0;

        scheduler.schedule();
        scheduler
            .run(|| {
                outer_calls += 1;
                // A nested run while the loop is active must not recurse.
                let ran = scheduler.run(|| panic!("nested body must not run")).unwrap();
                assert!(!ran);
            })
            .unwrap();

        assert_eq!(outer_calls, 1);
    }
}
