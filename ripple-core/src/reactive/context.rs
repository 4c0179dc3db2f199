//! Owner-Scoped Context
//!
//! A Context carries a value down the owner tree without threading it through
//! every call: `set` stores the value on the currently running owner, `get`
//! walks up from the current owner and returns the first value found, falling
//! back to the context's default.
//!
//! Setting a context outside any owner scope is a no-op (there is nowhere
//! for the value to live) and reading outside one yields the default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::runtime::Runtime;
use super::signal::downcast;

/// Generate a new unique context key.
fn next_context_key() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An owner-scoped value with a default.
///
/// # Example
///
/// ```rust,ignore
/// let theme = Context::new("light");
///
/// owner.run(|| {
///     theme.set("dark");
///     nested_owner.run(|| {
///         assert_eq!(theme.get(), "dark"); // inherited from the parent scope
///     });
/// });
/// assert_eq!(theme.get(), "light"); // outside: the default
/// ```
pub struct Context<T> {
    key: u64,
    default: T,
}

impl<T> Context<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a context with the given default value.
    pub fn new(default: T) -> Self {
        Self {
            key: next_context_key(),
            default,
        }
    }

    /// Read the context: the nearest value up the current owner chain, or
    /// the default.
    pub fn get(&self) -> T {
        let runtime = Runtime::current();
        let mut owner = runtime.tracker().current_owner();

        while let Some(scope) = owner {
            if let Some(value) = scope.context_value(self.key) {
                return downcast(&value);
            }
            owner = scope.parent();
        }

        self.default.clone()
    }

    /// Store a value on the currently running owner scope. No-op without
    /// one.
    pub fn set(&self, value: T) {
        let runtime = Runtime::current();
        if let Some(owner) = runtime.tracker().current_owner() {
            owner.set_context_value(self.key, Arc::new(value));
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
