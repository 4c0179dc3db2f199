//! Owner Tree
//!
//! An Owner is a lifecycle scope. Every memo and effect is created inside
//! exactly one owner (the one current at creation time) and is torn down with
//! it: disposing an owner disposes its descendant scopes first, then runs the
//! owner's one-shot cleanups in registration order, then its persistent
//! dispose listeners.
//!
//! Owners also carry the two escape hatches of the runtime:
//!
//! - **Error handlers.** A panic escaping a compute, effect body, or
//!   owner-scoped closure walks up the owner chain; the first owner with
//!   handlers absorbs it. With no handler anywhere, the panic resumes.
//! - **Context values.** An owner holds a bag of context values; lookup walks
//!   up through parents (see the `context` module).
//!
//! Child scopes are disposed most-recently-created first, mirroring how
//! later siblings may depend on earlier ones.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::effect::Cleanup;
use super::memo::ComputedCore;
use super::runtime::Runtime;
use super::signal::AnyValue;

/// Handler for a panic payload caught on the owner chain.
pub(crate) type PanicHandler = Arc<dyn Fn(&(dyn Any + Send)) + Send + Sync>;

/// Listener run on every dispose (not cleared between disposes).
pub(crate) type DisposeListener = Arc<dyn Fn() + Send + Sync>;

struct OwnerState {
    cleanups: Vec<Cleanup>,
    dispose_listeners: Vec<DisposeListener>,
    error_handlers: Vec<PanicHandler>,
    context: HashMap<u64, AnyValue>,
    parent: Weak<OwnerCore>,
    children: Vec<Arc<OwnerCore>>,
    /// The computed node this scope exclusively owns, for memo/effect scopes.
    owned: Option<Arc<ComputedCore>>,
}

/// Shared owner-scope state.
pub(crate) struct OwnerCore {
    state: Mutex<OwnerState>,
}

impl OwnerCore {
    fn with_parent(parent: Weak<OwnerCore>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OwnerState {
                cleanups: Vec::new(),
                dispose_listeners: Vec::new(),
                error_handlers: Vec::new(),
                context: HashMap::new(),
                parent,
                children: Vec::new(),
                owned: None,
            }),
        })
    }

    /// A parentless owner; each runtime holds one to anchor top-level nodes.
    pub(crate) fn root() -> Arc<Self> {
        Self::with_parent(Weak::new())
    }

    /// Create a child scope, registered on the parent.
    pub(crate) fn child_of(parent: &Arc<OwnerCore>) -> Arc<Self> {
        let child = Self::with_parent(Arc::downgrade(parent));
        parent
            .state
            .lock()
            .expect("owner state lock poisoned")
            .children
            .push(child.clone());
        child
    }

    pub(crate) fn set_owned(&self, node: Arc<ComputedCore>) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .owned = Some(node);
    }

    pub(crate) fn parent(&self) -> Option<Arc<OwnerCore>> {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .parent
            .upgrade()
    }

    pub(crate) fn on_cleanup(&self, f: Cleanup) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .cleanups
            .push(f);
    }

    pub(crate) fn on_dispose(&self, f: DisposeListener) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .dispose_listeners
            .push(f);
    }

    pub(crate) fn on_error(&self, f: PanicHandler) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .error_handlers
            .push(f);
    }

    /// Snapshot of the error handlers, for the panic walk.
    pub(crate) fn error_handlers(&self) -> Vec<PanicHandler> {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .error_handlers
            .clone()
    }

    /// Context value stored directly on this owner, if any.
    pub(crate) fn context_value(&self, key: u64) -> Option<AnyValue> {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .context
            .get(&key)
            .cloned()
    }

    pub(crate) fn set_context_value(&self, key: u64, value: AnyValue) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .context
            .insert(key, value);
    }

    /// Tear down everything created during the previous run while keeping
    /// the scope itself alive: dispose child scopes (most recent first), then
    /// run the one-shot cleanups in registration order.
    pub(crate) fn reset(&self) {
        let (children, cleanups) = {
            let mut state = self.state.lock().expect("owner state lock poisoned");
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.cleanups),
            )
        };

        for child in children.into_iter().rev() {
            child.dispose();
        }
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Dispose the scope: descendants first (most recent first), then the
    /// owned effect's pending cleanup, then own one-shot cleanups in
    /// registration order, then dispose listeners, then permanently retire
    /// the owned node.
    ///
    /// Listeners are retained, so disposing again fires them again; cleanups
    /// and children are gone after the first call.
    pub(crate) fn dispose(&self) {
        let (children, cleanups, owned) = {
            let mut state = self.state.lock().expect("owner state lock poisoned");
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.cleanups),
                state.owned.clone(),
            )
        };

        for child in children.into_iter().rev() {
            child.dispose();
        }

        if let Some(node) = &owned {
            if let Some(cleanup) = node.take_cleanup() {
                cleanup();
            }
        }

        for cleanup in cleanups {
            cleanup();
        }

        let listeners = {
            let state = self.state.lock().expect("owner state lock poisoned");
            state.dispose_listeners.clone()
        };
        for listener in listeners {
            listener();
        }

        if let Some(node) = owned {
            node.mark_disposed();
        }

        let parent = {
            let mut state = self.state.lock().expect("owner state lock poisoned");
            state.owned = None;
            state.parent.upgrade()
        };
        if let Some(parent) = parent {
            parent.remove_child(self as *const OwnerCore);
        }
    }

    fn remove_child(&self, child: *const OwnerCore) {
        self.state
            .lock()
            .expect("owner state lock poisoned")
            .children
            .retain(|c| !std::ptr::eq(Arc::as_ptr(c), child));
    }
}

/// A lifecycle scope for reactive nodes.
///
/// Nodes created inside [`Owner::run`] belong to this owner and are disposed
/// with it. Cloning shares the scope.
///
/// # Example
///
/// ```rust,ignore
/// let owner = Owner::new();
/// owner.run(|| {
///     Effect::new(|| println!("lives until the owner is disposed"));
/// });
/// owner.dispose();
/// ```
pub struct Owner {
    core: Arc<OwnerCore>,
}

impl Owner {
    /// Create an owner, nested under the currently running scope if there is
    /// one.
    pub fn new() -> Self {
        let runtime = Runtime::current();
        let parent = runtime
            .tracker()
            .current_owner()
            .unwrap_or_else(|| runtime.root_owner());
        Self {
            core: OwnerCore::child_of(&parent),
        }
    }

    /// Run `f` with this owner as the current scope.
    ///
    /// Returns `None` when `f` panicked and the panic was absorbed by an
    /// error handler on this owner or an ancestor; without a handler the
    /// panic resumes.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        Runtime::current().tracker().run_with_owner(&self.core, f)
    }

    /// Dispose this owner and all its descendants.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    /// Register a one-shot cleanup, run once at the next dispose.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.core.on_cleanup(Box::new(f));
    }

    /// Register a persistent listener, run every time the owner is disposed.
    pub fn on_dispose(&self, f: impl Fn() + Send + Sync + 'static) {
        self.core.on_dispose(Arc::new(f));
    }

    /// Register a panic handler. A panic raised anywhere under this owner
    /// that no deeper owner handles is delivered here instead of unwinding
    /// out of the runtime.
    pub fn on_error(&self, f: impl Fn(&(dyn Any + Send)) + Send + Sync + 'static) {
        self.core.on_error(Arc::new(f));
    }

    pub(crate) fn core(&self) -> &Arc<OwnerCore> {
        &self.core
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Owner {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Register a one-shot cleanup on the currently running owner scope.
///
/// Inside an effect body this is the effect's own scope, so the cleanup runs
/// before the next body and at disposal. A no-op when no scope is current.
pub fn on_cleanup(f: impl FnOnce() + Send + 'static) {
    if let Some(owner) = Runtime::current().tracker().current_owner() {
        owner.on_cleanup(Box::new(f));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
