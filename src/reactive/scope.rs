//! Scoped subscriptions (§4.5, §9 "weak references for scope cleanup" ->
//! "an arena+index approach: each scope is an id; scope drop sweeps an
//! id-keyed disposer list").
//!
//! Scopes form a stack on the current thread (the single scheduler thread,
//! §5). `Signal::use_`/`Edge::each` register their cleanup with the
//! top-of-stack scope, if any, so that entity destruction uniformly disposes
//! every subscription it created.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Disposer = Box<dyn FnOnce() + Send>;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// A lifetime container collecting disposers. Dropping (disposing) a scope
/// runs every disposer registered within it, in registration order.
pub struct Scope {
    id: u64,
    disposers: Mutex<Vec<Disposer>>,
    disposed: std::sync::atomic::AtomicBool,
}

impl Scope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            disposers: Mutex::new(Vec::new()),
            disposed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a cleanup to run when this scope is disposed. No-op if the
    /// scope has already been disposed (runs it immediately instead, since
    /// an entity destroyed mid-teardown must still release its handles).
    pub fn on_dispose(&self, disposer: impl FnOnce() + Send + 'static) {
        if self.disposed.load(Ordering::Acquire) {
            disposer();
            return;
        }
        self.disposers.lock().push(Box::new(disposer));
    }

    /// Run every registered disposer, in order, then clear the list. Safe to
    /// call more than once; subsequent calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let disposers: Vec<Disposer> = std::mem::take(&mut *self.disposers.lock());
        for d in disposers {
            d();
        }
    }
}

thread_local! {
    static STACK: RefCell<Vec<Arc<Scope>>> = const { RefCell::new(Vec::new()) };
}

/// The innermost scope currently active on this thread, if any.
pub fn current_scope() -> Option<Arc<Scope>> {
    STACK.with(|s| s.borrow().last().cloned())
}

/// RAII token: pushes `scope` as current for its lifetime, popping it on
/// drop. `Signal::use_`/`Edge::each` calls made while a guard is alive attach
/// their cleanup to `scope`.
pub struct ScopeGuard {
    _private: (),
}

impl ScopeGuard {
    pub fn enter(scope: Arc<Scope>) -> Self {
        STACK.with(|s| s.borrow_mut().push(scope));
        Self { _private: () }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_runs_disposers_in_registration_order() {
        let scope = Scope::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            scope.on_dispose(move || order.lock().push(i));
        }
        scope.dispose();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn dispose_is_idempotent() {
        let scope = Scope::new();
        let count = Arc::new(Mutex::new(0));
        let count2 = count.clone();
        scope.on_dispose(move || *count2.lock() += 1);
        scope.dispose();
        scope.dispose();
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn scope_guard_exposes_current_scope_while_alive() {
        assert!(current_scope().is_none());
        let scope = Scope::new();
        {
            let _guard = ScopeGuard::enter(scope.clone());
            assert_eq!(current_scope().unwrap().id(), scope.id());
        }
        assert!(current_scope().is_none());
    }

    #[test]
    fn on_dispose_after_dispose_runs_immediately() {
        let scope = Scope::new();
        scope.dispose();
        let ran = Arc::new(Mutex::new(false));
        let ran2 = ran.clone();
        scope.on_dispose(move || *ran2.lock() = true);
        assert!(*ran.lock());
    }
}
