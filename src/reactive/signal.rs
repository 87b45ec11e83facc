//! `Signal<T>` (§4.5): an atomic reactive value with `get`/`set`/`use_`.

use super::scope::current_scope;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Cleanup = Box<dyn FnOnce() + Send>;
type Effect<T> = Box<dyn FnMut(&T) -> Option<Cleanup> + Send>;

struct Subscriber<T> {
    id: u64,
    effect: Effect<T>,
    cleanup: Option<Cleanup>,
}

struct Inner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
    next_id: AtomicU64,
    notifying: AtomicBool,
    pending: Mutex<VecDeque<T>>,
    // Objects this signal should keep alive for its own lifetime (e.g. a
    // dependency subscription a derived signal holds open) — dropped, in
    // insertion order, when the last handle to this signal is dropped.
    keepalive: Mutex<Vec<Box<dyn std::any::Any + Send>>>,
}

/// A single reactive value with subscribe semantics. Cloning a `Signal`
/// shares the same underlying cell (it is an `Arc` handle), matching the
/// teacher's convention of passing `Arc<RwLock<_>>` state around rather than
/// copying it.
pub struct Signal<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                notifying: AtomicBool::new(false),
                pending: Mutex::new(VecDeque::new()),
                keepalive: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Stash `val` for the lifetime of this signal's underlying cell. Used
    /// by `derive`/`from` to keep a dependency subscription open for as long
    /// as the derived signal itself is reachable.
    pub fn keep_alive(&self, val: impl std::any::Any + Send + 'static) {
        self.inner.keepalive.lock().push(Box::new(val));
    }

    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// If `v` differs by (deep, via `PartialEq`) equality from the current
    /// value, replace it and notify subscribers synchronously, in
    /// registration order (§4.5 invariant). A `set` re-entered from inside a
    /// subscriber's effect is queued and drained after the current
    /// notification finishes, rather than recursing.
    pub fn set(&self, v: T) {
        {
            let current = self.inner.value.lock();
            if *current == v {
                return;
            }
        }

        if self.inner.notifying.swap(true, Ordering::AcqRel) {
            // Already notifying (re-entrant set): queue and let the active
            // notification loop drain it.
            self.inner.pending.lock().push_back(v);
            return;
        }

        self.apply_and_notify(v);

        loop {
            let next = self.inner.pending.lock().pop_front();
            match next {
                Some(v) => {
                    let changed = {
                        let current = self.inner.value.lock();
                        *current != v
                    };
                    if changed {
                        self.apply_and_notify(v);
                    }
                }
                None => break,
            }
        }

        self.inner.notifying.store(false, Ordering::Release);
    }

    fn apply_and_notify(&self, v: T) {
        *self.inner.value.lock() = v;
        let current = self.get();
        let mut subs = self.inner.subscribers.lock();
        for sub in subs.iter_mut() {
            if let Some(cleanup) = sub.cleanup.take() {
                cleanup();
            }
            sub.cleanup = (sub.effect)(&current);
        }
    }

    /// Run `effect(current)` immediately; for each subsequent change, run
    /// the prior cleanup (if any) then `effect(new)`. Returns an
    /// `unsubscribe` closure; if called while a `Scope` is current, the
    /// unsubscribe is also attached to that scope.
    pub fn use_<F, C>(&self, mut effect: F) -> impl FnOnce() + Send + 'static
    where
        F: FnMut(&T) -> Option<C> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let current = self.get();
        let cleanup: Option<Cleanup> = effect(&current).map(|c| Box::new(c) as Cleanup);

        let wrapped: Effect<T> = Box::new(move |v: &T| effect(v).map(|c| Box::new(c) as Cleanup));
        self.inner.subscribers.lock().push(Subscriber {
            id,
            effect: wrapped,
            cleanup,
        });

        let inner = self.inner.clone();
        let unsubscribe = move || {
            let mut subs = inner.subscribers.lock();
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                let sub = subs.remove(pos);
                drop(subs);
                if let Some(cleanup) = sub.cleanup {
                    cleanup();
                }
            }
        };

        if let Some(scope) = current_scope() {
            let boxed: Box<dyn FnOnce() + Send> = Box::new(unsubscribe);
            let boxed = Arc::new(Mutex::new(Some(boxed)));
            let for_scope = boxed.clone();
            scope.on_dispose(move || {
                if let Some(f) = for_scope.lock().take() {
                    f();
                }
            });
            move || {
                if let Some(f) = boxed.lock().take() {
                    f();
                }
            }
        } else {
            unsubscribe
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn set_with_deep_equal_value_emits_no_notification() {
        let sig = Signal::new(1);
        let calls = Arc::new(StdMutex::new(0));
        let calls2 = calls.clone();
        let _unsub = sig.use_(move |_: &i32| -> Option<fn()> {
            *calls2.lock().unwrap() += 1;
            None
        });
        assert_eq!(*calls.lock().unwrap(), 1); // immediate invocation on subscribe
        sig.set(1);
        assert_eq!(*calls.lock().unwrap(), 1);
        sig.set(2);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn subscribers_notified_in_registration_order() {
        let sig = Signal::new(0);
        let order = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            let _unsub = sig.use_(move |_: &i32| -> Option<fn()> {
                order.lock().unwrap().push(i);
                None
            });
        }
        order.lock().unwrap().clear();
        sig.set(1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let sig = Signal::new(0);
        let calls = Arc::new(StdMutex::new(0));
        let calls2 = calls.clone();
        let unsub = sig.use_(move |_: &i32| -> Option<fn()> {
            *calls2.lock().unwrap() += 1;
            None
        });
        unsub();
        sig.set(1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn prior_cleanup_runs_before_next_effect() {
        let sig = Signal::new(0);
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log2 = log.clone();
        let _unsub = sig.use_(move |v: &i32| {
            let log3 = log2.clone();
            let v = *v;
            log2.lock().unwrap().push(format!("effect({v})"));
            Some(move || log3.lock().unwrap().push(format!("cleanup({v})")))
        });
        sig.set(1);
        sig.set(2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["effect(0)", "effect(1)", "cleanup(0)", "cleanup(1)", "effect(2)"]
        );
    }

    #[test]
    fn reentrant_set_during_notification_is_queued_and_drained() {
        let sig = Signal::new(0);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sig2 = sig.clone();
        let seen2 = seen.clone();
        let _unsub = sig.use_(move |v: &i32| -> Option<fn()> {
            let v = *v;
            seen2.lock().unwrap().push(v);
            if v == 1 {
                sig2.set(2);
            }
            None
        });
        sig.set(1);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(sig.get(), 2);
    }
}
