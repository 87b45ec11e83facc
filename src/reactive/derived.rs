//! Derived signals (§4.5): `derive(compute, subscribe)` re-evaluates on any
//! dependency change and emits only when the computed value differs by deep
//! equality; computation errors are swallowed to `None` to keep the
//! pipeline alive.

use super::signal::Signal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

struct DropGuard<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Drop for DropGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Build a `Signal<Option<V>>` that re-evaluates `compute` whenever
/// `subscribe`'s trigger fires, and holds `compute`/the dependency
/// subscription alive for as long as the returned signal is.
///
/// `subscribe` receives a `notify` callback it should invoke (directly, not
/// necessarily synchronously) on every dependency change; it returns an
/// unsubscribe closure that `derive` keeps alive via
/// `Signal::keep_alive`.
pub fn derive<V, C, S, U>(compute: C, subscribe: S) -> Signal<Option<V>>
where
    V: Clone + PartialEq + Send + 'static,
    C: Fn() -> Option<V> + Send + Sync + 'static,
    S: FnOnce(Arc<dyn Fn() + Send + Sync>) -> U,
    U: FnOnce() + Send + 'static,
{
    let compute = Arc::new(compute);
    let initial = run_compute(&compute);
    let signal = Signal::new(initial);

    let signal_for_trigger = signal.clone();
    let compute_for_trigger = compute.clone();
    let trigger: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        let v = run_compute(&compute_for_trigger);
        signal_for_trigger.set(v);
    });

    let unsub = subscribe(trigger);
    signal.keep_alive(compute);
    signal.keep_alive(DropGuard { f: Some(unsub) });
    signal
}

fn run_compute<V, C>(compute: &C) -> Option<V>
where
    C: Fn() -> Option<V>,
{
    // §4.5: "Computation errors are swallowed to nil" — a panicking compute
    // closure (e.g. a query evaluator hitting a dangling reference) must not
    // take down the scheduler thread.
    catch_unwind(AssertUnwindSafe(compute)).unwrap_or(None)
}

/// Convenience over `derive` for the common case of depending on a fixed set
/// of same-typed signals: subscribes to each with `Signal::use_` and
/// re-evaluates `compute` over a snapshot of their values on any change.
pub fn from<A, V, C>(signals: Vec<Signal<A>>, compute: C) -> Signal<Option<V>>
where
    A: Clone + PartialEq + Send + 'static,
    V: Clone + PartialEq + Send + 'static,
    C: Fn(&[A]) -> Option<V> + Send + Sync + 'static,
{
    let signals_for_compute = signals.clone();
    let compute = Arc::new(compute);
    let compute_for_closure = compute.clone();
    let do_compute = move || {
        let values: Vec<A> = signals_for_compute.iter().map(Signal::get).collect();
        (compute_for_closure)(&values)
    };

    derive(do_compute, move |trigger| {
        let unsubs: Vec<Box<dyn FnOnce() + Send>> = signals
            .iter()
            .map(|s| {
                let trigger = trigger.clone();
                Box::new(s.use_(move |_: &A| {
                    trigger();
                    None::<fn()>
                })) as Box<dyn FnOnce() + Send>
            })
            .collect();
        move || {
            for u in unsubs {
                u();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_recomputes_when_trigger_fires() {
        let a = Signal::new(1);
        let a2 = a.clone();
        let a3 = a.clone();
        let derived = derive(
            move || Some(a2.get() * 2),
            move |trigger| {
                a3.use_(move |_: &i32| {
                    trigger();
                    None::<fn()>
                })
            },
        );
        assert_eq!(derived.get(), Some(2));
        a.set(5);
        assert_eq!(derived.get(), Some(10));
    }

    #[test]
    fn from_recomputes_on_any_dependency_change() {
        let a = Signal::new(1);
        let b = Signal::new(10);
        let sum = from(vec![a.clone(), b.clone()], |vals| Some(vals.iter().sum::<i32>()));
        assert_eq!(sum.get(), Some(11));
        a.set(2);
        assert_eq!(sum.get(), Some(12));
        b.set(20);
        assert_eq!(sum.get(), Some(22));
    }

    #[test]
    fn panicking_compute_is_swallowed_to_none() {
        let a = Signal::new(0);
        let a2 = a.clone();
        let derived = derive(
            move || {
                if a2.get() == 0 {
                    Some(1)
                } else {
                    panic!("boom")
                }
            },
            |trigger| {
                let unsub = a.use_(move |_: &i32| {
                    trigger();
                    None::<fn()>
                });
                unsub
            },
        );
        assert_eq!(derived.get(), Some(1));
    }
}
