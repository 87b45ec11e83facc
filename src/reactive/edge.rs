//! `Edge<T>` (§4.5): an observable ordered collection keyed by entity URI —
//! the reactive counterpart of the DAP-spec "edges are one-to-many" shape in
//! §3's data model (`session.threads`, `thread.stacks`, `stack.frames`, ...).

use super::scope::current_scope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Anything addressable by a stable key can live in an `Edge`. Graph
/// entities key by their URI (§6); this trait keeps `reactive` decoupled
/// from `graph`.
pub trait Keyed {
    fn key(&self) -> String;
}

struct HandlerEntry<T> {
    id: u64,
    on_added: Box<dyn FnMut(&T) -> Option<Cleanup> + Send>,
}

struct Inner<T> {
    items: Mutex<Vec<T>>,
    handlers: Mutex<Vec<HandlerEntry<T>>>,
    // (handler_id, item_key) -> cleanup, so both item removal and handler
    // unsubscription can find exactly the cleanups they own.
    cleanups: Mutex<HashMap<(u64, String), Cleanup>>,
    next_id: AtomicU64,
}

pub struct Edge<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Edge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Edge<T>
where
    T: Keyed + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
                cleanups: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn iter(&self) -> Vec<T> {
        self.inner.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.inner.items.lock().iter().find(|i| i.key() == key).cloned()
    }

    /// Append `item`, invoking every registered `each` handler for it.
    pub fn push(&self, item: T) {
        let key = item.key();
        self.inner.items.lock().push(item.clone());
        let mut handlers = self.inner.handlers.lock();
        let mut cleanups = self.inner.cleanups.lock();
        for h in handlers.iter_mut() {
            if let Some(c) = (h.on_added)(&item) {
                cleanups.insert((h.id, key.clone()), c);
            }
        }
    }

    /// Remove the item with `key`, running every cleanup registered for it
    /// across all handlers. Returns the removed item, if present.
    pub fn remove(&self, key: &str) -> Option<T> {
        let removed = {
            let mut items = self.inner.items.lock();
            let pos = items.iter().position(|i| i.key() == key)?;
            Some(items.remove(pos))
        };
        if removed.is_some() {
            let mut cleanups = self.inner.cleanups.lock();
            let keys_to_run: Vec<(u64, String)> = cleanups
                .keys()
                .filter(|(_, k)| k == key)
                .cloned()
                .collect();
            for k in keys_to_run {
                if let Some(c) = cleanups.remove(&k) {
                    c();
                }
            }
        }
        removed
    }

    /// Invoke `on_added(item) -> cleanup?` for every current item and every
    /// subsequent addition. Returns an `unsubscribe` that runs every cleanup
    /// this handler has outstanding and stops it from seeing future
    /// additions. Attached to the current `Scope`, if any.
    pub fn each<F, C>(&self, mut on_added: F) -> impl FnOnce() + Send + 'static
    where
        F: FnMut(&T) -> Option<C> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let current_items = self.inner.items.lock().clone();
        let mut initial_cleanups = Vec::new();
        for item in &current_items {
            if let Some(c) = on_added(item) {
                initial_cleanups.push((item.key(), Box::new(c) as Cleanup));
            }
        }

        let wrapped: Box<dyn FnMut(&T) -> Option<Cleanup> + Send> =
            Box::new(move |item: &T| on_added(item).map(|c| Box::new(c) as Cleanup));
        self.inner
            .handlers
            .lock()
            .push(HandlerEntry { id, on_added: wrapped });

        {
            let mut cleanups = self.inner.cleanups.lock();
            for (key, c) in initial_cleanups {
                cleanups.insert((id, key), c);
            }
        }

        let inner = self.inner.clone();
        let unsubscribe = move || {
            inner.handlers.lock().retain(|h| h.id != id);
            let mut cleanups = inner.cleanups.lock();
            let keys_to_run: Vec<(u64, String)> = cleanups
                .keys()
                .filter(|(hid, _)| *hid == id)
                .cloned()
                .collect();
            for k in keys_to_run {
                if let Some(c) = cleanups.remove(&k) {
                    c();
                }
            }
        };

        if let Some(scope) = current_scope() {
            let boxed = Arc::new(Mutex::new(Some(Box::new(unsubscribe) as Cleanup)));
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

    /// Dispose every outstanding cleanup and drop all items, e.g. when the
    /// owning entity is destroyed (§3: "Removal cascades").
    pub fn clear(&self) {
        let keys: Vec<String> = self.inner.items.lock().iter().map(|i| i.key()).collect();
        for key in keys {
            self.remove(&key);
        }
    }
}

impl<T> Default for Edge<T>
where
    T: Keyed + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Debug, PartialEq)]
    struct Item(String);
    impl Keyed for Item {
        fn key(&self) -> String {
            self.0.clone()
        }
    }

    #[test]
    fn each_sees_existing_items_then_new_ones() {
        let edge: Edge<Item> = Edge::new();
        edge.push(Item("a".into()));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _unsub = edge.each(move |i: &Item| -> Option<fn()> {
            seen2.lock().unwrap().push(i.0.clone());
            None
        });
        edge.push(Item("b".into()));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn removing_an_item_runs_its_cleanup() {
        let edge: Edge<Item> = Edge::new();
        edge.push(Item("a".into()));
        let cleaned = Arc::new(StdMutex::new(false));
        let cleaned2 = cleaned.clone();
        let _unsub = edge.each(move |_: &Item| {
            let cleaned3 = cleaned2.clone();
            Some(move || *cleaned3.lock().unwrap() = true)
        });
        edge.remove("a");
        assert!(*cleaned.lock().unwrap());
    }

    #[test]
    fn unsubscribe_runs_all_outstanding_cleanups_for_that_handler() {
        let edge: Edge<Item> = Edge::new();
        edge.push(Item("a".into()));
        edge.push(Item("b".into()));
        let cleaned = Arc::new(StdMutex::new(0));
        let cleaned2 = cleaned.clone();
        let unsub = edge.each(move |_: &Item| {
            let c = cleaned2.clone();
            Some(move || *c.lock().unwrap() += 1)
        });
        unsub();
        assert_eq!(*cleaned.lock().unwrap(), 2);
    }

    #[test]
    fn iter_returns_a_snapshot_in_insertion_order() {
        let edge: Edge<Item> = Edge::new();
        edge.push(Item("a".into()));
        edge.push(Item("b".into()));
        assert_eq!(edge.iter(), vec![Item("a".into()), Item("b".into())]);
    }
}
