//! The read contract consumed by rendering layers.

use std::sync::Arc;

use crate::context::Reader;
use crate::store::{Store, Subscription};
use crate::task::{AsyncState, AsyncStore};

/// Three-function read contract for external consumers.
///
/// `get_snapshot` must return the same `Arc` between two notifications, so
/// consumers can compare snapshots with [`Arc::ptr_eq`] to detect changes.
pub trait ExternalStore {
    type State: Send + Sync + 'static;

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static;

    fn get_snapshot(&self) -> Arc<Self::State>;

    /// Used to reconcile a render that began before subscribing.
    fn get_initial_snapshot(&self) -> Arc<Self::State>;
}

impl<S: Send + Sync + 'static> ExternalStore for Store<S> {
    type State = S;

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        Store::subscribe(self, listener)
    }

    fn get_snapshot(&self) -> Arc<S> {
        Store::get_snapshot(self)
    }

    fn get_initial_snapshot(&self) -> Arc<S> {
        Store::get_initial_snapshot(self)
    }
}

impl<T: Send + Sync + 'static> ExternalStore for AsyncStore<T> {
    type State = AsyncState<T>;

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        AsyncStore::subscribe(self, listener)
    }

    fn get_snapshot(&self) -> Arc<AsyncState<T>> {
        AsyncStore::get_snapshot(self)
    }

    fn get_initial_snapshot(&self) -> Arc<AsyncState<T>> {
        AsyncStore::get_initial_snapshot(self)
    }
}

impl<S: Send + Sync + 'static> ExternalStore for Reader<S> {
    type State = S;

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        Reader::subscribe(self, listener)
    }

    fn get_snapshot(&self) -> Arc<S> {
        Reader::get_snapshot(self)
    }

    fn get_initial_snapshot(&self) -> Arc<S> {
        Reader::get_initial_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A minimal consumer: re-reads only when the snapshot pointer moves.
    struct Consumer<E: ExternalStore> {
        source: E,
        last: Arc<E::State>,
        renders: Arc<AtomicUsize>,
        _subscription: Subscription,
    }

    impl<E: ExternalStore> Consumer<E> {
        fn mount(source: E) -> Self {
            let renders = Arc::new(AtomicUsize::new(0));
            let subscription = {
                let renders = renders.clone();
                source.subscribe(move || {
                    renders.fetch_add(1, Ordering::SeqCst);
                })
            };
            Self {
                last: source.get_initial_snapshot(),
                source,
                renders,
                _subscription: subscription,
            }
        }

        fn sync(&mut self) -> bool {
            let next = self.source.get_snapshot();
            let moved = !Arc::ptr_eq(&self.last, &next);
            self.last = next;
            moved
        }
    }

    #[test]
    fn snapshot_is_stable_between_notifications() {
        let store = Store::new(1_u32);
        let mut consumer = Consumer::mount(store.clone());

        assert!(!consumer.sync());
        assert!(Arc::ptr_eq(&store.get_snapshot(), &store.get_snapshot()));

        store.set(2);
        assert!(consumer.sync());
        assert!(!consumer.sync());
        assert_eq!(consumer.renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_store_fulfills_contract() {
        let store = AsyncStore::<u32>::new();
        let mut consumer = Consumer::mount(store.clone());

        store.hydrate(3);
        assert!(consumer.sync());
        assert_eq!(consumer.last.data().map(|n| **n), Some(3));
        assert_eq!(consumer.renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reader_fulfills_contract() {
        let store = Store::new("a");
        let mut consumer = Consumer::mount(Reader::new(&store));

        store.set("b");
        assert!(consumer.sync());
        assert_eq!(*consumer.last, "b");
    }
}
