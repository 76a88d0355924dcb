use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::store::{Store, Subscription};
use crate::task::{
    AsyncState, AsyncStore, CancellationToken, NotReady, Status, TaskFuture, TaskOutcome,
};

/// A store type that can be handed out through a [`Context`](super::Context).
///
/// `Actions` is the command facet: a small clonable handle exposing only
/// the operations consumers are allowed to call.
pub trait Provide: 'static {
    type State: Send + Sync + 'static;
    type Actions: Clone + 'static;

    /// The data facet.
    fn reader(&self) -> Reader<Self::State>;

    /// The command facet.
    fn actions(&self) -> Self::Actions;
}

/// Read-only facet of a store.
pub struct Reader<S> {
    store: Store<S>,
}

impl<S: Send + Sync + 'static> Reader<S> {
    /// A read-only view of `store`.
    pub fn new(store: &Store<S>) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Call `listener` after every snapshot change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    /// The current snapshot.
    pub fn get_snapshot(&self) -> Arc<S> {
        self.store.get_snapshot()
    }

    /// The snapshot the store was created with.
    pub fn get_initial_snapshot(&self) -> Arc<S> {
        self.store.get_initial_snapshot()
    }

    /// Borrow the current snapshot.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        self.store.read(f)
    }

    /// Resolves at the next snapshot change.
    pub fn changed(&self) -> impl Future<Output = ()> + Send + 'static {
        self.store.changed()
    }
}

impl<T: Send + Sync + 'static> Reader<AsyncState<T>> {
    /// The status of the current state.
    pub fn status(&self) -> Status {
        self.store.read(AsyncState::status)
    }

    /// Select from the current state without waiting.
    pub fn read_for_consumer<R, F>(&self, selector: F) -> Result<R, NotReady<T>>
    where
        F: FnOnce(&T) -> R,
    {
        self.get_snapshot().select(selector)
    }
}

impl<S> Clone for Reader<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Reader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reader").field(&self.store).finish()
    }
}

/// Both facets of a provided store.
pub struct Facets<P: Provide> {
    pub reader: Reader<P::State>,
    pub actions: P::Actions,
}

impl<P: Provide> Facets<P> {
    /// Split `instance` into its two facets.
    pub fn of(instance: &P) -> Self {
        Self {
            reader: instance.reader(),
            actions: instance.actions(),
        }
    }
}

impl<P: Provide> Clone for Facets<P> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Store<S> {
    /// The read-only facet of this store.
    pub fn reader(&self) -> Reader<S> {
        Reader::new(self)
    }
}

impl<T: Send + Sync + 'static> AsyncStore<T> {
    /// The read-only facet of this store.
    pub fn reader(&self) -> Reader<AsyncState<T>> {
        Reader::new(self.snapshots())
    }
}

/// Command facet of an [`AsyncStore`].
pub struct TaskActions<T> {
    store: AsyncStore<T>,
}

impl<T: Send + Sync + 'static> TaskActions<T> {
    /// See [`AsyncStore::run_task`].
    pub fn run_task<F, Fut, E>(&self, producer: F) -> TaskFuture
    where
        F: FnOnce(CancellationToken, Option<Arc<T>>) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.store.run_task(producer)
    }

    /// See [`AsyncStore::run_task_sync`].
    pub fn run_task_sync<F, E>(&self, producer: F) -> TaskOutcome
    where
        F: FnOnce(CancellationToken, Option<Arc<T>>) -> Result<T, E>,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.store.run_task_sync(producer)
    }

    /// See [`AsyncStore::hydrate`].
    pub fn hydrate(&self, data: T) -> TaskOutcome {
        self.store.hydrate(data)
    }

    /// See [`AsyncStore::reset`].
    pub fn reset(&self) {
        self.store.reset()
    }
}

impl<T> Clone for TaskActions<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Provide for AsyncStore<T> {
    type State = AsyncState<T>;
    type Actions = TaskActions<T>;

    fn reader(&self) -> Reader<AsyncState<T>> {
        AsyncStore::reader(self)
    }

    fn actions(&self) -> TaskActions<T> {
        TaskActions {
            store: self.clone(),
        }
    }
}
