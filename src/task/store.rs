use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::deferred::Deferred;
use super::state::{AsyncState, NotReady, Status};
use super::token::CancellationToken;
use crate::error::TaskError;
use crate::store::{Store, StoreOptions, Subscription};

/// How a task ended, from the point of view of the store.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task was current and its data is now installed.
    Idle,
    /// The task was current and its failure is now installed.
    Error(TaskError),
    /// A newer task or a reset took over; the result was discarded.
    Superseded,
}

impl TaskOutcome {
    /// Whether this task's result reached the store.
    pub fn is_committed(&self) -> bool {
        !matches!(self, TaskOutcome::Superseded)
    }
}

/// Drives a task started with [`AsyncStore::run_task`] and commits its
/// result.
///
/// The store has already moved to `Pending` by the time this exists.
#[must_use = "a task's result is only committed while its TaskFuture is polled"]
pub struct TaskFuture {
    inner: BoxFuture<'static, TaskOutcome>,
}

impl TaskFuture {
    fn new(inner: impl Future<Output = TaskOutcome> + Send + 'static) -> Self {
        Self {
            inner: inner.boxed(),
        }
    }

    fn ready(outcome: TaskOutcome) -> Self {
        Self::new(future::ready(outcome))
    }
}

impl Future for TaskFuture {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskOutcome> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Lifecycle {
    generation: u64,
    token: Option<CancellationToken>,
}

/// A store whose state is produced by asynchronous tasks.
///
/// At most one task is current. Starting a task cancels the token of the
/// previous one, and a task only commits if it is still current when it
/// finishes, so the last task started is the one whose result sticks.
///
/// # Examples
///
/// ```
/// use snapstore::{AsyncStore, Status};
///
/// # futures::executor::block_on(async {
/// let store = AsyncStore::<u32>::new();
/// assert_eq!(store.status(), Status::Uninitialized);
///
/// let task = store.run_task(|_token, _previous| async { Ok::<_, anyhow::Error>(1) });
/// assert_eq!(store.status(), Status::Pending);
///
/// task.await;
/// assert_eq!(store.read_for_consumer(|n| *n).unwrap(), 1);
/// # });
/// ```
pub struct AsyncStore<T> {
    store: Store<AsyncState<T>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<T: Send + Sync + 'static> AsyncStore<T> {
    /// An `Uninitialized` store.
    pub fn new() -> Self {
        Self::with_options(None, StoreOptions::default())
    }

    /// An `Idle` store seeded with `data`.
    pub fn with_data(data: T) -> Self {
        Self::with_options(Some(data), StoreOptions::default())
    }

    /// `Idle` with `seed` if given, otherwise `Uninitialized`.
    pub fn with_options(seed: Option<T>, options: StoreOptions) -> Self {
        let initial = match seed {
            Some(data) => AsyncState::idle(data),
            None => AsyncState::uninitialized(),
        };
        Self {
            store: Store::with_options(initial, options),
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
        }
    }

    /// The label used in log fields.
    pub fn label(&self) -> &str {
        self.store.label()
    }

    /// Call `listener` after every state transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    /// The current state.
    pub fn get_snapshot(&self) -> Arc<AsyncState<T>> {
        self.store.get_snapshot()
    }

    /// The state the store was created with.
    pub fn get_initial_snapshot(&self) -> Arc<AsyncState<T>> {
        self.store.get_initial_snapshot()
    }

    /// The status of the current state.
    pub fn status(&self) -> Status {
        self.store.read(AsyncState::status)
    }

    /// Resolves at the next state transition.
    pub fn changed(&self) -> impl Future<Output = ()> + Send + 'static {
        self.store.changed()
    }

    /// The underlying snapshot store. Read-only access for the context module.
    pub(crate) fn snapshots(&self) -> &Store<AsyncState<T>> {
        &self.store
    }

    /// Start a task.
    ///
    /// The store moves to `Pending` and `producer` is invoked before this
    /// returns. It receives the task's token and the data visible before
    /// the call (idle data or stale refresh data). Errors and panics from
    /// the producer are recorded in the store, never returned.
    pub fn run_task<F, Fut, E>(&self, producer: F) -> TaskFuture
    where
        F: FnOnce(CancellationToken, Option<Arc<T>>) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let (token, previous) = self.begin();
        let generation = token.generation();

        let task = match panic::catch_unwind(AssertUnwindSafe(move || producer(token, previous))) {
            Ok(task) => task,
            Err(payload) => {
                let outcome = self.finish(generation, Err(TaskError::from_panic(payload)));
                return TaskFuture::ready(outcome);
            }
        };

        let this = self.clone();
        TaskFuture::new(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(error)) => Err(TaskError::failed(error)),
                Err(payload) => Err(TaskError::from_panic(payload)),
            };
            this.finish(generation, result)
        })
    }

    /// Run a synchronous producer to completion.
    pub fn run_task_sync<F, E>(&self, producer: F) -> TaskOutcome
    where
        F: FnOnce(CancellationToken, Option<Arc<T>>) -> Result<T, E>,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.run_task(move |token, previous| future::ready(producer(token, previous)))
            .now_or_never()
            .unwrap_or(TaskOutcome::Superseded)
    }

    /// Start a task and drive it on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn_task<F, Fut, E>(&self, producer: F) -> JoinHandle<TaskOutcome>
    where
        F: FnOnce(CancellationToken, Option<Arc<T>>) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        tokio::spawn(self.run_task(producer))
    }

    /// Install `data` through the full task lifecycle, superseding any task
    /// in flight.
    pub fn hydrate(&self, data: T) -> TaskOutcome {
        self.run_task_sync(move |_, _| Ok::<_, Infallible>(data))
    }

    /// Cancel the task in flight and restore the initial state.
    ///
    /// Readers waiting on a first load stay parked until the next task
    /// settles; they are never woken with a failure by a reset.
    pub fn reset(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(token) = lifecycle.token.take() {
            token.cancel();
        }
        lifecycle.generation += 1;
        let (next, released) = self.restored();
        let changed = self.store.install(next);
        let generation = lifecycle.generation;
        drop(lifecycle);

        debug!(store = %self.store.label(), generation, "store reset");
        if let Some((deferred, data)) = released {
            deferred.resolve(data);
        }
        if changed {
            self.store.notify();
        }
    }

    /// The snapshot a reset installs, plus a parked deferred to release.
    ///
    /// Readers parked on an unsettled deferred keep waiting if the store goes
    /// back to `Uninitialized`, and receive the seed if it goes back to
    /// `Idle`. A settled initial deferred is never handed out again.
    fn restored(&self) -> (Arc<AsyncState<T>>, Option<(Deferred<T>, Arc<T>)>) {
        let initial = self.store.get_initial_snapshot();
        let current = self.store.get_snapshot();
        let parked = current
            .deferred()
            .filter(|deferred| !deferred.is_settled())
            .cloned();
        if parked.is_some() && current.status() == Status::Uninitialized {
            return (current, None);
        }

        match (&*initial, parked) {
            (AsyncState::Uninitialized { deferred }, Some(parked))
                if !Deferred::ptr_eq(deferred, &parked) =>
            {
                (Arc::new(AsyncState::Uninitialized { deferred: parked }), None)
            }
            (AsyncState::Uninitialized { deferred }, None) if deferred.is_settled() => {
                (Arc::new(AsyncState::uninitialized()), None)
            }
            (AsyncState::Idle { data }, Some(parked)) => {
                let data = Arc::clone(data);
                (Arc::clone(&initial), Some((parked, data)))
            }
            _ => (Arc::clone(&initial), None),
        }
    }

    /// Select from the current snapshot without waiting.
    ///
    /// See [`AsyncState::select`] for the rules.
    pub fn read_for_consumer<R, F>(&self, selector: F) -> Result<R, NotReady<T>>
    where
        F: FnOnce(&T) -> R,
    {
        self.get_snapshot().select(selector)
    }

    /// Select from the first usable snapshot, waiting while the store is
    /// loading.
    ///
    /// Never waits during a refresh. Returns the recorded failure if the
    /// store settles into `Error`. If no task is ever started this waits
    /// forever.
    pub async fn read<R, F>(&self, selector: F) -> Result<R, TaskError>
    where
        F: Fn(&T) -> R,
    {
        loop {
            let changed = self.store.changed();
            let read = self.read_for_consumer(&selector);
            match read {
                Ok(value) => return Ok(value),
                Err(NotReady::Failed(error)) => return Err(error),
                Err(NotReady::Pending(suspense)) if suspense.is_settled() => changed.await,
                Err(NotReady::Pending(suspense)) => {
                    let _ = future::select(suspense, Box::pin(changed)).await;
                }
            }
        }
    }

    /// Supersede the current task and enter `Pending`.
    fn begin(&self) -> (CancellationToken, Option<Arc<T>>) {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(previous) = lifecycle.token.take() {
            previous.cancel();
        }
        lifecycle.generation += 1;
        let token = CancellationToken::new(lifecycle.generation);
        lifecycle.token = Some(token.clone());

        let current = self.store.get_snapshot();
        let previous = current.data().cloned();
        let changed = self.store.install(Arc::new(current.begin_pending()));
        drop(lifecycle);

        debug!(
            store = %self.store.label(),
            generation = token.generation(),
            refreshing = previous.is_some(),
            "task started"
        );
        if changed {
            self.store.notify();
        }
        (token, previous)
    }

    /// Commit a task's result if it is still the current task.
    fn finish(&self, generation: u64, result: Result<T, TaskError>) -> TaskOutcome {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            trace!(
                store = %self.store.label(),
                generation,
                current = lifecycle.generation,
                "discarding superseded task result"
            );
            return TaskOutcome::Superseded;
        }
        lifecycle.token = None;

        let deferred = self.store.get_snapshot().deferred().cloned();
        let (next, settlement) = match result {
            Ok(data) => {
                let data = Arc::new(data);
                (
                    AsyncState::Idle {
                        data: Arc::clone(&data),
                    },
                    Ok(data),
                )
            }
            Err(error) => (
                AsyncState::Error {
                    error: error.clone(),
                },
                Err(error),
            ),
        };
        self.store.install(Arc::new(next));
        drop(lifecycle);

        let outcome = match &settlement {
            Ok(_) => {
                debug!(store = %self.store.label(), generation, "task committed");
                TaskOutcome::Idle
            }
            Err(error) => {
                debug!(store = %self.store.label(), generation, %error, "task failed");
                TaskOutcome::Error(error.clone())
            }
        };
        // Settle after installing so woken readers see the new snapshot.
        if let Some(deferred) = deferred {
            deferred.settle(settlement);
        }
        self.store.notify();
        outcome
    }
}

impl<T: Send + Sync + 'static> Default for AsyncStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for AsyncStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncStore")
            .field("store", &self.store)
            .field("generation", &self.lifecycle.lock().generation)
            .finish()
    }
}
