use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::trace;

use super::merge::Merge;
use super::subscription::{Listeners, Subscription};

/// Construction-time options for a store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    label: Option<Cow<'static, str>>,
}

impl StoreOptions {
    /// Name the store in log output. Defaults to the state's type name.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct Shared<S> {
    label: Cow<'static, str>,
    initial: Arc<S>,
    state: RwLock<Arc<S>>,
    // Serializes compute-and-install across threads; re-entrant so an
    // update function may itself update the store.
    writer: ReentrantMutex<()>,
}

/// A thread-safe container for one immutable snapshot.
///
/// Every change installs a new `Arc<S>`; the previous snapshot is never
/// touched, so readers always see a complete value. A change is only
/// installed, and listeners only notified, when the new snapshot is not
/// pointer-identical to the current one.
///
/// # Examples
///
/// ```
/// use snapstore::Store;
/// use std::sync::Arc;
///
/// let store = Store::new(1);
/// let before = store.get_snapshot();
///
/// store.update(|n| Arc::clone(n));
/// assert!(Arc::ptr_eq(&before, &store.get_snapshot()));
///
/// store.set(2);
/// assert_eq!(store.get(), 2);
///
/// store.reset();
/// assert_eq!(store.get(), 1);
/// ```
pub struct Store<S> {
    shared: Arc<Shared<S>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl<S: Send + Sync + 'static> Store<S> {
    /// Create a new store with the given initial state.
    pub fn new(initial: S) -> Self {
        Self::with_options(initial, StoreOptions::default())
    }

    /// Create a new store with explicit options.
    pub fn with_options(initial: S, options: StoreOptions) -> Self {
        let initial = Arc::new(initial);
        let label = options
            .label
            .unwrap_or(Cow::Borrowed(std::any::type_name::<S>()));
        Self {
            shared: Arc::new(Shared {
                label,
                state: RwLock::new(Arc::clone(&initial)),
                initial,
                writer: ReentrantMutex::new(()),
            }),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// The label used for this store in log output.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// The current snapshot.
    ///
    /// Repeated calls between two changes return the same `Arc`.
    pub fn get_snapshot(&self) -> Arc<S> {
        Arc::clone(&self.shared.state.read())
    }

    /// The snapshot captured at construction.
    pub fn get_initial_snapshot(&self) -> Arc<S> {
        Arc::clone(&self.shared.initial)
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> S
    where
        S: Clone,
    {
        S::clone(&self.get_snapshot())
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        let snapshot = self.get_snapshot();
        f(&snapshot)
    }

    /// Subscribe to state changes.
    ///
    /// The listener is called with no arguments after every installed change.
    /// Listeners added or removed while a notification pass is running do
    /// not affect that pass.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.listeners.lock().insert(Arc::new(listener));
        Subscription::new(id, &self.listeners)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Replace the whole snapshot.
    pub fn replace(&self, next: Arc<S>) {
        let guard = self.shared.writer.lock();
        let changed = self.install(next);
        drop(guard);
        if changed {
            self.notify();
        }
    }

    /// Set a new state value.
    pub fn set(&self, next: S) {
        self.replace(Arc::new(next));
    }

    /// Derive the next snapshot from the current one.
    ///
    /// Returning the current `Arc` unchanged is a no-op.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Arc<S>) -> Arc<S>,
    {
        match self.try_update(|current| Ok::<_, Infallible>(f(current))) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`Store::update`].
    ///
    /// An error from `f` is returned to the caller and leaves the snapshot
    /// unchanged.
    pub fn try_update<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnOnce(&Arc<S>) -> Result<Arc<S>, E>,
    {
        let guard = self.shared.writer.lock();
        let current = self.get_snapshot();
        let next = f(&current)?;
        let changed = self.install(next);
        drop(guard);
        if changed {
            self.notify();
        }
        Ok(())
    }

    /// Restore the initial snapshot.
    pub fn reset(&self) {
        self.replace(self.get_initial_snapshot());
    }

    /// Resolves at the next notification after this call.
    ///
    /// The listener is registered before this returns, so a change that
    /// happens before the future is first polled is not missed.
    pub fn changed(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));
        let subscription = self.subscribe(move || {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
        });
        async move {
            let _ = rx.await;
            drop(subscription);
        }
    }

    /// Install `next` unless it is the current snapshot. Does not notify.
    pub(crate) fn install(&self, next: Arc<S>) -> bool {
        let mut state = self.shared.state.write();
        if Arc::ptr_eq(&state, &next) {
            return false;
        }
        *state = next;
        true
    }

    /// Run one notification pass over the listeners registered right now.
    pub(crate) fn notify(&self) {
        let listeners = self.listeners.lock().snapshot();
        trace!(
            store = %self.shared.label,
            listeners = listeners.len(),
            "notifying listeners"
        );
        for listener in listeners {
            listener();
        }
    }
}

impl<S: Merge + Send + Sync + 'static> Store<S> {
    /// Shallow-merge a partial value into the current state.
    pub fn merge(&self, partial: S::Partial) {
        self.merge_with(move |_| Some(partial));
    }

    /// Shallow-merge the partial value computed from the current state.
    ///
    /// Returning `None` keeps the current snapshot and notifies nobody.
    pub fn merge_with<F>(&self, f: F)
    where
        F: FnOnce(&S) -> Option<S::Partial>,
    {
        match self.try_merge_with(|current| Ok::<_, Infallible>(f(current))) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`Store::merge_with`].
    pub fn try_merge_with<F, E>(&self, f: F) -> Result<(), E>
    where
        F: FnOnce(&S) -> Result<Option<S::Partial>, E>,
    {
        self.try_update(|current| {
            Ok(match f(current)? {
                Some(partial) => Arc::new(current.merge(partial)),
                None => Arc::clone(current),
            })
        })
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.shared.label)
            .field("state", &**self.shared.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct AppState {
        count: usize,
        name: String,
    }

    #[derive(Default)]
    struct AppPatch {
        count: Option<usize>,
        name: Option<String>,
    }

    impl Merge for AppState {
        type Partial = AppPatch;

        fn merge(&self, patch: AppPatch) -> Self {
            AppState {
                count: patch.count.unwrap_or(self.count),
                name: patch.name.unwrap_or_else(|| self.name.clone()),
            }
        }
    }

    fn app_store() -> Store<AppState> {
        Store::new(AppState {
            count: 0,
            name: "test".to_string(),
        })
    }

    fn counter(store: &Store<AppState>) -> (Arc<AtomicUsize>, Subscription) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let subscription = store.subscribe(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        (calls, subscription)
    }

    #[test]
    fn store_get_set() {
        let store = app_store();

        assert_eq!(store.get().count, 0);

        store.set(AppState {
            count: 42,
            name: "updated".to_string(),
        });

        assert_eq!(store.get().count, 42);
        assert_eq!(store.get().name, "updated");
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let store = app_store();

        store.merge(AppPatch {
            count: Some(10),
            ..Default::default()
        });

        assert_eq!(store.get().count, 10);
        assert_eq!(store.get().name, "test");
    }

    #[test]
    fn merge_returning_none_is_silent() {
        let store = app_store();
        let (calls, _sub) = counter(&store);
        let before = store.get_snapshot();

        store.merge_with(|_| None);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&before, &store.get_snapshot()));
    }

    #[test]
    fn identical_snapshot_is_silent() {
        let store = app_store();
        let (calls, _sub) = counter(&store);

        store.update(|current| Arc::clone(current));
        store.replace(store.get_snapshot());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn equal_but_distinct_snapshot_notifies() {
        let store = app_store();
        let (calls, _sub) = counter(&store);

        store.set(store.get());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn store_subscribe() {
        let store = app_store();
        let (calls, _sub) = counter(&store);

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.merge_with(|state| {
            Some(AppPatch {
                count: Some(state.count + 1),
                ..Default::default()
            })
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.merge_with(|state| {
            Some(AppPatch {
                count: Some(state.count + 1),
                ..Default::default()
            })
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get().count, 2);
    }

    #[test]
    fn failing_update_leaves_state() {
        let store = app_store();
        let (calls, _sub) = counter(&store);
        let before = store.get_snapshot();

        let result: Result<(), &str> = store.try_merge_with(|_| Err("rejected"));

        assert_eq!(result, Err("rejected"));
        assert!(Arc::ptr_eq(&before, &store.get_snapshot()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = app_store();
        let (calls, sub) = counter(&store);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());

        store.set(store.get());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let store = app_store();
        let (calls, sub) = counter(&store);
        drop(sub);

        store.set(store.get());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn detached_subscription_survives() {
        let store = app_store();
        let (calls, sub) = counter(&store);
        sub.detach();

        store.set(store.get());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let store = Store::new(0_u32);
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..3)
            .map(|i| {
                let order = order.clone();
                store.subscribe(move || order.lock().push(i))
            })
            .collect();

        store.set(1);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn reentrant_update_delivers_every_pass() {
        let store = Store::new(0_u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let reentrant = {
            let handle = store.clone();
            store.subscribe(move || {
                if *handle.get_snapshot() == 1 {
                    handle.set(2);
                }
            })
        };
        let recorder = {
            let store_ref = store.clone();
            let seen = seen.clone();
            store.subscribe(move || seen.lock().push(*store_ref.get_snapshot()))
        };

        store.set(1);

        // The nested pass ran to completion inside the outer one.
        assert_eq!(*seen.lock(), vec![2, 2]);
        assert_eq!(store.get(), 2);
        drop((reentrant, recorder));
    }

    #[test]
    fn reset_restores_initial() {
        let store = app_store();
        store.merge(AppPatch {
            count: Some(3),
            name: Some("other".into()),
        });
        store.reset();

        assert_eq!(*store.get_initial_snapshot(), *store.get_snapshot());
        assert!(Arc::ptr_eq(
            &store.get_initial_snapshot(),
            &store.get_snapshot()
        ));
    }

    #[test]
    fn label_defaults_to_type_name() {
        let store = Store::new(5_i64);
        assert_eq!(store.label(), "i64");

        let named = Store::with_options(5_i64, StoreOptions::default().label("ticks"));
        assert_eq!(named.label(), "ticks");
    }

    #[test]
    fn changed_resolves_on_next_change() {
        let store = Store::new(0_u8);
        let changed = store.changed();
        store.set(1);
        futures::executor::block_on(changed);
        assert_eq!(store.listener_count(), 0);
    }
}
