use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::TaskError;

type Settlement<T> = Result<Arc<T>, TaskError>;

/// A settle-once result handle.
///
/// The store owns the settling side; readers only ever get a [`Suspense`]
/// that resolves when the handle settles. A handle dropped without settling
/// resolves its waiters with [`TaskError::Abandoned`].
pub struct Deferred<T> {
    inner: Arc<DeferredInner<T>>,
}

struct DeferredInner<T> {
    sender: Mutex<Option<oneshot::Sender<Settlement<T>>>>,
    receiver: Shared<oneshot::Receiver<Settlement<T>>>,
}

impl<T> Deferred<T> {
    /// An unsettled handle.
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            inner: Arc::new(DeferredInner {
                sender: Mutex::new(Some(sender)),
                receiver: receiver.shared(),
            }),
        }
    }

    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: Arc<T>) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn reject(&self, error: TaskError) -> bool {
        self.settle(Err(error))
    }

    pub(crate) fn settle(&self, settlement: Settlement<T>) -> bool {
        match self.inner.sender.lock().take() {
            Some(sender) => {
                // Nobody waiting is fine; the shared receiver keeps the value.
                let _ = sender.send(settlement);
                true
            }
            None => false,
        }
    }

    /// Whether `resolve` or `reject` has already been called.
    pub fn is_settled(&self) -> bool {
        self.inner.sender.lock().is_none()
    }

    /// A future that resolves when this handle settles.
    pub fn suspense(&self) -> Suspense<T> {
        Suspense {
            handle: Arc::downgrade(&self.inner),
            shared: self.inner.receiver.clone(),
        }
    }

    /// Whether both handles are the same settlement point.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// The reader's side of a [`Deferred`].
///
/// Holding a `Suspense` does not keep the handle alive.
pub struct Suspense<T> {
    handle: Weak<DeferredInner<T>>,
    shared: Shared<oneshot::Receiver<Settlement<T>>>,
}

impl<T> Suspense<T> {
    /// Whether polling would complete right away: the handle has settled or
    /// was dropped.
    pub fn is_settled(&self) -> bool {
        self.handle
            .upgrade()
            .map_or(true, |inner| inner.sender.lock().is_none())
    }
}

impl<T> Future for Suspense<T> {
    type Output = Result<Arc<T>, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

impl<T> Clone for Suspense<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Weak::clone(&self.handle),
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Suspense<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspense")
            .field("settled", &self.is_settled())
            .finish()
    }
}
