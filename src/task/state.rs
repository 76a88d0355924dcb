use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::deferred::{Deferred, Suspense};
use crate::error::TaskError;

/// Coarse status of an [`AsyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Uninitialized,
    Pending,
    Idle,
    Error,
}

/// Snapshot of an asynchronously produced value.
///
/// | variant         | loading | refreshing      | data    | error | deferred |
/// |-----------------|---------|-----------------|---------|-------|----------|
/// | `Uninitialized` | no      | no              | -       | -     | yes      |
/// | `Pending`       | yes     | `stale.is_some()` | stale | -     | yes      |
/// | `Idle`          | no      | no              | yes     | -     | -        |
/// | `Error`         | no      | no              | -       | yes   | -        |
pub enum AsyncState<T> {
    /// Nothing has been produced yet. Early readers share `deferred`.
    Uninitialized { deferred: Deferred<T> },
    /// A task is in flight. `stale` carries the previous data during a refresh.
    Pending {
        stale: Option<Arc<T>>,
        deferred: Deferred<T>,
    },
    /// The latest task produced `data`.
    Idle { data: Arc<T> },
    /// The latest task failed.
    Error { error: TaskError },
}

impl<T> AsyncState<T> {
    /// Nothing loaded yet, with a fresh deferred for early readers.
    pub fn uninitialized() -> Self {
        AsyncState::Uninitialized {
            deferred: Deferred::new(),
        }
    }

    /// Settled with `data`.
    pub fn idle(data: T) -> Self {
        AsyncState::Idle {
            data: Arc::new(data),
        }
    }

    /// The variant as a plain [`Status`].
    pub fn status(&self) -> Status {
        match self {
            AsyncState::Uninitialized { .. } => Status::Uninitialized,
            AsyncState::Pending { .. } => Status::Pending,
            AsyncState::Idle { .. } => Status::Idle,
            AsyncState::Error { .. } => Status::Error,
        }
    }

    /// Whether a task is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, AsyncState::Pending { .. })
    }

    /// A task is in flight while previous data stays readable.
    pub fn is_refreshing(&self) -> bool {
        matches!(self, AsyncState::Pending { stale: Some(_), .. })
    }

    /// Current data, or the stale data carried through a refresh.
    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            AsyncState::Idle { data } => Some(data),
            AsyncState::Pending { stale, .. } => stale.as_ref(),
            _ => None,
        }
    }

    /// The failure recorded by the latest task, if any.
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            AsyncState::Error { error } => Some(error),
            _ => None,
        }
    }

    /// The handle early readers wait on while nothing is readable.
    pub fn deferred(&self) -> Option<&Deferred<T>> {
        match self {
            AsyncState::Uninitialized { deferred } | AsyncState::Pending { deferred, .. } => {
                Some(deferred)
            }
            _ => None,
        }
    }

    /// Read path for suspending consumers.
    ///
    /// A refresh never blocks: stale data is handed to `selector` as is.
    /// Otherwise pending states suspend on the shared deferred, failures are
    /// surfaced, and idle data is selected. Pure: the snapshot is not touched.
    pub fn select<R, F>(&self, selector: F) -> Result<R, NotReady<T>>
    where
        F: FnOnce(&T) -> R,
    {
        match self {
            AsyncState::Pending {
                stale: Some(data), ..
            }
            | AsyncState::Idle { data } => Ok(selector(&**data)),
            AsyncState::Uninitialized { deferred } | AsyncState::Pending { deferred, .. } => {
                Err(NotReady::Pending(deferred.suspense()))
            }
            AsyncState::Error { error } => Err(NotReady::Failed(error.clone())),
        }
    }

    /// The pending state entered when a new task starts from `self`.
    ///
    /// An unsettled deferred is reused so every early reader waits on the
    /// same point; a settled or missing one is replaced.
    pub(crate) fn begin_pending(&self) -> Self {
        fn reuse<T>(deferred: &Deferred<T>) -> Deferred<T> {
            if deferred.is_settled() {
                Deferred::new()
            } else {
                deferred.clone()
            }
        }

        match self {
            AsyncState::Uninitialized { deferred } => AsyncState::Pending {
                stale: None,
                deferred: reuse(deferred),
            },
            AsyncState::Pending { stale, deferred } => AsyncState::Pending {
                stale: stale.clone(),
                deferred: reuse(deferred),
            },
            AsyncState::Idle { data } => AsyncState::Pending {
                stale: Some(Arc::clone(data)),
                deferred: Deferred::new(),
            },
            AsyncState::Error { .. } => AsyncState::Pending {
                stale: None,
                deferred: Deferred::new(),
            },
        }
    }
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl<T> Clone for AsyncState<T> {
    fn clone(&self) -> Self {
        match self {
            AsyncState::Uninitialized { deferred } => AsyncState::Uninitialized {
                deferred: deferred.clone(),
            },
            AsyncState::Pending { stale, deferred } => AsyncState::Pending {
                stale: stale.clone(),
                deferred: deferred.clone(),
            },
            AsyncState::Idle { data } => AsyncState::Idle {
                data: Arc::clone(data),
            },
            AsyncState::Error { error } => AsyncState::Error {
                error: error.clone(),
            },
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncState::Uninitialized { deferred } => f
                .debug_struct("Uninitialized")
                .field("deferred", deferred)
                .finish(),
            AsyncState::Pending { stale, deferred } => f
                .debug_struct("Pending")
                .field("stale", stale)
                .field("deferred", deferred)
                .finish(),
            AsyncState::Idle { data } => f.debug_struct("Idle").field("data", data).finish(),
            AsyncState::Error { error } => f.debug_struct("Error").field("error", error).finish(),
        }
    }
}

/// Why [`AsyncState::select`] could not produce a value.
#[derive(Error)]
pub enum NotReady<T> {
    /// No usable data yet; wait on the suspense and read again.
    #[error("value is still loading")]
    Pending(Suspense<T>),

    #[error(transparent)]
    Failed(TaskError),
}

impl<T> NotReady<T> {
    /// Whether the read should be retried once the suspense settles.
    pub fn is_pending(&self) -> bool {
        matches!(self, NotReady::Pending(_))
    }
}

impl<T> fmt::Debug for NotReady<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReady::Pending(suspense) => f.debug_tuple("Pending").field(suspense).finish(),
            NotReady::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}
