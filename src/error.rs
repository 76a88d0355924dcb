//! Error types for snapstore.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// A failure captured from a task producer.
///
/// Task failures never escape `run_task`; they are recorded in the
/// `Error` branch of [`AsyncState`](crate::AsyncState) and handed to
/// suspended readers. The type is cheap to clone so every reader of a
/// snapshot can observe the same value.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),

    #[error("task panicked: {0}")]
    Panicked(Arc<str>),

    #[error("task was abandoned before it settled")]
    Abandoned,
}

impl TaskError {
    /// Normalize any producer error into a `TaskError`.
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        TaskError::Failed(Arc::new(error.into()))
    }

    /// Build a `TaskError` from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "opaque panic payload".to_string()
        };
        TaskError::Panicked(message.into())
    }

    /// The underlying producer error, if this failure came from one.
    pub fn source_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed(err) => Some(&**err),
            _ => None,
        }
    }
}

/// Configuration failures raised by the provider scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("`{name}` was used outside of its provider; call it inside `{name}.provide(..)`")]
    MissingProvider { name: &'static str },
}
