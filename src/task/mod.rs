//! Asynchronous task lifecycle.
//!
//! An [`AsyncStore`] wraps an [`AsyncState`] snapshot and sequences the
//! tasks that produce it:
//! - Starting a task cancels the previous task's [`CancellationToken`]
//! - Only the current task commits; superseded results are dropped
//! - First-load readers suspend on a shared [`Deferred`] handle
//! - Refreshes keep the previous data readable

mod deferred;
mod state;
mod store;
mod token;

pub use deferred::{Deferred, Suspense};
pub use state::{AsyncState, NotReady, Status};
pub use store::{AsyncStore, TaskFuture, TaskOutcome};
pub use token::CancellationToken;
