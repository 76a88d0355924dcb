//! # Snapstore
//!
//! Snapshot stores with a tear-free read contract and an asynchronous task
//! lifecycle on top.
//!
//! ## Store (synchronous)
//!
//! - `Store<S>` - Thread-safe container for one immutable `Arc<S>` snapshot
//! - Shallow merges through the [`Merge`] trait
//! - Listeners notified synchronously, only when the snapshot pointer moves
//!
//! ## AsyncStore (asynchronous)
//!
//! - `AsyncStore<T>` - Store of an [`AsyncState<T>`] driven by producer tasks
//! - At most one current task; superseded results are discarded
//! - Suspending reads that wait on the first load and never on a refresh
//!
//! ## Context
//!
//! - `Context<P>` - Scoped provider handing out a store's [`Reader`] and
//!   command facet, never the store itself
//!
//! ```
//! use snapstore::{AsyncStore, NotReady};
//!
//! let store = AsyncStore::<u32>::new();
//! assert!(matches!(store.read_for_consumer(|n| *n), Err(NotReady::Pending(_))));
//!
//! store.hydrate(7);
//! assert_eq!(store.read_for_consumer(|n| *n).unwrap(), 7);
//! ```

pub mod context;
pub mod contract;
pub mod error;
pub mod store;
pub mod task;

// Re-export main types for convenience
pub use context::{Context, Facets, Provide, Reader, TaskActions};
pub use contract::ExternalStore;
pub use error::{ContextError, TaskError};
pub use store::{Merge, Store, StoreOptions, Subscription};
pub use task::{
    AsyncState, AsyncStore, CancellationToken, Deferred, NotReady, Status, Suspense, TaskFuture,
    TaskOutcome,
};
