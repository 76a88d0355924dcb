//! Snapshot containers.
//!
//! A [`Store`] holds one immutable snapshot, replaces it wholesale on every
//! change, and notifies its listeners synchronously after each replacement.

mod merge;
mod store;
mod subscription;

pub use merge::Merge;
pub use store::{Store, StoreOptions};
pub use subscription::Subscription;

