//! Provider scopes for stores.
//!
//! A store type declares two facets through [`Provide`]: a read-only
//! [`Reader`] and a hand-declared command type. A [`Context`] puts both
//! facets of one instance in scope for a closure; code running inside can
//! look them up with [`Context::use_store`] without ever receiving the
//! instance itself.

mod facets;
mod scope;

pub use facets::{Facets, Provide, Reader, TaskActions};
pub use scope::Context;
