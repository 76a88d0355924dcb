use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::facets::{Facets, Provide};
use crate::error::ContextError;

/// One provided instance on the scope stack.
struct Frame {
    context: usize,
    facets: Box<dyn Any>,
}

// Thread-local stack of provided stores, innermost last.
thread_local! {
    static SCOPE_STACK: RefCell<Vec<Frame>> = RefCell::new(vec![]);
}

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A named slot that a store instance can be provided into.
///
/// The context itself holds no store; it identifies which provided instance
/// [`Context::use_store`] should find. Scopes nest: an inner `provide` of
/// the same context shadows the outer one until its closure returns.
///
/// # Examples
///
/// ```
/// use snapstore::{AsyncStore, Context, Status};
///
/// let users: Context<AsyncStore<Vec<String>>> = Context::new("UserStore");
/// assert!(users.use_store().is_err());
///
/// let store = AsyncStore::new();
/// users.provide(&store, || {
///     let facets = users.use_store().unwrap();
///     facets.actions.hydrate(vec!["ada".to_string()]);
///     assert_eq!(facets.reader.status(), Status::Idle);
/// });
/// ```
pub struct Context<P> {
    id: usize,
    name: &'static str,
    _marker: PhantomData<fn() -> P>,
}

impl<P: Provide> Context<P> {
    /// Create a context identified by `name` in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    /// The name reported when no provider is in scope.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `f` with the facets of `instance` in scope.
    ///
    /// The scope is popped when `f` returns, including by panicking.
    pub fn provide<F, R>(&self, instance: &P, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.provide_facets(Facets::of(instance), f)
    }

    /// Run `f` with already-split facets in scope.
    pub fn provide_facets<F, R>(&self, facets: Facets<P>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                context: self.id,
                facets: Box::new(facets),
            });
        });
        trace!(context = self.name, "store provided");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The facets of the innermost provided instance.
    ///
    /// Fails with [`ContextError::MissingProvider`] outside of any
    /// [`Context::provide`] call for this context.
    pub fn use_store(&self) -> Result<Facets<P>, ContextError> {
        SCOPE_STACK
            .with(|stack| {
                stack
                    .borrow()
                    .iter()
                    .rev()
                    .find(|frame| frame.context == self.id)
                    .and_then(|frame| frame.facets.downcast_ref::<Facets<P>>())
                    .cloned()
            })
            .ok_or(ContextError::MissingProvider { name: self.name })
    }

    /// Whether an instance is currently provided for this context.
    pub fn is_provided(&self) -> bool {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|frame| frame.context == self.id)
        })
    }
}

impl<P> fmt::Debug for Context<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
