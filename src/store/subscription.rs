use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// Registered listeners, keyed by a never-reused id so that iteration order
/// is registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, listener);
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Copy of the current listeners for one notification pass.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.entries.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// RAII handle for a store listener.
///
/// Dropping the handle removes the listener. Use [`Subscription::detach`] to
/// keep the listener for as long as the store lives.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, listeners: &Arc<Mutex<Listeners>>) -> Self {
        Self {
            id,
            listeners: Arc::downgrade(listeners),
        }
    }

    /// Remove the listener.
    ///
    /// Returns `true` only for the call that actually removed it; later calls
    /// are no-ops.
    pub fn unsubscribe(&self) -> bool {
        match self.listeners.upgrade() {
            Some(listeners) => listeners.lock().remove(self.id),
            None => false,
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|listeners| listeners.lock().contains(self.id))
    }

    /// Keep the listener registered for the lifetime of the store.
    pub fn detach(mut self) {
        self.listeners = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
