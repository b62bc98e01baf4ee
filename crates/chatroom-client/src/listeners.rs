//! Ordered callback sets.
//!
//! Listeners are invoked in registration order on the inbound task that
//! decoded the event. Registration and removal are meant to be done from
//! the owning (presentation) context; the lock only keeps the inbound task
//! from observing a half-updated list.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Handle returned by [`ListenerSet::add`], used to remove the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Callbacks for one event type, kept in registration order.
pub struct ListenerSet<E> {
    entries: RwLock<Vec<(ListenerId, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> ListenerSet<E> {
    /// Empty set.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Append a callback.
    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invoke every callback with `event`, in registration order.
    ///
    /// The list is copied first so a callback may add or remove listeners.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self.entries.read().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ListenerSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}
