use std::sync::{Arc, Mutex};

use derive_more::Display;

/// Token returned on subscription. Pass it back to unsubscribe.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    pub(crate) fn new(id: String) -> ListenerId {
        ListenerId(id)
    }
}

/// An ordered list of callbacks.
///
/// Listeners are invoked synchronously in registration order. The list is snapshotted before
/// invocation, so a listener may add or remove listeners without deadlocking.
pub(crate) struct ListenerRegistry<L: ?Sized> {
    listeners: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        ListenerRegistry {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, id: ListenerId, listener: Arc<L>) -> ListenerId {
        let mut listeners = self.lock();
        listeners.push((id.clone(), listener));
        id
    }

    /// Returns `true` if the listener was registered.
    pub(crate) fn remove(&self, id: &ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<L>)>> {
        // A listener panicking must not disable notifications for everyone else.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ListenerRegistry<dyn Fn() + Send + Sync> {
    pub(crate) fn notify(&self) {
        for listener in self.snapshot() {
            listener();
        }
    }
}
