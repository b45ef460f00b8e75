use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{model::Event, mutex::FastMutex, storage::Storage, Result};

/// Persisted event queue for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQueueSnapshot {
    pub user_id: String,
    /// Oldest first.
    pub events: Vec<Event>,
}

/// Ordered queue of pending events.
#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn add(&self, event: Event) -> Result<()>;
    async fn add_all(&self, events: Vec<Event>) -> Result<()>;
    /// Remove the events with the given ids, keeping the relative order of the rest.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<Event>>;
    async fn clear(&self) -> Result<()>;
}

/// [`EventStorage`] that serializes read-modify-write cycles within the process only.
///
/// A queue persisted for another user is dropped on the next write.
pub struct DefaultEventStorage {
    user_id: String,
    storage: Box<dyn Storage<EventQueueSnapshot>>,
    write_lock: Mutex<()>,
}

impl DefaultEventStorage {
    pub fn new(
        user_id: impl Into<String>,
        storage: Box<dyn Storage<EventQueueSnapshot>>,
    ) -> DefaultEventStorage {
        DefaultEventStorage {
            user_id: user_id.into(),
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Vec<Event>> {
        Ok(match self.storage.get()? {
            Some(snapshot) if snapshot.user_id == self.user_id => snapshot.events,
            Some(snapshot) => {
                log::debug!(target: "flagsync", stored_user_id = snapshot.user_id.as_str(); "ignoring event queue of another user");
                Vec::new()
            }
            None => Vec::new(),
        })
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<Event>)) -> Result<()> {
        let _lock = self.lock();
        let mut events = self.read()?;
        f(&mut events);
        self.storage.set(&EventQueueSnapshot {
            user_id: self.user_id.clone(),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventStorage for DefaultEventStorage {
    async fn add(&self, event: Event) -> Result<()> {
        self.modify(|events| events.push(event))
    }

    async fn add_all(&self, new_events: Vec<Event>) -> Result<()> {
        self.modify(|events| events.extend(new_events))
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.modify(|events| events.retain(|event| !ids.contains(event.id.as_str())))
    }

    async fn get_all(&self) -> Result<Vec<Event>> {
        self.read()
    }

    async fn clear(&self) -> Result<()> {
        let _lock = self.lock();
        self.storage.clear()
    }
}

/// [`EventStorage`] whose operations also hold a [`FastMutex`], excluding other execution
/// contexts that share the same store.
pub struct LockedEventStorage<S> {
    inner: S,
    mutex: FastMutex,
}

impl<S: EventStorage> LockedEventStorage<S> {
    pub fn new(inner: S, mutex: FastMutex) -> LockedEventStorage<S> {
        LockedEventStorage { inner, mutex }
    }
}

#[async_trait]
impl<S: EventStorage> EventStorage for LockedEventStorage<S> {
    async fn add(&self, event: Event) -> Result<()> {
        self.mutex.with_lock(|| self.inner.add(event)).await
    }

    async fn add_all(&self, events: Vec<Event>) -> Result<()> {
        self.mutex.with_lock(|| self.inner.add_all(events)).await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        self.mutex.with_lock(|| self.inner.delete_by_ids(ids)).await
    }

    async fn get_all(&self) -> Result<Vec<Event>> {
        self.mutex.with_lock(|| self.inner.get_all()).await
    }

    async fn clear(&self) -> Result<()> {
        self.mutex.with_lock(|| self.inner.clear()).await
    }
}
