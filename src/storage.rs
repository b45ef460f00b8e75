//! Pluggable persistent storage. [`KeyValueStore`] is the raw backend (shared between every
//! execution context that uses the same persisted data) and [`JsonStorage`] is a typed view of a
//! single key in it.
use std::{
    collections::HashMap,
    marker::PhantomData,
    sync::{Arc, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

/// A string key-value backend, e.g. a file, a browser `localStorage` bridge or an in-memory map.
///
/// Operations are synchronous and each call is expected to be atomic with respect to other
/// callers. Anything beyond a single call (read-modify-write) is coordinated by the callers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local [`KeyValueStore`]. Share it through an `Arc` to simulate several contexts using
/// the same persisted data.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::Storage("in-memory store lock poisoned".to_owned()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::Storage("in-memory store lock poisoned".to_owned()))?;
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::Storage("in-memory store lock poisoned".to_owned()))?;
        values.remove(key);
        Ok(())
    }
}

/// Typed storage of a single value.
pub trait Storage<T>: Send + Sync {
    fn get(&self) -> Result<Option<T>>;
    fn set(&self, value: &T) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// [`Storage`] that keeps `T` as JSON under `key`.
pub struct JsonStorage<T> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStorage<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> JsonStorage<T> {
        JsonStorage {
            store,
            key: key.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Storage<T> for JsonStorage<T> {
    fn get(&self) -> Result<Option<T>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                // A corrupted or outdated value is dropped rather than wedging every later read.
                log::warn!(target: "flagsync", key = self.key.as_str(); "discarding unreadable stored value: {err}");
                Ok(None)
            }
        }
    }

    fn set(&self, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&self.key, &raw)
    }

    fn clear(&self) -> Result<()> {
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{InMemoryStore, JsonStorage, KeyValueStore, Storage};

    #[test]
    fn json_storage_persists_in_shared_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let first = JsonStorage::<Vec<String>>::new(store.clone(), "key");
        let second = JsonStorage::<Vec<String>>::new(store.clone(), "key");

        assert_eq!(first.get().unwrap(), None);
        first.set(&vec!["a".to_owned()]).unwrap();
        assert_eq!(second.get().unwrap(), Some(vec!["a".to_owned()]));

        second.clear().unwrap();
        assert_eq!(first.get().unwrap(), None);
    }

    #[test]
    fn unreadable_value_reads_as_missing() {
        let store = Arc::new(InMemoryStore::new());
        store.set("key", "not json").unwrap();
        let storage = JsonStorage::<Vec<String>>::new(store, "key");

        assert_eq!(storage.get().unwrap(), None);
    }
}
