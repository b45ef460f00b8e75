//! A storage-backed mutual exclusion primitive for execution contexts (processes, tabs, workers)
//! that share nothing but a [`KeyValueStore`].
//!
//! This is Lamport's fast mutex. Each lock uses two keys: `<name>_x` holds the id of the last
//! context that started acquiring, `<name>_y` holds the current owner together with the time it
//! took the lock. An owner that crashed while holding the lock is ignored once its `y` entry is
//! older than [`FastMutexOptions::lock_expiry`].
//!
//! The lock is advisory: it only excludes contexts that use the same protocol and names.
use std::{future::Future, sync::Arc, time::Duration};

use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::{clock::Clock, storage::KeyValueStore, Error, Result};

/// Timing configuration for [`FastMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastMutexOptions {
    /// Age after which a held lock is considered abandoned.
    pub lock_expiry: Duration,
    /// Give up acquiring after this much time.
    pub timeout: Duration,
    /// Give up acquiring after this many attempts.
    pub max_retries: u32,
    /// Wait between attempts, and the contention delay before re-checking ownership.
    pub backoff: Duration,
    /// Random extra wait added to `backoff` so that competing contexts drift apart.
    pub jitter: Duration,
}

impl Default for FastMutexOptions {
    fn default() -> Self {
        FastMutexOptions {
            lock_expiry: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            max_retries: 200,
            backoff: Duration::from_millis(20),
            jitter: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Owner {
    id: String,
    time: i64,
}

/// Outcome of the non-blocking part of one acquisition attempt.
enum Attempt {
    Acquired,
    /// Someone else holds the lock.
    Busy,
    /// Someone else started acquiring after us. Wait, then check whether we still own `y`.
    Contended,
}

pub struct FastMutex {
    store: Arc<dyn KeyValueStore>,
    name: String,
    key_x: String,
    key_y: String,
    client_id: String,
    clock: Arc<dyn Clock>,
    options: FastMutexOptions,
}

impl FastMutex {
    /// Create a mutex named `name` for the context identified by `client_id`.
    ///
    /// Fails if the store can't be written and read back.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        name: impl Into<String>,
        client_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        options: FastMutexOptions,
    ) -> Result<FastMutex> {
        let name = name.into();
        let client_id = client_id.into();

        let probe_key = format!("{name}_probe_{client_id}");
        store.set(&probe_key, &client_id)?;
        if store.get(&probe_key)?.as_deref() != Some(client_id.as_str()) {
            return Err(Error::Storage(format!(
                "store does not persist values for mutex {name}"
            )));
        }
        store.remove(&probe_key)?;

        Ok(FastMutex {
            store,
            key_x: format!("{name}_x"),
            key_y: format!("{name}_y"),
            name,
            client_id,
            clock,
            options,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run `operation` while holding the lock. The lock is released afterwards, including when
    /// the operation fails or panics.
    pub async fn with_lock<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.lock().await?;
        operation().await
    }

    /// Blocking version of [`FastMutex::with_lock`]. Sleeps the current thread while waiting, so
    /// it must not be called from async code.
    pub fn with_lock_sync<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let _guard = self.lock_sync()?;
        operation()
    }

    pub async fn lock(&self) -> Result<FastMutexGuard<'_>> {
        let started = tokio::time::Instant::now();
        let mut attempts = 0;
        loop {
            let acquired = match self.attempt() {
                Ok(Attempt::Acquired) => true,
                Ok(Attempt::Busy) => false,
                Ok(Attempt::Contended) => {
                    tokio::time::sleep(self.options.backoff).await;
                    self.owns_y()
                }
                Err(err) => {
                    self.clear_own_slots();
                    return Err(err);
                }
            };
            if acquired {
                return Ok(FastMutexGuard { mutex: self });
            }

            attempts += 1;
            if attempts > self.options.max_retries || started.elapsed() >= self.options.timeout {
                return Err(self.timed_out());
            }
            tokio::time::sleep(self.backoff_delay()).await;
        }
    }

    pub fn lock_sync(&self) -> Result<FastMutexGuard<'_>> {
        let started = std::time::Instant::now();
        let mut attempts = 0;
        loop {
            let acquired = match self.attempt() {
                Ok(Attempt::Acquired) => true,
                Ok(Attempt::Busy) => false,
                Ok(Attempt::Contended) => {
                    std::thread::sleep(self.options.backoff);
                    self.owns_y()
                }
                Err(err) => {
                    self.clear_own_slots();
                    return Err(err);
                }
            };
            if acquired {
                return Ok(FastMutexGuard { mutex: self });
            }

            attempts += 1;
            if attempts > self.options.max_retries || started.elapsed() >= self.options.timeout {
                return Err(self.timed_out());
            }
            std::thread::sleep(self.backoff_delay());
        }
    }

    fn attempt(&self) -> Result<Attempt> {
        self.store.set(&self.key_x, &self.client_id)?;

        if let Some(owner) = self.read_y()? {
            if owner.id != self.client_id && !self.is_expired(&owner) {
                return Ok(Attempt::Busy);
            }
        }

        let owner = Owner {
            id: self.client_id.clone(),
            time: self.clock.now_millis(),
        };
        self.store.set(&self.key_y, &serde_json::to_string(&owner)?)?;

        if self.store.get(&self.key_x)?.as_deref() != Some(self.client_id.as_str()) {
            return Ok(Attempt::Contended);
        }

        // `y` may have been overwritten by a context that read it empty before we wrote it.
        if self.owns_y() {
            Ok(Attempt::Acquired)
        } else {
            Ok(Attempt::Busy)
        }
    }

    fn read_y(&self) -> Result<Option<Owner>> {
        let Some(raw) = self.store.get(&self.key_y)? else {
            return Ok(None);
        };
        // An unreadable entry can't name an owner, treat it as free.
        Ok(serde_json::from_str(&raw).ok())
    }

    fn owns_y(&self) -> bool {
        matches!(self.read_y(), Ok(Some(owner)) if owner.id == self.client_id)
    }

    fn is_expired(&self, owner: &Owner) -> bool {
        let age = self.clock.now_millis().saturating_sub(owner.time);
        age >= self.options.lock_expiry.as_millis() as i64
    }

    fn backoff_delay(&self) -> Duration {
        if self.options.jitter.is_zero() {
            return self.options.backoff;
        }
        self.options.backoff + thread_rng().gen_range(Duration::ZERO..=self.options.jitter)
    }

    fn timed_out(&self) -> Error {
        self.clear_own_slots();
        log::warn!(target: "flagsync", mutex = self.name.as_str(), client_id = self.client_id.as_str(); "failed to acquire lock");
        Error::Timeout {
            message: format!("failed to acquire lock {}", self.name),
            timeout_millis: self.options.timeout.as_millis() as u64,
        }
    }

    /// Best-effort: failures are logged.
    fn release(&self) {
        self.clear_own_slots();
        log::trace!(target: "flagsync", mutex = self.name.as_str(), client_id = self.client_id.as_str(); "released lock");
    }

    fn clear_own_slots(&self) {
        if self.owns_y() {
            if let Err(err) = self.store.remove(&self.key_y) {
                log::warn!(target: "flagsync", mutex = self.name.as_str(); "failed to clear lock owner: {err}");
            }
        }
        match self.store.get(&self.key_x) {
            Ok(Some(x)) if x == self.client_id => {
                if let Err(err) = self.store.remove(&self.key_x) {
                    log::warn!(target: "flagsync", mutex = self.name.as_str(); "failed to clear lock claim: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!(target: "flagsync", mutex = self.name.as_str(); "failed to read lock claim: {err}");
            }
        }
    }
}

/// Releases the lock on drop.
pub struct FastMutexGuard<'a> {
    mutex: &'a FastMutex,
}

impl Drop for FastMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
