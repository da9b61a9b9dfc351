//! Keyed mutual exclusion.
//!
//! [`KeyMutexTraits`] grants exclusive ownership of a resource identified by a string key.
//! A key is locked with [`lock_key`](KeyMutexTraits::lock_key) and released with [`unlock_key`](KeyMutexTraits::unlock_key).
//! Pending lock requests can be abandoned with a [`CancelToken`] or a timeout.
//!
//! The implementations are:
//!  - [`HashedKeyMutex`] shares a fixed number of lock slots across all keys by hashing, or gives every key its own slot in unbounded mode.
//!  - [`UsageLogKeyMutex`] wraps another key mutex and logs every call.
//!
//! Key mutexes are not reentrant: locking a key that the caller already holds blocks like any other contender.
//! Waiters are not woken in any particular order.

mod hashed;
mod lock_slot;
mod shard_table;
mod usage_log;

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::CancelToken;

pub use hashed::HashedKeyMutex;
pub use shard_table::ShardIndex;
pub use usage_log::UsageLogKeyMutex;

/// [`Arc`] wrapped key mutex.
pub type KeyMutex = Arc<dyn KeyMutexTraits>;

/// A key mutex error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyMutexError {
    /// The key was unlocked, but its lock slot was not held.
    #[error("unlock of key {0} which is not locked")]
    NotLocked(String),
}

/// Traits for a key mutex.
pub trait KeyMutexTraits: Send + Sync + core::fmt::Debug {
    /// Lock `key`, blocking the current thread until it is able to do so.
    ///
    /// The key must be released with [`unlock_key`](KeyMutexTraits::unlock_key).
    fn lock_key(&self, key: &str);

    /// Lock `key` if it is not locked, without blocking.
    ///
    /// Returns true if the key was locked by this call.
    #[must_use]
    fn try_lock_key(&self, key: &str) -> bool;

    /// Lock `key`, blocking the current thread until it is able to do so or `cancel` is cancelled.
    ///
    /// Returns true if the key was locked by this call.
    /// Returns false without blocking if `cancel` is already cancelled.
    /// If the key becomes free as `cancel` is cancelled, exactly one of the two outcomes applies and the key is left in the matching state.
    #[must_use]
    fn lock_key_with_cancel(&self, key: &str, cancel: &CancelToken) -> bool;

    /// Lock `key`, blocking the current thread until it is able to do so or `timeout` elapses.
    ///
    /// Returns true if the key was locked by this call.
    #[must_use]
    fn lock_key_timeout(&self, key: &str, timeout: Duration) -> bool;

    /// Unlock `key`, waking one thread waiting to lock it.
    ///
    /// Ownership is tracked per lock slot rather than per caller.
    /// A key sharing a slot with a locked key is considered locked.
    ///
    /// # Errors
    /// Returns [`KeyMutexError::NotLocked`] if the lock slot of `key` is not held.
    /// The key mutex is left unchanged.
    fn unlock_key(&self, key: &str) -> Result<(), KeyMutexError>;

    /// Lock `key`, blocking the current thread until it is able to do so.
    ///
    /// When the returned guard goes out of scope, the key will be unlocked.
    #[must_use]
    fn lock(&self, key: &str) -> KeyMutexGuard<'_>;

    /// Lock `key`, blocking the current thread until it is able to do so or `cancel` is cancelled.
    ///
    /// Returns [`None`] if cancelled, otherwise a guard which unlocks the key when it goes out of scope.
    #[must_use]
    fn lock_with_cancel(&self, key: &str, cancel: &CancelToken) -> Option<KeyMutexGuard<'_>>;
}

/// A key mutex guard.
///
/// The key is unlocked when the guard is dropped.
#[must_use = "if unused the key will immediately unlock"]
pub struct KeyMutexGuard<'a> {
    key_mutex: &'a dyn KeyMutexTraits,
    key: String,
}

impl<'a> KeyMutexGuard<'a> {
    /// Create a guard for `key` which is already locked in `key_mutex`.
    pub(crate) fn new(key_mutex: &'a dyn KeyMutexTraits, key: &str) -> Self {
        Self {
            key_mutex,
            key: key.to_string(),
        }
    }

    /// The locked key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl core::fmt::Debug for KeyMutexGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyMutexGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyMutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.key_mutex.unlock_key(&self.key) {
            tracing::error!(key = %self.key, %err, "key mutex guard failed to unlock");
        }
    }
}
