//! Hashed key mutex.

use std::time::{Duration, Instant};

use crate::{config::global_config, CancelToken};

use super::{
    shard_table::{ShardIndex, ShardTable},
    KeyMutexError, KeyMutexGuard, KeyMutexTraits,
};

/// A key mutex which hashes keys to a fixed number of lock slots.
///
/// Keys sharing a slot serialize each other, which costs throughput but not correctness.
///
/// With a shard count of zero, the key mutex is *unbounded*: every key gets its own lock slot on first use.
/// Slots are never removed, so memory grows with the number of distinct keys ever locked.
///
/// ### Example
/// ```rust
/// # use keymutex::{CancelToken, HashedKeyMutex, KeyMutexTraits};
/// let key_mutex = HashedKeyMutex::new(4);
/// key_mutex.lock_key("vol-1");
/// assert!(!key_mutex.try_lock_key("vol-1"));
///
/// let cancel = CancelToken::new();
/// cancel.cancel();
/// assert!(!key_mutex.lock_key_with_cancel("vol-1", &cancel));
///
/// key_mutex.unlock_key("vol-1")?;
/// # Ok::<(), keymutex::KeyMutexError>(())
/// ```
#[derive(Debug)]
pub struct HashedKeyMutex {
    slots: ShardTable,
}

impl Default for HashedKeyMutex {
    /// Create a hashed key mutex with the [default shard count](crate::config::Config#default-shard-count).
    fn default() -> Self {
        Self::new(global_config().default_shard_count())
    }
}

impl HashedKeyMutex {
    /// Create a new hashed key mutex with `shard_count` lock slots.
    ///
    /// A `shard_count` of zero creates an [unbounded](HashedKeyMutex::new_unbounded) key mutex.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            slots: ShardTable::new(shard_count),
        }
    }

    /// Create a new key mutex with a lock slot per key.
    #[must_use]
    pub fn new_unbounded() -> Self {
        Self::new(0)
    }

    /// Returns the number of shards, or zero if unbounded.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.slots.shard_count()
    }

    /// Returns the number of lock slots.
    ///
    /// This is the shard count, or the number of distinct keys seen so far if unbounded.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.slot_count()
    }

    /// Returns the index of the shard governing `key`, or [`None`] if unbounded.
    #[must_use]
    pub fn shard_index(&self, key: &str) -> Option<ShardIndex> {
        self.slots.shard_index(key)
    }

    /// Returns true if the lock slot of `key` is held.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.is_held())
    }

    fn acquire(&self, key: &str, cancel: Option<&CancelToken>, deadline: Option<Instant>) -> bool {
        let slot = self.slots.resolve(key);
        if slot.try_acquire() {
            return true;
        }
        tracing::trace!(key, waiters = slot.waiters(), "waiting for lock slot");
        slot.acquire(cancel, deadline)
    }
}

impl KeyMutexTraits for HashedKeyMutex {
    fn lock_key(&self, key: &str) {
        let acquired = self.acquire(key, None, None);
        debug_assert!(acquired);
    }

    fn try_lock_key(&self, key: &str) -> bool {
        self.slots.resolve(key).try_acquire()
    }

    fn lock_key_with_cancel(&self, key: &str, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            tracing::debug!(key, "lock cancelled before acquisition");
            return false;
        }
        let acquired = self.acquire(key, Some(cancel), None);
        if !acquired {
            tracing::debug!(key, "lock cancelled");
        }
        acquired
    }

    fn lock_key_timeout(&self, key: &str, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let acquired = self.acquire(key, None, deadline);
        if !acquired {
            tracing::debug!(key, ?timeout, "lock timed out");
        }
        acquired
    }

    fn unlock_key(&self, key: &str) -> Result<(), KeyMutexError> {
        if self.slots.get(key).is_some_and(|slot| slot.release()) {
            Ok(())
        } else {
            tracing::error!(key, "unlock of key which is not locked");
            Err(KeyMutexError::NotLocked(key.to_string()))
        }
    }

    fn lock(&self, key: &str) -> KeyMutexGuard<'_> {
        self.lock_key(key);
        KeyMutexGuard::new(self, key)
    }

    fn lock_with_cancel(&self, key: &str, cancel: &CancelToken) -> Option<KeyMutexGuard<'_>> {
        self.lock_key_with_cancel(key, cancel)
            .then(|| KeyMutexGuard::new(self, key))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    use super::*;

    const SHARD_COUNTS: [usize; 4] = [0, 1, 2, 4];

    #[test]
    #[cfg_attr(miri, ignore)]
    fn hashed_key_mutex_exclusion() {
        for shard_count in SHARD_COUNTS {
            let key_mutex = HashedKeyMutex::new(shard_count);
            let locks_held = AtomicUsize::new(0);
            let max_locks_held = AtomicUsize::new(0);
            (0..20).into_par_iter().for_each(|i| {
                let cancel = CancelToken::new();
                match i % 3 {
                    0 => key_mutex.lock_key("fakeid"),
                    1 => assert!(key_mutex.lock_key_with_cancel("fakeid", &cancel)),
                    _ => assert!(key_mutex.lock_key_timeout("fakeid", Duration::from_secs(60))),
                }
                let held = locks_held.fetch_add(1, Ordering::SeqCst) + 1;
                max_locks_held.fetch_max(held, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2));
                locks_held.fetch_sub(1, Ordering::SeqCst);
                key_mutex.unlock_key("fakeid").unwrap();
            });
            assert_eq!(max_locks_held.load(Ordering::SeqCst), 1);
            assert!(!key_mutex.is_locked("fakeid"));
        }
    }

    #[test]
    fn hashed_key_mutex_unlock_not_locked() {
        for shard_count in SHARD_COUNTS {
            let key_mutex = HashedKeyMutex::new(shard_count);
            assert_eq!(
                key_mutex.unlock_key("fakeid"),
                Err(KeyMutexError::NotLocked("fakeid".to_string()))
            );
            key_mutex.lock_key("fakeid");
            assert!(key_mutex.unlock_key("fakeid").is_ok());
            assert!(key_mutex.unlock_key("fakeid").is_err());
            assert!(key_mutex.try_lock_key("fakeid"));
            assert!(key_mutex.is_locked("fakeid"));
            key_mutex.unlock_key("fakeid").unwrap();
        }
    }

    #[test]
    fn hashed_key_mutex_unbounded() {
        let key_mutex = HashedKeyMutex::new_unbounded();
        assert_eq!(key_mutex.shard_count(), 0);
        assert!(key_mutex.shard_index("a").is_none());
        assert!(key_mutex.unlock_key("a").is_err());
        assert_eq!(key_mutex.slot_count(), 0);

        key_mutex.lock_key("a");
        assert!(key_mutex.try_lock_key("b"));
        assert!(!key_mutex.try_lock_key("a"));
        assert_eq!(key_mutex.slot_count(), 2);
        key_mutex.unlock_key("a").unwrap();
        key_mutex.unlock_key("b").unwrap();
        assert_eq!(key_mutex.slot_count(), 2);
    }

    #[test]
    fn hashed_key_mutex_shared_shard() {
        let key_mutex = HashedKeyMutex::new(1);
        assert_eq!(key_mutex.shard_index("a"), key_mutex.shard_index("b"));
        key_mutex.lock_key("a");
        assert!(key_mutex.is_locked("b"));
        assert!(!key_mutex.lock_key_timeout("b", Duration::from_millis(10)));
        key_mutex.unlock_key("a").unwrap();
        assert!(key_mutex.try_lock_key("b"));
        key_mutex.unlock_key("b").unwrap();
    }

    #[test]
    fn hashed_key_mutex_guard() {
        let key_mutex: Arc<dyn KeyMutexTraits> = Arc::new(HashedKeyMutex::new(2));
        {
            let guard = key_mutex.lock("fakeid");
            assert_eq!(guard.key(), "fakeid");
            assert!(!key_mutex.try_lock_key("fakeid"));
        }
        assert!(key_mutex.try_lock_key("fakeid"));
        key_mutex.unlock_key("fakeid").unwrap();

        let cancel = CancelToken::new();
        let guard = key_mutex.lock_with_cancel("fakeid", &cancel);
        assert!(guard.is_some());
        cancel.cancel();
        assert!(key_mutex.lock_with_cancel("fakeid", &cancel).is_none());
        drop(guard);
        assert!(key_mutex.unlock_key("fakeid").is_err());
    }

    #[test]
    fn hashed_key_mutex_cancelled_when_free() {
        let key_mutex = HashedKeyMutex::new(4);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!key_mutex.lock_key_with_cancel("fakeid", &cancel));
        assert!(!key_mutex.is_locked("fakeid"));
    }

    #[test]
    fn hashed_key_mutex_default() {
        let key_mutex = HashedKeyMutex::default();
        assert!(key_mutex.shard_count() > 0);
        assert!(key_mutex.shard_index("fakeid").is_some());
    }
}
