//! Keymutex global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the keymutex crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Default Shard Count
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The number of lock slots of a [`HashedKeyMutex`](crate::HashedKeyMutex) created with [`Default::default`].
/// More shards reduce contention between unrelated keys.
/// A default shard count of zero makes default key mutexes unbounded, with a lock slot per key.
///
/// Changing this option does not affect key mutexes that already exist.
#[derive(Debug)]
pub struct Config {
    default_shard_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_shard_count: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

impl Config {
    /// Get the [default shard count](#default-shard-count) configuration.
    #[must_use]
    pub fn default_shard_count(&self) -> usize {
        self.default_shard_count
    }

    /// Set the [default shard count](#default-shard-count) configuration.
    pub fn set_default_shard_count(&mut self, shard_count: usize) {
        self.default_shard_count = shard_count;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global keymutex configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global keymutex configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
