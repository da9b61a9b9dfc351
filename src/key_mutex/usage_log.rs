//! A key mutex adapter which logs function calls.

use std::{
    io::Write,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::CancelToken;

use super::{KeyMutexError, KeyMutexGuard, KeyMutexTraits};

/// The usage log key mutex. Logs key mutex method calls.
///
/// It is intended to aid in debugging lock contention and misuse by revealing the order of lock operations.
/// Blocking calls are logged once they return.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::{Arc, Mutex};
/// # use keymutex::{HashedKeyMutex, KeyMutexTraits, UsageLogKeyMutex};
/// let key_mutex = Arc::new(HashedKeyMutex::new(4));
/// let log_writer = Arc::new(Mutex::new(
///     // std::io::BufWriter::new(
///     std::io::stdout(),
///     //    )
/// ));
/// let key_mutex = UsageLogKeyMutex::new(key_mutex, log_writer, || {
///     chrono::Utc::now().format("[%T%.3f] ").to_string()
/// });
/// key_mutex.lock_key("vol-1");
/// key_mutex.unlock_key("vol-1").unwrap();
/// ````
///
/// The above prints outputs like:
/// ```text
/// [23:41:19.885] lock_key(vol-1)
/// [23:41:19.885] unlock_key(vol-1) -> Ok(())
/// ```
pub struct UsageLogKeyMutex<TKeyMutex: ?Sized> {
    key_mutex: Arc<TKeyMutex>,
    handle: Arc<Mutex<dyn Write + Send + Sync>>,
    prefix_func: fn() -> String,
}

impl<TKeyMutex: ?Sized> core::fmt::Debug for UsageLogKeyMutex<TKeyMutex> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "usage log")
    }
}

impl<TKeyMutex: ?Sized> UsageLogKeyMutex<TKeyMutex> {
    /// Create a new usage log key mutex.
    pub fn new(
        key_mutex: Arc<TKeyMutex>,
        handle: Arc<Mutex<dyn Write + Send + Sync>>,
        prefix_func: fn() -> String,
    ) -> Self {
        Self {
            key_mutex,
            handle,
            prefix_func,
        }
    }

    fn log(&self, args: core::fmt::Arguments) {
        // A failing or poisoned log writer must not affect locking.
        if let Ok(mut handle) = self.handle.lock() {
            let _ = writeln!(handle, "{}{args}", (self.prefix_func)());
        }
    }
}

impl<TKeyMutex: ?Sized + KeyMutexTraits> KeyMutexTraits for UsageLogKeyMutex<TKeyMutex> {
    fn lock_key(&self, key: &str) {
        self.key_mutex.lock_key(key);
        self.log(format_args!("lock_key({key})"));
    }

    fn try_lock_key(&self, key: &str) -> bool {
        let result = self.key_mutex.try_lock_key(key);
        self.log(format_args!("try_lock_key({key}) -> {result}"));
        result
    }

    fn lock_key_with_cancel(&self, key: &str, cancel: &CancelToken) -> bool {
        let result = self.key_mutex.lock_key_with_cancel(key, cancel);
        self.log(format_args!("lock_key_with_cancel({key}) -> {result}"));
        result
    }

    fn lock_key_timeout(&self, key: &str, timeout: Duration) -> bool {
        let result = self.key_mutex.lock_key_timeout(key, timeout);
        self.log(format_args!("lock_key_timeout({key}, {timeout:?}) -> {result}"));
        result
    }

    fn unlock_key(&self, key: &str) -> Result<(), KeyMutexError> {
        let result = self.key_mutex.unlock_key(key);
        self.log(format_args!("unlock_key({key}) -> {result:?}"));
        result
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
