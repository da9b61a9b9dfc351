//! A rust library for keyed mutual exclusion.
//!
//! A key mutex grants exclusive ownership of a resource identified by a string key, such as a volume or device identifier.
//! Rather than allocating a lock per key forever, keys are hashed onto a bounded pool of lock slots.
//! Lock requests can be abandoned with a [`CancelToken`] or a timeout, without disturbing other contenders.
//!
//! ## Getting Started
//! - [`HashedKeyMutex`] is the key mutex implementation. Create one with a shard count, or with a shard count of zero for a lock slot per key.
//! - [`KeyMutexTraits`] has the locking API: [`lock_key`](KeyMutexTraits::lock_key), [`unlock_key`](KeyMutexTraits::unlock_key), [`lock_key_with_cancel`](KeyMutexTraits::lock_key_with_cancel) and guard based variants.
//! - [`UsageLogKeyMutex`] logs lock operations for debugging.
//!
//! ## Example
//! ```rust
//! # use std::{sync::Arc, thread, time::Duration};
//! use keymutex::{CancelToken, HashedKeyMutex, KeyMutex, KeyMutexTraits};
//!
//! let key_mutex: KeyMutex = Arc::new(HashedKeyMutex::new(8));
//! key_mutex.lock_key("vol-1");
//!
//! let cancel = CancelToken::new();
//! let waiter = thread::spawn({
//!     let key_mutex = key_mutex.clone();
//!     let cancel = cancel.clone();
//!     move || key_mutex.lock_key_with_cancel("vol-1", &cancel)
//! });
//! thread::sleep(Duration::from_millis(10));
//! cancel.cancel();
//! assert!(!waiter.join().unwrap());
//!
//! key_mutex.unlock_key("vol-1")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! Internal events are emitted with [`tracing`](https://docs.rs/tracing).
//! Unlocking a key which is not locked is reported at the `error` level, in addition to the returned [`KeyMutexError`].
//!
//! ## Licence
//! `keymutex` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod cancel;
pub mod config;
pub mod key_mutex;

pub use cancel::{CancelRegistration, CancelToken};
pub use key_mutex::{
    HashedKeyMutex, KeyMutex, KeyMutexError, KeyMutexGuard, KeyMutexTraits, ShardIndex,
    UsageLogKeyMutex,
};
