//! Cooperative cancellation.
//!
//! A [`CancelToken`] is owned by the caller of a cancellable operation such as
//! [`KeyMutexTraits::lock_key_with_cancel`](crate::key_mutex::KeyMutexTraits::lock_key_with_cancel).
//! The operation never cancels a token itself, it only observes it.
//!
//! Blocking operations learn about cancellation through callbacks registered with [`CancelToken::on_cancel`].
//! A registration lives until its [`CancelRegistration`] is dropped, so a waiter that returns leaves nothing behind on the token.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CancelCallbacks {
    next_id: u64,
    callbacks: HashMap<u64, CancelCallback>,
    children: Vec<Weak<CancelState>>,
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    callbacks: Mutex<CancelCallbacks>,
}

impl CancelState {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Callbacks run outside the lock, they may take other locks.
        let (callbacks, children) = {
            let mut inner = self.callbacks.lock();
            (
                std::mem::take(&mut inner.callbacks),
                std::mem::take(&mut inner.children),
            )
        };
        for callback in callbacks.into_values() {
            callback();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cancellation signal shared between the owner of an operation and the operation itself.
///
/// Clones refer to the same signal. Once cancelled, a token stays cancelled.
///
/// ```rust
/// # use keymutex::CancelToken;
/// let token = CancelToken::new();
/// let child = token.child_token();
/// assert!(!child.is_cancelled());
/// token.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancelToken {
    /// Create a new token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token, waking every operation waiting on it.
    ///
    /// Registered callbacks run once, on the calling thread. Cancelling an already cancelled token does nothing.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Create a token that is cancelled along with this one.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child_token(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut inner = self.0.callbacks.lock();
            if !self.is_cancelled() {
                inner.children.retain(|child| child.strong_count() > 0);
                inner.children.push(Arc::downgrade(&child.0));
                return child;
            }
        }
        child.cancel();
        child
    }

    /// Run `callback` when the token is cancelled.
    ///
    /// If the token is already cancelled, `callback` runs immediately on the calling thread.
    /// The callback is deregistered when the returned [`CancelRegistration`] is dropped.
    pub fn on_cancel(&self, callback: impl Fn() + Send + Sync + 'static) -> CancelRegistration {
        {
            let mut inner = self.0.callbacks.lock();
            if !self.is_cancelled() {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.callbacks.insert(id, Box::new(callback));
                return CancelRegistration {
                    token: Arc::downgrade(&self.0),
                    id: Some(id),
                };
            }
        }
        callback();
        CancelRegistration {
            token: Weak::new(),
            id: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_callbacks(&self) -> usize {
        self.0.callbacks.lock().callbacks.len()
    }
}

/// A callback registered with [`CancelToken::on_cancel`].
///
/// Dropping the registration removes the callback from the token.
#[must_use = "dropping the registration deregisters the callback"]
pub struct CancelRegistration {
    token: Weak<CancelState>,
    id: Option<u64>,
}

impl core::fmt::Debug for CancelRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelRegistration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let (Some(id), Some(token)) = (self.id, self.token.upgrade()) {
            token.callbacks.lock().callbacks.remove(&id);
        }
    }
}
