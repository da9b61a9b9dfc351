//! The exclusion primitive behind a shard or key.

use std::{sync::Arc, time::Instant};

use parking_lot::{Condvar, Mutex};

use crate::CancelToken;

#[derive(Debug, Default)]
struct SlotState {
    held: bool,
    waiters: usize,
}

/// A lock slot.
///
/// Unlike [`parking_lot::Mutex`], a slot is not tied to a guard and can be released by any thread.
/// Blocked acquisitions wait on a condition variable and can be woken early by a [`CancelToken`].
#[derive(Debug, Default)]
pub(crate) struct LockSlot {
    state: Mutex<SlotState>,
    available: Condvar,
}

impl LockSlot {
    /// Acquire the slot if it is free, without blocking.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.held {
            false
        } else {
            state.held = true;
            true
        }
    }

    /// Acquire the slot, blocking until it is free, `cancel` is cancelled, or `deadline` passes.
    ///
    /// Returns true if the slot was acquired.
    /// A cancelled `cancel` always wins, even if the slot is free.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        cancel: Option<&CancelToken>,
        deadline: Option<Instant>,
    ) -> bool {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return false;
        }
        if self.try_acquire() {
            return true;
        }

        // Registered before the slot lock is taken, the callback takes it.
        let _registration = cancel.map(|cancel| {
            let slot = Arc::clone(self);
            cancel.on_cancel(move || slot.wake_all())
        });

        let mut state = self.state.lock();
        state.waiters += 1;
        let acquired = loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                break false;
            }
            if !state.held {
                state.held = true;
                break true;
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        break false;
                    }
                    let _ = self.available.wait_until(&mut state, deadline);
                }
                None => self.available.wait(&mut state),
            }
        };
        state.waiters -= 1;

        // A release may have woken this waiter, hand it to the next one.
        if !acquired && !state.held && state.waiters > 0 {
            self.available.notify_one();
        }
        acquired
    }

    /// Release the slot and wake one waiter.
    ///
    /// Returns false and changes nothing if the slot is not held.
    pub(crate) fn release(&self) -> bool {
        let mut state = self.state.lock();
        if !state.held {
            return false;
        }
        state.held = false;
        if state.waiters > 0 {
            self.available.notify_one();
        }
        true
    }

    /// Returns true if the slot is held.
    pub(crate) fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Returns the number of blocked acquisitions.
    pub(crate) fn waiters(&self) -> usize {
        self.state.lock().waiters
    }

    fn wake_all(&self) {
        // Waiters check for cancellation under this lock before waiting.
        drop(self.state.lock());
        self.available.notify_all();
    }
}
