//! Write-once result cell bridging a transport callback thread and a
//! blocking caller.
//!
//! The transport side calls `resolve` or `fail` exactly once; the caller
//! blocks in `wait` until a terminal value is visible or the timeout
//! elapses. The first terminal write wins and is never overwritten.

use crate::error::CallError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

enum SlotState<T> {
    Pending,
    Ready(Result<T, CallError>),
}

struct SlotInner<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

pub struct SingleSlotFuture<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for SingleSlotFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SingleSlotFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleSlotFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SlotInner {
                state: Mutex::new(SlotState::Pending),
                ready: Condvar::new(),
            }),
        }
    }

    /// Stores the success value. Returns false if the slot already holds a
    /// terminal value; the held value is left untouched.
    pub fn resolve(&self, value: T) -> bool {
        self.write(Ok(value))
    }

    /// Stores the failure. Returns false if the slot already holds a
    /// terminal value; the held value is left untouched.
    pub fn fail(&self, error: CallError) -> bool {
        self.write(Err(error))
    }

    fn write(&self, outcome: Result<T, CallError>) -> bool {
        let mut state = self.inner.state.lock();
        match *state {
            SlotState::Pending => {
                *state = SlotState::Ready(outcome);
                self.inner.ready.notify_all();
                true
            }
            SlotState::Ready(_) => {
                warn!("attempted second resolution of an already-resolved slot");
                false
            }
        }
    }

    /// True once `resolve` or `fail` has taken effect.
    pub fn is_complete(&self) -> bool {
        matches!(*self.inner.state.lock(), SlotState::Ready(_))
    }
}

impl<T: Clone> SingleSlotFuture<T> {
    /// Blocks until the slot is resolved or failed, or until `timeout`
    /// elapses. Every waiter observes the same terminal value.
    pub fn wait(&self, timeout: Duration) -> Result<T, CallError> {
        let mut state = self.inner.state.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let SlotState::Ready(ref outcome) = *state {
                return outcome.clone();
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(CallError::Timeout(timeout));
            }
            if self.inner.ready.wait_for(&mut state, deadline - now).timed_out() {
                if let SlotState::Ready(ref outcome) = *state {
                    return outcome.clone();
                }
                return Err(CallError::Timeout(timeout));
            }
        }
    }

    /// Non-blocking observation of the terminal value, if any.
    pub fn try_get(&self) -> Option<Result<T, CallError>> {
        match *self.inner.state.lock() {
            SlotState::Ready(ref outcome) => Some(outcome.clone()),
            SlotState::Pending => None,
        }
    }
}
