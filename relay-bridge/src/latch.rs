//! Countdown latch tracking the completion signals a call must collect
//! before it is considered finished. Normally initialized to 1; a larger
//! count distinguishes "response received" from "stream fully drained".

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

struct LatchInner {
    remaining: Mutex<usize>,
    zero: Condvar,
}

#[derive(Clone)]
pub struct CompletionLatch {
    inner: Arc<LatchInner>,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                remaining: Mutex::new(count),
                zero: Condvar::new(),
            }),
        }
    }

    /// Records one completion signal. Saturates at zero.
    pub fn count_down(&self) {
        let mut remaining = self.inner.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.inner.zero.notify_all();
            }
        }
    }

    pub fn remaining(&self) -> usize {
        *self.inner.remaining.lock()
    }

    /// Blocks until the count reaches zero or `timeout` elapses; returns
    /// whether the count reached zero.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut remaining = self.inner.remaining.lock();
        let deadline = std::time::Instant::now() + timeout;
        while *remaining > 0 {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner.zero.wait_for(&mut remaining, deadline - now);
        }
        true
    }
}
