//! Bounded producer/consumer bridge between an application thread and a
//! streaming transport loop.
//!
//! The broker serves two roles with the same primitive: outbound upload
//! streaming (caller produces, the sender loop consumes) and inbound
//! iteration streaming (transport produces, caller consumes). Records are
//! always delivered in push order, the buffer never exceeds its capacity,
//! and a fault recorded by the transport side survives closure so the
//! consumer can distinguish an errored stream from a completed one.

use crate::error::CallError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BROKER_CAPACITY: usize = 1000;

struct BrokerShared<T> {
    queue: VecDeque<T>,
    closed: bool,
    fault: Option<CallError>,
}

struct BrokerInner<T> {
    shared: Mutex<BrokerShared<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

pub struct RecordBroker<T> {
    inner: Arc<BrokerInner<T>>,
}

impl<T> Clone for RecordBroker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for RecordBroker<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_CAPACITY)
    }
}

impl<T> RecordBroker<T> {
    /// Creates a broker with the given capacity. Capacity trades memory for
    /// backpressure responsiveness; a zero capacity is clamped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                shared: Mutex::new(BrokerShared {
                    queue: VecDeque::new(),
                    closed: false,
                    fault: None,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Appends a record, blocking while the buffer is at capacity. Fails
    /// with `BrokerClosed` once the broker has been closed.
    pub fn push(&self, record: T) -> Result<(), CallError> {
        let mut shared = self.inner.shared.lock();
        loop {
            if shared.closed {
                return Err(CallError::BrokerClosed);
            }
            if shared.queue.len() < self.inner.capacity {
                shared.queue.push_back(record);
                self.inner.not_empty.notify_all();
                return Ok(());
            }
            self.inner.not_full.wait(&mut shared);
        }
    }

    /// Producer signals no more records. Idempotent.
    pub fn close(&self) {
        let mut shared = self.inner.shared.lock();
        if !shared.closed {
            shared.closed = true;
            debug!(pending = shared.queue.len(), "broker closed");
        }
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    /// Records a fault and closes the broker. Closure alone must not be
    /// mistaken for success; consumers check `fault` after draining.
    pub fn fail(&self, error: CallError) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.fault.is_none() {
                shared.fault = Some(error);
            }
        }
        self.close();
    }

    /// The fault recorded by `fail`, if any.
    pub fn fault(&self) -> Option<CallError> {
        self.inner.shared.lock().fault.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.lock().closed
    }

    /// True iff closed and fully drained.
    pub fn is_closable(&self) -> bool {
        let shared = self.inner.shared.lock();
        shared.closed && shared.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.shared.lock().queue.is_empty()
    }

    /// Blocks up to `timeout` for new data or closure; returns true if
    /// either is observed, false on a bare timeout.
    pub fn await_data(&self, timeout: Duration) -> bool {
        let mut shared = self.inner.shared.lock();
        let deadline = std::time::Instant::now() + timeout;
        while shared.queue.is_empty() && !shared.closed {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            self.inner.not_empty.wait_for(&mut shared, deadline - now);
        }
        true
    }

    /// Non-blocking FIFO removal.
    pub fn try_take(&self) -> Option<T> {
        let mut shared = self.inner.shared.lock();
        let record = shared.queue.pop_front();
        if record.is_some() {
            self.inner.not_full.notify_all();
        }
        record
    }

    /// Removes everything currently buffered, in push order.
    pub fn drain(&self) -> Vec<T> {
        let mut shared = self.inner.shared.lock();
        let records: Vec<T> = shared.queue.drain(..).collect();
        if !records.is_empty() {
            self.inner.not_full.notify_all();
        }
        records
    }

    /// Blocking FIFO removal for lazy consumption: `Ok(Some(record))` when a
    /// record is available within `timeout`, `Ok(None)` once the broker is
    /// closable, `Err(Timeout)` otherwise.
    pub fn next_record(&self, timeout: Duration) -> Result<Option<T>, CallError> {
        let mut shared = self.inner.shared.lock();
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(record) = shared.queue.pop_front() {
                self.inner.not_full.notify_all();
                return Ok(Some(record));
            }
            if shared.closed {
                return Ok(None);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(CallError::Timeout(timeout));
            }
            self.inner.not_empty.wait_for(&mut shared, deadline - now);
        }
    }
}
