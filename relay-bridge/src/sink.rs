//! Response sinks: the callback surface the transport drives as response
//! messages and terminal signals arrive for one call.
//!
//! One implementation per RPC shape, selected when the call context is
//! built. Every sink shares the same lifecycle (pending, completed, failed,
//! cancelled) and counts the call's completion latch down exactly once on
//! its terminal signal, before the result is made visible, so a caller
//! woken by the result always observes the call as finished.

use crate::broker::RecordBroker;
use crate::error::CallError;
use crate::latch::CompletionLatch;
use crate::slot::SingleSlotFuture;
use tonic::Status;
use tracing::{debug, warn};

/// Callback contract the transport invokes from its delivery thread(s):
/// zero or more `on_next` calls, then exactly one of `on_completed` or
/// `on_error`.
pub trait ResponseObserver<T>: Send {
    fn on_next(&mut self, message: T);
    fn on_completed(&mut self);
    fn on_error(&mut self, status: Status);
}

pub type BoxObserver<T> = Box<dyn ResponseObserver<T> + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// Sink for calls that expect exactly one response message.
///
/// The slot resolves on stream completion, so a protocol-shape violation
/// (a second message before completion) can still fail the call before a
/// value escapes to the waiting caller.
pub struct SingleResultSink<T> {
    slot: SingleSlotFuture<T>,
    latch: CompletionLatch,
    state: SinkState,
    received: Option<T>,
}

impl<T> SingleResultSink<T> {
    pub fn new(slot: SingleSlotFuture<T>, latch: CompletionLatch) -> Self {
        Self {
            slot,
            latch,
            state: SinkState::Pending,
            received: None,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }
}

impl<T: Send> ResponseObserver<T> for SingleResultSink<T> {
    fn on_next(&mut self, message: T) {
        if self.state != SinkState::Pending {
            warn!("message delivered to a terminal single-result sink");
            return;
        }
        if self.received.is_some() {
            self.state = SinkState::Failed;
            self.latch.count_down();
            self.slot.fail(CallError::UnexpectedMultipleResults);
            return;
        }
        self.received = Some(message);
    }

    fn on_completed(&mut self) {
        if self.state != SinkState::Pending {
            return;
        }
        // Latch first: a caller woken by the slot must already observe the
        // call as finished.
        self.latch.count_down();
        match self.received.take() {
            Some(message) => {
                self.state = SinkState::Completed;
                self.slot.resolve(message);
            }
            None => {
                self.state = SinkState::Failed;
                self.slot.fail(CallError::RemoteCallFailed(Status::internal(
                    "stream completed without a response message",
                )));
            }
        }
    }

    fn on_error(&mut self, status: Status) {
        if self.state != SinkState::Pending {
            return;
        }
        self.state = SinkState::Failed;
        self.latch.count_down();
        self.slot.fail(CallError::RemoteCallFailed(status));
    }
}

/// Sink collecting 0..n response messages into an ordered sequence,
/// resolved only on explicit stream completion.
pub struct AccumulatingSink<T> {
    slot: SingleSlotFuture<Vec<T>>,
    latch: CompletionLatch,
    state: SinkState,
    buffer: Vec<T>,
}

impl<T> AccumulatingSink<T> {
    pub fn new(slot: SingleSlotFuture<Vec<T>>, latch: CompletionLatch) -> Self {
        Self {
            slot,
            latch,
            state: SinkState::Pending,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }
}

impl<T: Send> ResponseObserver<T> for AccumulatingSink<T> {
    fn on_next(&mut self, message: T) {
        if self.state != SinkState::Pending {
            warn!("message delivered to a terminal accumulating sink");
            return;
        }
        self.buffer.push(message);
    }

    fn on_completed(&mut self) {
        if self.state != SinkState::Pending {
            return;
        }
        self.state = SinkState::Completed;
        self.latch.count_down();
        self.slot.resolve(std::mem::take(&mut self.buffer));
    }

    fn on_error(&mut self, status: Status) {
        if self.state != SinkState::Pending {
            return;
        }
        self.state = SinkState::Failed;
        self.latch.count_down();
        self.slot.fail(CallError::RemoteCallFailed(status));
    }
}

/// Sink feeding an inbound broker for live consumption by the caller.
///
/// Pushing may block under the broker's backpressure. Completion closes the
/// broker; a transport error records the fault on the broker before closing
/// it, so closure alone is never mistaken for success. A push rejected
/// because the consumer already closed the broker moves the sink to
/// cancelled and later messages are dropped.
pub struct BrokerSink<T> {
    broker: RecordBroker<T>,
    latch: CompletionLatch,
    state: SinkState,
}

impl<T> BrokerSink<T> {
    pub fn new(broker: RecordBroker<T>, latch: CompletionLatch) -> Self {
        Self {
            broker,
            latch,
            state: SinkState::Pending,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }
}

impl<T: Send> ResponseObserver<T> for BrokerSink<T> {
    fn on_next(&mut self, message: T) {
        if self.state != SinkState::Pending {
            return;
        }
        if self.broker.push(message).is_err() {
            debug!("inbound broker abandoned by consumer; cancelling delivery");
            self.state = SinkState::Cancelled;
            self.latch.count_down();
        }
    }

    fn on_completed(&mut self) {
        if self.state != SinkState::Pending {
            return;
        }
        self.state = SinkState::Completed;
        self.latch.count_down();
        self.broker.close();
    }

    fn on_error(&mut self, status: Status) {
        if self.state != SinkState::Pending {
            return;
        }
        self.state = SinkState::Failed;
        self.latch.count_down();
        self.broker.fail(CallError::RemoteCallFailed(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_latch_released_before_slot_wakes_waiter() {
        let slot = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = SingleResultSink::new(slot.clone(), latch.clone());

        let waiter_slot = slot.clone();
        let waiter_latch = latch.clone();
        let waiter = thread::spawn(move || {
            waiter_slot.wait(Duration::from_secs(5)).unwrap();
            waiter_latch.remaining()
        });

        sink.on_next(3);
        sink.on_completed();

        // By the time the slot wakes its waiter, the completion signal has
        // already been recorded.
        assert_eq!(waiter.join().unwrap(), 0);
    }

    #[test]
    fn test_single_result_resolves_on_completion() {
        let slot = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = SingleResultSink::new(slot.clone(), latch.clone());

        sink.on_next(5);
        assert!(!slot.is_complete());

        sink.on_completed();
        assert_eq!(sink.state(), SinkState::Completed);
        assert_eq!(slot.wait(Duration::from_millis(10)).unwrap(), 5);
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_single_result_rejects_second_message() {
        let slot = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = SingleResultSink::new(slot.clone(), latch.clone());

        sink.on_next(1);
        sink.on_next(2);
        assert_eq!(sink.state(), SinkState::Failed);
        assert!(matches!(
            slot.wait(Duration::from_millis(10)),
            Err(CallError::UnexpectedMultipleResults)
        ));

        // The late completion signal must not flip the outcome.
        sink.on_completed();
        assert!(matches!(
            slot.wait(Duration::from_millis(10)),
            Err(CallError::UnexpectedMultipleResults)
        ));
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_single_result_error_wraps_status() {
        let slot: SingleSlotFuture<i32> = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = SingleResultSink::new(slot.clone(), latch.clone());

        sink.on_error(Status::unavailable("remote down"));
        assert_eq!(sink.state(), SinkState::Failed);
        match slot.wait(Duration::from_millis(10)) {
            Err(CallError::RemoteCallFailed(status)) => {
                assert_eq!(status.code(), tonic::Code::Unavailable);
            }
            other => panic!("unexpected outcome: {:?}", other.err()),
        }
    }

    #[test]
    fn test_single_result_empty_stream_fails() {
        let slot: SingleSlotFuture<i32> = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = SingleResultSink::new(slot.clone(), latch);

        sink.on_completed();
        assert!(matches!(
            slot.wait(Duration::from_millis(10)),
            Err(CallError::RemoteCallFailed(_))
        ));
    }

    #[test]
    fn test_accumulating_resolves_in_order_on_completion() {
        let slot = SingleSlotFuture::new();
        let latch = CompletionLatch::new(1);
        let mut sink = AccumulatingSink::new(slot.clone(), latch.clone());

        for i in 0..4 {
            sink.on_next(i);
        }
        assert!(!slot.is_complete());

        sink.on_completed();
        assert_eq!(slot.wait(Duration::from_millis(10)).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_broker_sink_closes_on_completion() {
        let broker = RecordBroker::new(10);
        let latch = CompletionLatch::new(1);
        let mut sink = BrokerSink::new(broker.clone(), latch.clone());

        sink.on_next("a");
        sink.on_next("b");
        sink.on_completed();

        assert_eq!(broker.drain(), vec!["a", "b"]);
        assert!(broker.is_closable());
        assert!(broker.fault().is_none());
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_broker_sink_records_fault_on_error() {
        let broker: RecordBroker<&str> = RecordBroker::new(10);
        let latch = CompletionLatch::new(1);
        let mut sink = BrokerSink::new(broker.clone(), latch.clone());

        sink.on_next("a");
        sink.on_error(Status::internal("stream died"));

        assert_eq!(sink.state(), SinkState::Failed);
        assert_eq!(broker.try_take(), Some("a"));
        assert!(broker.is_closable());
        assert!(matches!(
            broker.fault(),
            Some(CallError::RemoteCallFailed(_))
        ));
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn test_broker_sink_cancels_when_consumer_closes() {
        let broker = RecordBroker::new(10);
        let latch = CompletionLatch::new(1);
        let mut sink = BrokerSink::new(broker.clone(), latch.clone());

        sink.on_next(1);
        broker.close();
        sink.on_next(2);

        assert_eq!(sink.state(), SinkState::Cancelled);
        assert_eq!(latch.remaining(), 0);

        // The message after cancellation is dropped, the earlier one kept.
        assert_eq!(broker.drain(), vec![1]);
    }
}
