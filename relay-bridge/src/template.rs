//! The call orchestrator: drives one configured call against the transport
//! and coordinates the caller's thread with the transport's callback
//! delivery via the slot, latch, and broker primitives.
//!
//! Four shapes are supported: fire-and-forget with asynchronous completion,
//! blocking immediate-result, client-streaming upload under broker
//! backpressure, and server-streaming iteration into an inbound broker.
//! There is no retry at this layer; endpoint and timeout are fixed per call.

use crate::broker::RecordBroker;
use crate::context::{BoxRequestStream, CallContext};
use crate::error::CallError;
use crate::latch::CompletionLatch;
use crate::slot::SingleSlotFuture;
use std::time::Duration;
use tracing::{debug, warn};

/// Idle wait for the upload loop: long enough to avoid busy-waiting, short
/// enough that closure and cancellation are observed promptly.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct StreamingCallTemplate<Req, Resp> {
    context: CallContext<Req, Resp>,
    latch: CompletionLatch,
    poll_interval: Duration,
    outbound: Option<BoxRequestStream<Req>>,
}

impl<Req, Resp> StreamingCallTemplate<Req, Resp> {
    pub fn new(context: CallContext<Req, Resp>) -> Self {
        let latch = CompletionLatch::new(context.latch_count);
        Self {
            context,
            latch,
            poll_interval: DEFAULT_POLL_INTERVAL,
            outbound: None,
        }
    }

    /// Overrides the upload loop's bounded idle wait.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn build_sink(&mut self) -> Result<crate::sink::BoxObserver<Resp>, CallError> {
        let factory = self
            .context
            .sink_factory
            .take()
            .ok_or(CallError::IncompleteContext("response sink"))?;
        Ok(factory(self.latch.clone()))
    }

    /// Issues the call and returns immediately; completion is signalled
    /// asynchronously through the sink and can be joined via
    /// `await_finish`.
    pub fn callee_streaming_rpc(&mut self, request: Req) -> Result<(), CallError> {
        let sink = self.build_sink()?;
        let method = self
            .context
            .callee_method
            .take()
            .ok_or(CallError::IncompleteContext("callee streaming method"))?;
        debug!(endpoint = %self.context.options.endpoint, "issuing callee-streaming call");
        method(&self.context.options, request, sink)
    }

    /// Issues the call and blocks on `result` until the sink resolves it or
    /// the context's finish timeout elapses.
    pub fn callee_streaming_rpc_with_immediate_result<T: Clone>(
        &mut self,
        request: Req,
        result: &SingleSlotFuture<T>,
    ) -> Result<T, CallError> {
        let timeout = self.context.options.timeout;
        self.callee_streaming_rpc(request)?;
        result.wait(timeout)
    }

    /// Opens the outbound stream of a client-streaming call.
    pub fn init_caller_streaming_rpc(&mut self) -> Result<(), CallError> {
        let sink = self.build_sink()?;
        let method = self
            .context
            .caller_method
            .take()
            .ok_or(CallError::IncompleteContext("caller streaming method"))?;
        debug!(endpoint = %self.context.options.endpoint, "opening caller-streaming call");
        self.outbound = Some(method(&self.context.options, sink)?);
        Ok(())
    }

    /// Drains the record source and forwards everything, in push order, to
    /// the open outbound stream.
    pub fn process_caller_streaming_rpc(&mut self) -> Result<(), CallError> {
        let broker = self
            .context
            .record_source
            .as_ref()
            .ok_or(CallError::IncompleteContext("record source"))?
            .clone();
        let outbound = self
            .outbound
            .as_mut()
            .ok_or(CallError::IncompleteContext("open outbound stream"))?;
        for record in broker.drain() {
            outbound.send(record)?;
        }
        Ok(())
    }

    /// Signals a normal end-of-stream and waits for the remote terminal
    /// signal within the finish timeout.
    pub fn complete_streaming_rpc(&mut self) -> Result<(), CallError> {
        if let Some(mut outbound) = self.outbound.take() {
            outbound.complete();
        }
        self.await_finish()
    }

    /// Aborts the outbound stream so the remote end is told definitively
    /// that the upload ended in error. The record source is failed as well,
    /// so a producer blocked in `push` at capacity is released instead of
    /// waiting on a drain that will never happen.
    pub fn error_caller_streaming_rpc(&mut self, error: CallError) {
        warn!(%error, "aborting caller-streaming call");
        if let Some(mut outbound) = self.outbound.take() {
            outbound.abort(error.clone());
        }
        if let Some(source) = self.context.record_source.as_ref() {
            source.fail(error);
        }
    }

    /// The canonical backpressured upload loop: bounded wait for data or
    /// closure, drain-and-forward, terminate once the source is closable.
    /// Any failure aborts the outbound stream before propagating locally.
    pub fn caller_streaming_rpc(&mut self) -> Result<(), CallError> {
        let broker: RecordBroker<Req> = self
            .context
            .record_source
            .as_ref()
            .ok_or(CallError::IncompleteContext("record source"))?
            .clone();

        if let Err(error) = self.init_caller_streaming_rpc() {
            broker.fail(error.clone());
            return Err(error);
        }

        while !broker.is_closable() {
            broker.await_data(self.poll_interval);
            if let Err(error) = self.process_caller_streaming_rpc() {
                self.error_caller_streaming_rpc(error.clone());
                return Err(error);
            }
        }

        self.complete_streaming_rpc()
    }

    /// Blocks until every expected completion signal has been collected,
    /// failing with `Timeout` after the context's finish timeout.
    pub fn await_finish(&self) -> Result<(), CallError> {
        let timeout = self.context.options.timeout;
        if self.latch.wait(timeout) {
            Ok(())
        } else {
            Err(CallError::Timeout(timeout))
        }
    }

    pub fn latch(&self) -> &CompletionLatch {
        &self.latch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Endpoint, RequestStream};
    use crate::sink::{BoxObserver, ResponseObserver, SingleResultSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn base_builder<Req, Resp>() -> crate::context::CallContextBuilder<Req, Resp> {
        CallContext::builder()
            .endpoint(Endpoint::new("127.0.0.1", 7070))
            .finish_timeout(Duration::from_secs(2))
            .latch_init_count(1)
    }

    /// Outbound stream stub capturing what the template forwards.
    struct CaptureStream {
        sent: Arc<Mutex<Vec<u64>>>,
        completed: Arc<AtomicBool>,
        aborted: Arc<AtomicBool>,
        observer: Option<BoxObserver<u64>>,
    }

    impl RequestStream<u64> for CaptureStream {
        fn send(&mut self, record: u64) -> Result<(), CallError> {
            self.sent.lock().unwrap().push(record);
            Ok(())
        }

        fn complete(&mut self) {
            self.completed.store(true, Ordering::SeqCst);
            if let Some(mut observer) = self.observer.take() {
                observer.on_next(0);
                observer.on_completed();
            }
        }

        fn abort(&mut self, _error: CallError) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_immediate_result_happy_path() {
        let slot = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .callee_streaming_method(|_options, request, mut observer| {
                // Deliver from a separate thread, like a transport callback.
                thread::spawn(move || {
                    observer.on_next(request * 2);
                    observer.on_completed();
                });
                Ok(())
            })
            .build()
            .unwrap();

        let mut template = StreamingCallTemplate::new(context);
        let result = template
            .callee_streaming_rpc_with_immediate_result(21, &slot)
            .unwrap();
        assert_eq!(result, 42u64);
        assert!(template.await_finish().is_ok());
    }

    #[test]
    fn test_immediate_result_times_out_when_transport_silent() {
        let slot = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let context: CallContext<u64, u64> = CallContext::builder()
            .endpoint(Endpoint::new("127.0.0.1", 7070))
            .finish_timeout(Duration::from_millis(50))
            .latch_init_count(1)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .callee_streaming_method(|_options, _request, _observer| {
                // Transport never responds.
                Ok(())
            })
            .build()
            .unwrap();

        let mut template = StreamingCallTemplate::new(context);
        let start = std::time::Instant::now();
        let result = template.callee_streaming_rpc_with_immediate_result(1, &slot);
        assert!(matches!(result, Err(CallError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_remote_error_propagates_to_waiter() {
        let slot = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .callee_streaming_method(|_options, _request, mut observer| {
                thread::spawn(move || {
                    observer.on_error(tonic::Status::unavailable("node down"));
                });
                Ok(())
            })
            .build()
            .unwrap();

        let mut template = StreamingCallTemplate::new(context);
        let result = template.callee_streaming_rpc_with_immediate_result(1, &slot);
        assert!(matches!(result, Err(CallError::RemoteCallFailed(_))));
    }

    #[test]
    fn test_upload_loop_forwards_everything_in_order() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicBool::new(false));
        let aborted = Arc::new(AtomicBool::new(false));

        let broker: RecordBroker<u64> = RecordBroker::new(10);
        let slot: SingleSlotFuture<u64> = SingleSlotFuture::new();
        let sink_slot = slot.clone();

        let stream_sent = Arc::clone(&sent);
        let stream_completed = Arc::clone(&completed);
        let stream_aborted = Arc::clone(&aborted);

        // The sink is built first by init_caller_streaming_rpc and handed to
        // the caller-streaming method, which parks it in the stream stub so
        // `complete` can deliver the terminal signal.
        let sink_cell: Arc<Mutex<Option<BoxObserver<u64>>>> = Arc::new(Mutex::new(None));
        let factory_cell = Arc::clone(&sink_cell);
        let method_cell = Arc::clone(&sink_cell);

        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                let sink = Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>;
                factory_cell.lock().unwrap().replace(sink);
                Box::new(ForwardingObserver {
                    cell: Arc::clone(&factory_cell),
                })
            })
            .caller_streaming_method(move |_options, _observer| {
                Ok(Box::new(CaptureStream {
                    sent: stream_sent,
                    completed: stream_completed,
                    aborted: stream_aborted,
                    observer: method_cell.lock().unwrap().take(),
                }) as BoxRequestStream<u64>)
            })
            .record_source(broker.clone())
            .build()
            .unwrap();

        let producer = broker.clone();
        let handle = thread::spawn(move || {
            for i in 0..1000u64 {
                producer.push(i).unwrap();
            }
            producer.close();
        });

        let mut template =
            StreamingCallTemplate::new(context).with_poll_interval(Duration::from_millis(10));
        template.caller_streaming_rpc().unwrap();
        handle.join().unwrap();

        let forwarded = sent.lock().unwrap();
        assert_eq!(forwarded.len(), 1000);
        assert_eq!(*forwarded, (0..1000).collect::<Vec<u64>>());
        assert!(completed.load(Ordering::SeqCst));
        assert!(!aborted.load(Ordering::SeqCst));
    }

    /// Delegates to a sink parked in a shared cell; stands in for a sink the
    /// transport stub needs to hold on to.
    struct ForwardingObserver {
        cell: Arc<Mutex<Option<BoxObserver<u64>>>>,
    }

    impl ResponseObserver<u64> for ForwardingObserver {
        fn on_next(&mut self, message: u64) {
            if let Some(sink) = self.cell.lock().unwrap().as_mut() {
                sink.on_next(message);
            }
        }

        fn on_completed(&mut self) {
            if let Some(sink) = self.cell.lock().unwrap().as_mut() {
                sink.on_completed();
            }
        }

        fn on_error(&mut self, status: tonic::Status) {
            if let Some(sink) = self.cell.lock().unwrap().as_mut() {
                sink.on_error(status);
            }
        }
    }

    /// Outbound stream that fails on the nth send.
    struct FailingStream {
        failures_after: usize,
        aborted: Arc<AtomicBool>,
    }

    impl RequestStream<u64> for FailingStream {
        fn send(&mut self, _record: u64) -> Result<(), CallError> {
            if self.failures_after == 0 {
                return Err(CallError::BrokerClosed);
            }
            self.failures_after -= 1;
            Ok(())
        }

        fn complete(&mut self) {}

        fn abort(&mut self, _error: CallError) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_upload_loop_aborts_stream_on_error() {
        let aborted = Arc::new(AtomicBool::new(false));
        let stream_aborted = Arc::clone(&aborted);

        let broker: RecordBroker<u64> = RecordBroker::new(10);
        let slot: SingleSlotFuture<u64> = SingleSlotFuture::new();
        let sink_slot = slot.clone();

        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .caller_streaming_method(move |_options, _observer| {
                Ok(Box::new(FailingStream {
                    failures_after: 3,
                    aborted: stream_aborted,
                }) as BoxRequestStream<u64>)
            })
            .record_source(broker.clone())
            .build()
            .unwrap();

        for i in 0..8u64 {
            broker.push(i).unwrap();
        }
        broker.close();

        let mut template =
            StreamingCallTemplate::new(context).with_poll_interval(Duration::from_millis(10));
        let result = template.caller_streaming_rpc();
        assert!(matches!(result, Err(CallError::BrokerClosed)));
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upload_abort_releases_blocked_producer() {
        let aborted = Arc::new(AtomicBool::new(false));
        let stream_aborted = Arc::clone(&aborted);

        let broker: RecordBroker<u64> = RecordBroker::new(1);
        let slot: SingleSlotFuture<u64> = SingleSlotFuture::new();
        let sink_slot = slot.clone();

        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .caller_streaming_method(move |_options, _observer| {
                Ok(Box::new(FailingStream {
                    failures_after: 0,
                    aborted: stream_aborted,
                }) as BoxRequestStream<u64>)
            })
            .record_source(broker.clone())
            .build()
            .unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let producer = broker.clone();
        let handle = thread::spawn(move || {
            // Fills the capacity-1 buffer and keeps pushing until the
            // failed source rejects the next record.
            let mut i = 0u64;
            while producer.push(i).is_ok() {
                i += 1;
            }
            done_tx.send(()).unwrap();
        });

        let mut template =
            StreamingCallTemplate::new(context).with_poll_interval(Duration::from_millis(10));
        let result = template.caller_streaming_rpc();
        assert!(matches!(result, Err(CallError::BrokerClosed)));
        assert!(aborted.load(Ordering::SeqCst));

        // The producer must come out of its blocked push promptly.
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("producer still blocked after upload abort");
        handle.join().unwrap();
        assert!(matches!(broker.fault(), Some(CallError::BrokerClosed)));
    }

    #[test]
    fn test_fire_and_forget_returns_before_completion() {
        let slot: SingleSlotFuture<u64> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let context: CallContext<u64, u64> = base_builder()
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<u64>
            })
            .callee_streaming_method(|_options, _request, mut observer| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(30));
                    observer.on_next(1);
                    observer.on_completed();
                });
                Ok(())
            })
            .build()
            .unwrap();

        let mut template = StreamingCallTemplate::new(context);
        template.callee_streaming_rpc(9).unwrap();

        // Not yet complete; await_finish joins the asynchronous completion.
        assert_eq!(template.latch().remaining(), 1);
        assert!(template.await_finish().is_ok());
        assert!(slot.is_complete());
    }
}
