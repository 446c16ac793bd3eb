//! Adapters turning tonic's async call model into the observer callback
//! contract the bridge primitives expect.
//!
//! Each adapter spawns the actual RPC onto a caller-supplied runtime handle;
//! the spawned task delivers response messages and the terminal signal to
//! the sink. Delivery may block on sink backpressure (an inbound broker at
//! capacity), so the runtime must be multi-threaded.

use crate::context::{BoxRequestStream, CallOptions, CalleeInvoker, CallerInvoker, RequestStream};
use crate::error::CallError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tonic::{Response, Status, Streaming};
use tracing::debug;

fn apply_options<T>(message: T, options: &CallOptions) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = options.metadata.clone();
    request
}

/// Wraps a unary tonic method: one request, one response message, then
/// completion.
pub fn unary_invoker<Req, Resp, F, Fut>(handle: Handle, call: F) -> CalleeInvoker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: FnOnce(tonic::Request<Req>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
{
    Box::new(move |options, request, mut observer| {
        let mut request = apply_options(request, options);
        request.set_timeout(options.timeout);
        handle.spawn(async move {
            match call(request).await {
                Ok(response) => {
                    observer.on_next(response.into_inner());
                    observer.on_completed();
                }
                Err(status) => observer.on_error(status),
            }
        });
        Ok(())
    })
}

/// Wraps a server-streaming tonic method: the spawned task pumps the
/// response stream into the observer until completion or error.
pub fn server_streaming_invoker<Req, Resp, F, Fut>(
    handle: Handle,
    call: F,
) -> CalleeInvoker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: FnOnce(tonic::Request<Req>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Streaming<Resp>>, Status>> + Send + 'static,
{
    Box::new(move |options, request, mut observer| {
        // No gRPC deadline on the streamed response: the stream stays open
        // for as long as the consumer keeps draining it.
        let request = apply_options(request, options);
        handle.spawn(async move {
            let mut stream = match call(request).await {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    observer.on_error(status);
                    return;
                }
            };
            loop {
                match stream.message().await {
                    Ok(Some(message)) => observer.on_next(message),
                    Ok(None) => {
                        observer.on_completed();
                        break;
                    }
                    Err(status) => {
                        observer.on_error(status);
                        break;
                    }
                }
            }
        });
        Ok(())
    })
}

/// Outbound record stream over a bounded channel into an in-flight
/// client-streaming RPC. `send` blocks the calling thread when the channel
/// is full (transport backpressure); `complete` ends the stream by dropping
/// the sender; `abort` cancels the in-flight call so the remote end sees
/// the RPC terminate instead of waiting on a silently-abandoned stream.
struct MpscRequestStream<Req> {
    tx: Option<mpsc::Sender<Req>>,
    abort: Option<oneshot::Sender<()>>,
}

impl<Req: Send> RequestStream<Req> for MpscRequestStream<Req> {
    fn send(&mut self, record: Req) -> Result<(), CallError> {
        let tx = self.tx.as_ref().ok_or(CallError::BrokerClosed)?;
        tx.blocking_send(record).map_err(|_| CallError::BrokerClosed)
    }

    fn complete(&mut self) {
        self.tx.take();
    }

    fn abort(&mut self, error: CallError) {
        debug!(%error, "cancelling in-flight upload");
        self.tx.take();
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(());
        }
    }
}

/// Adapts a bounded mpsc receiver into the `Stream` the tonic stub consumes.
pub struct OutboundStream<Req> {
    rx: mpsc::Receiver<Req>,
}

impl<Req> futures::Stream for OutboundStream<Req> {
    type Item = Req;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Req>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Wraps a client-streaming tonic method. The returned handle feeds the
/// outbound stream; the single response is delivered to the observer when
/// the remote end terminates the call.
pub fn client_streaming_invoker<Req, Resp, F, Fut>(
    handle: Handle,
    channel_capacity: usize,
    call: F,
) -> CallerInvoker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: FnOnce(tonic::Request<OutboundStream<Req>>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
{
    Box::new(move |options, mut observer| {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let (abort_tx, abort_rx) = oneshot::channel::<()>();
        // No gRPC deadline either: an upload runs for as long as the
        // producer keeps feeding it. The caller's waits are bounded locally
        // by the finish timeout.
        let request = apply_options(OutboundStream { rx }, options);

        handle.spawn(async move {
            let outcome = tokio::select! {
                result = call(request) => Some(result),
                _ = abort_rx => None,
            };
            match outcome {
                Some(Ok(response)) => {
                    observer.on_next(response.into_inner());
                    observer.on_completed();
                }
                Some(Err(status)) => observer.on_error(status),
                None => observer.on_error(Status::cancelled(
                    "outbound stream aborted by caller",
                )),
            }
        });

        Ok(Box::new(MpscRequestStream {
            tx: Some(tx),
            abort: Some(abort_tx),
        }) as BoxRequestStream<Req>)
    })
}
