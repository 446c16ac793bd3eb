//! Per-call configuration: endpoint, timeout, transport metadata, latch
//! count, the transport method to invoke, the response sink to construct,
//! and (for uploads) the outbound record source.
//!
//! A context is assembled through the fluent builder and is read-only once
//! handed to a `StreamingCallTemplate`; it belongs to exactly one call.

use crate::broker::RecordBroker;
use crate::error::CallError;
use crate::latch::CompletionLatch;
use crate::sink::BoxObserver;
use std::fmt;
use std::time::Duration;
use tonic::metadata::MetadataMap;

/// Target address of a remote store node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The http URI tonic's channel expects.
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The per-call transport parameters handed to an invoker.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub endpoint: Endpoint,
    pub timeout: Duration,
    pub metadata: MetadataMap,
}

/// Outbound side of a client-streaming call. `send` may exert transport
/// backpressure on the calling thread; `complete` signals a normal
/// end-of-stream; `abort` tells the remote end the upload ended in error.
pub trait RequestStream<Req>: Send {
    fn send(&mut self, record: Req) -> Result<(), CallError>;
    fn complete(&mut self);
    fn abort(&mut self, error: CallError);
}

pub type BoxRequestStream<Req> = Box<dyn RequestStream<Req> + 'static>;

/// A transport method taking one request and delivering its response
/// message(s) to the observer.
pub type CalleeInvoker<Req, Resp> =
    Box<dyn FnOnce(&CallOptions, Req, BoxObserver<Resp>) -> Result<(), CallError> + Send>;

/// A transport method opening an outbound request stream; the single
/// response is delivered to the observer once the stream is completed.
pub type CallerInvoker<Req, Resp> =
    Box<dyn FnOnce(&CallOptions, BoxObserver<Resp>) -> Result<BoxRequestStream<Req>, CallError> + Send>;

/// Constructs the call's response sink, wiring in the completion latch.
pub type SinkFactory<Resp> = Box<dyn FnOnce(CompletionLatch) -> BoxObserver<Resp> + Send>;

pub struct CallContext<Req, Resp> {
    pub(crate) options: CallOptions,
    pub(crate) latch_count: usize,
    pub(crate) callee_method: Option<CalleeInvoker<Req, Resp>>,
    pub(crate) caller_method: Option<CallerInvoker<Req, Resp>>,
    pub(crate) sink_factory: Option<SinkFactory<Resp>>,
    pub(crate) record_source: Option<RecordBroker<Req>>,
}

impl<Req, Resp> CallContext<Req, Resp> {
    pub fn builder() -> CallContextBuilder<Req, Resp> {
        CallContextBuilder::new()
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn latch_count(&self) -> usize {
        self.latch_count
    }
}

pub struct CallContextBuilder<Req, Resp> {
    endpoint: Option<Endpoint>,
    timeout: Option<Duration>,
    metadata: MetadataMap,
    latch_count: Option<usize>,
    callee_method: Option<CalleeInvoker<Req, Resp>>,
    caller_method: Option<CallerInvoker<Req, Resp>>,
    sink_factory: Option<SinkFactory<Resp>>,
    record_source: Option<RecordBroker<Req>>,
}

impl<Req, Resp> Default for CallContextBuilder<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> CallContextBuilder<Req, Resp> {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            timeout: None,
            metadata: MetadataMap::new(),
            latch_count: None,
            callee_method: None,
            caller_method: None,
            sink_factory: None,
            record_source: None,
        }
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Upper bound for every blocking wait this call performs.
    pub fn finish_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Transport-level headers attached to the request.
    pub fn metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of completion signals required before the call is finished.
    pub fn latch_init_count(mut self, count: usize) -> Self {
        self.latch_count = Some(count);
        self
    }

    pub fn callee_streaming_method<F>(mut self, method: F) -> Self
    where
        F: FnOnce(&CallOptions, Req, BoxObserver<Resp>) -> Result<(), CallError> + Send + 'static,
    {
        self.callee_method = Some(Box::new(method));
        self
    }

    pub fn caller_streaming_method<F>(mut self, method: F) -> Self
    where
        F: FnOnce(&CallOptions, BoxObserver<Resp>) -> Result<BoxRequestStream<Req>, CallError>
            + Send
            + 'static,
    {
        self.caller_method = Some(Box::new(method));
        self
    }

    /// Selects the response sink variant for this call.
    pub fn response_sink<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(CompletionLatch) -> BoxObserver<Resp> + Send + 'static,
    {
        self.sink_factory = Some(Box::new(factory));
        self
    }

    /// The broker feeding an outbound caller-streaming call.
    pub fn record_source(mut self, broker: RecordBroker<Req>) -> Self {
        self.record_source = Some(broker);
        self
    }

    /// Validates the configuration. Missing required fields fail with
    /// `IncompleteContext` naming the first missing field.
    pub fn build(self) -> Result<CallContext<Req, Resp>, CallError> {
        let endpoint = self
            .endpoint
            .ok_or(CallError::IncompleteContext("endpoint"))?;
        let timeout = self
            .timeout
            .ok_or(CallError::IncompleteContext("finish timeout"))?;
        let latch_count = self
            .latch_count
            .ok_or(CallError::IncompleteContext("latch init count"))?;
        if latch_count < 1 {
            return Err(CallError::IncompleteContext("latch init count >= 1"));
        }
        if self.sink_factory.is_none() {
            return Err(CallError::IncompleteContext("response sink"));
        }
        if self.callee_method.is_none() && self.caller_method.is_none() {
            return Err(CallError::IncompleteContext("transport method"));
        }
        if self.caller_method.is_some() && self.record_source.is_none() {
            return Err(CallError::IncompleteContext("record source"));
        }

        Ok(CallContext {
            options: CallOptions {
                endpoint,
                timeout,
                metadata: self.metadata,
            },
            latch_count,
            callee_method: self.callee_method,
            caller_method: self.caller_method,
            sink_factory: self.sink_factory,
            record_source: self.record_source,
        })
    }
}
