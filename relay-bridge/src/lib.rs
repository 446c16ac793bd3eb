//! Asynchronous-streaming-to-synchronous call bridging for RelayKV
//!
//! This crate lets blocking callers drive calls against an asynchronous,
//! stream-oriented transport. Callback-driven response delivery is reframed
//! as message-passing into explicit, bounded concurrency primitives: a
//! write-once result slot, a countdown completion latch, and a bounded
//! record broker. A call template ties them together and drives four RPC
//! shapes (single-response, server-streamed, client-streamed upload, and
//! immediate blocking result) against any remote service definition.
//!
//! The transport itself is a collaborator: it is consumed through the
//! invoker closures and the `ResponseObserver` callback surface, with tonic
//! adapters provided in the `grpc` module.

pub mod broker;
pub mod context;
pub mod error;
pub mod grpc;
pub mod latch;
pub mod sink;
pub mod slot;
pub mod template;

pub use broker::{RecordBroker, DEFAULT_BROKER_CAPACITY};
pub use context::{
    BoxRequestStream, CallContext, CallContextBuilder, CallOptions, CalleeInvoker, CallerInvoker,
    Endpoint, RequestStream, SinkFactory,
};
pub use error::{CallError, Result};
pub use latch::CompletionLatch;
pub use sink::{AccumulatingSink, BoxObserver, BrokerSink, ResponseObserver, SingleResultSink, SinkState};
pub use slot::SingleSlotFuture;
pub use template::{StreamingCallTemplate, DEFAULT_POLL_INTERVAL};
