//! RelayKV store client implementation
//!
//! Blocking per-operation facade over the asynchronous transport. Every
//! operation builds a fresh call context and template; nothing is shared
//! between concurrent calls except the transport stub and channel.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::store::StoreInfo;
use crate::stub::{GrpcKvStub, KvStub};
use relay_bridge::{
    AccumulatingSink, BoxObserver, BrokerSink, CallContext, CallContextBuilder, RecordBroker,
    SingleResultSink, SingleSlotFuture, StreamingCallTemplate,
};
use relay_proto::{Count, CreateTableInfo, Empty, KvServiceClient, Operand, Range};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tonic::metadata::MetadataMap;
use tracing::{debug, info};

pub struct KvStoreClient {
    config: ClientConfig,
    stub: Arc<dyn KvStub>,
    // Kept alive for the lifetime of the client when the runtime is owned.
    _runtime: Option<Runtime>,
}

impl KvStoreClient {
    /// Connect to a RelayKV store node, bringing up a dedicated runtime for
    /// the transport.
    ///
    /// # Example
    /// ```no_run
    /// # use relay_client::{ClientConfig, KvStoreClient};
    /// # use relay_bridge::Endpoint;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::new(Endpoint::new("127.0.0.1", 7070));
    /// let client = KvStoreClient::connect(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect(config: ClientConfig) -> Result<KvStoreClient> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to start runtime: {}", e)))?;

        let uri = config.endpoint.uri();
        info!(endpoint = %config.endpoint, "connecting to store node");
        let channel = runtime
            .block_on(async {
                tonic::transport::Endpoint::from_shared(uri)?.connect().await
            })
            .map_err(|e| ClientError::Connection(format!("failed to connect: {}", e)))?;

        let stub = GrpcKvStub::new(
            runtime.handle().clone(),
            KvServiceClient::new(channel),
            config.broker_capacity,
        );

        Ok(Self {
            config,
            stub: Arc::new(stub),
            _runtime: Some(runtime),
        })
    }

    /// Wrap an externally supplied transport stub. Keeps calls independently
    /// testable and endpoint-swappable per client.
    pub fn with_stub(config: ClientConfig, stub: Arc<dyn KvStub>) -> Self {
        Self {
            config,
            stub,
            _runtime: None,
        }
    }

    fn context_builder<Req, Resp>(&self, metadata: MetadataMap) -> CallContextBuilder<Req, Resp> {
        CallContext::builder()
            .endpoint(self.config.endpoint.clone())
            .finish_timeout(self.config.finish_timeout)
            .latch_init_count(1)
            .metadata(metadata)
    }

    /// Create a table if it does not already exist.
    pub fn create(&self, info: CreateTableInfo) -> Result<CreateTableInfo> {
        let slot = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(MetadataMap::new())
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<CreateTableInfo>
            })
            .callee_streaming_method(move |options, request, observer| {
                stub.create_if_absent(options, request, observer)
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        Ok(template.callee_streaming_rpc_with_immediate_result(info, &slot)?)
    }

    /// Store one operand.
    pub fn put(&self, request: Operand, store: &StoreInfo) -> Result<()> {
        let slot: SingleSlotFuture<Empty> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<Empty>
            })
            .callee_streaming_method(move |options, request, observer| {
                stub.put(options, request, observer)
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        template.callee_streaming_rpc_with_immediate_result(request, &slot)?;
        Ok(())
    }

    /// Store one operand unless its key already exists; returns the prior
    /// value held by the store.
    pub fn put_if_absent(&self, request: Operand, store: &StoreInfo) -> Result<Operand> {
        self.operand_to_operand(request, store, OperandCall::PutIfAbsent)
    }

    /// Upload every record pushed into `broker` through one streamed call.
    ///
    /// Blocks until the producer closes the broker, the stream is fully
    /// forwarded, and the remote end acknowledges completion. Any failure
    /// aborts the outbound stream before it propagates here.
    ///
    /// # Example
    /// ```no_run
    /// # use relay_client::{ClientConfig, KvStoreClient, StoreInfo};
    /// # use relay_bridge::RecordBroker;
    /// # use relay_proto::Operand;
    /// # fn example(client: KvStoreClient, store: StoreInfo) -> Result<(), Box<dyn std::error::Error>> {
    /// let broker = RecordBroker::new(100);
    /// let producer = broker.clone();
    /// let feeder = std::thread::spawn(move || {
    ///     for i in 0..10_000u32 {
    ///         let operand = Operand {
    ///             key: i.to_be_bytes().to_vec(),
    ///             value: vec![0u8; 64],
    ///         };
    ///         producer.push(operand).unwrap();
    ///     }
    ///     producer.close();
    /// });
    ///
    /// client.put_all(broker, &store)?;
    /// feeder.join().unwrap();
    /// # Ok(())
    /// # }
    /// ```
    pub fn put_all(&self, broker: RecordBroker<Operand>, store: &StoreInfo) -> Result<()> {
        let slot: SingleSlotFuture<Empty> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<Empty>
            })
            .caller_streaming_method(move |options, observer| stub.put_all(options, observer))
            .record_source(broker)
            .build()?;

        let mut template =
            StreamingCallTemplate::new(context).with_poll_interval(self.config.poll_interval);
        template.caller_streaming_rpc()?;

        // The latch released; surface the remote terminal status.
        slot.wait(self.config.finish_timeout)?;
        debug!("upload acknowledged");
        Ok(())
    }

    /// Remove one operand by key; returns the removed value.
    pub fn delete(&self, request: Operand, store: &StoreInfo) -> Result<Operand> {
        self.operand_to_operand(request, store, OperandCall::Delete)
    }

    /// Fetch one operand by key.
    pub fn get(&self, request: Operand, store: &StoreInfo) -> Result<Operand> {
        self.operand_to_operand(request, store, OperandCall::Get)
    }

    /// Iterate a key range. Returns the inbound broker immediately; the
    /// transport keeps delivering into it while the caller consumes at its
    /// own pace. After draining, check `fault()` on the broker to tell an
    /// errored stream from a completed one.
    pub fn iterate(&self, range: Range, store: &StoreInfo) -> Result<RecordBroker<Operand>> {
        let results = RecordBroker::new(self.config.broker_capacity);
        let sink_broker = results.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(BrokerSink::new(sink_broker, latch)) as BoxObserver<Operand>
            })
            .callee_streaming_method(move |options, request, observer| {
                stub.iterate(options, request, observer)
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        template.callee_streaming_rpc(range)?;
        Ok(results)
    }

    /// Iterate a key range and collect the entire result eagerly, in
    /// delivery order.
    pub fn iterate_collect(&self, range: Range, store: &StoreInfo) -> Result<Vec<Operand>> {
        let slot: SingleSlotFuture<Vec<Operand>> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(AccumulatingSink::new(sink_slot, latch)) as BoxObserver<Operand>
            })
            .callee_streaming_method(move |options, request, observer| {
                stub.iterate(options, request, observer)
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        Ok(template.callee_streaming_rpc_with_immediate_result(range, &slot)?)
    }

    /// Drop the store's fragment on the target node.
    pub fn destroy(&self, store: &StoreInfo) -> Result<()> {
        self.empty_to_empty(store, EmptyCall::Destroy)
    }

    /// Drop every fragment of the store.
    pub fn destroy_all(&self, store: &StoreInfo) -> Result<()> {
        self.empty_to_empty(store, EmptyCall::DestroyAll)
    }

    /// Number of operands held by the store.
    pub fn count(&self, store: &StoreInfo) -> Result<i64> {
        let slot: SingleSlotFuture<Count> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<Count>
            })
            .callee_streaming_method(move |options, request, observer| {
                stub.count(options, request, observer)
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        let count = template.callee_streaming_rpc_with_immediate_result(Empty {}, &slot)?;
        Ok(count.value)
    }

    fn operand_to_operand(
        &self,
        request: Operand,
        store: &StoreInfo,
        call: OperandCall,
    ) -> Result<Operand> {
        let slot = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<Operand>
            })
            .callee_streaming_method(move |options, request, observer| match call {
                OperandCall::Get => stub.get(options, request, observer),
                OperandCall::Delete => stub.delete(options, request, observer),
                OperandCall::PutIfAbsent => stub.put_if_absent(options, request, observer),
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        Ok(template.callee_streaming_rpc_with_immediate_result(request, &slot)?)
    }

    fn empty_to_empty(&self, store: &StoreInfo, call: EmptyCall) -> Result<()> {
        let slot: SingleSlotFuture<Empty> = SingleSlotFuture::new();
        let sink_slot = slot.clone();
        let stub = Arc::clone(&self.stub);

        let context = self
            .context_builder(store.to_metadata()?)
            .response_sink(move |latch| {
                Box::new(SingleResultSink::new(sink_slot, latch)) as BoxObserver<Empty>
            })
            .callee_streaming_method(move |options, request, observer| match call {
                EmptyCall::Destroy => stub.destroy(options, request, observer),
                EmptyCall::DestroyAll => stub.destroy_all(options, request, observer),
            })
            .build()?;

        let mut template = StreamingCallTemplate::new(context);
        template.callee_streaming_rpc_with_immediate_result(Empty {}, &slot)?;
        Ok(())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[derive(Clone, Copy)]
enum OperandCall {
    Get,
    Delete,
    PutIfAbsent,
}

#[derive(Clone, Copy)]
enum EmptyCall {
    Destroy,
    DestroyAll,
}
