//! The transport stub contract consumed by the store client
//!
//! One method per remote operation, each accepting a request (or opening a
//! request stream) and a response observer the transport drives from its
//! own delivery threads. `GrpcKvStub` is the tonic-backed implementation;
//! tests substitute their own to keep calls independently testable.

use relay_bridge::grpc;
use relay_bridge::{BoxObserver, BoxRequestStream, CallError, CallOptions};
use relay_proto::{Count, CreateTableInfo, Empty, KvServiceClient, Operand, Range};
use tokio::runtime::Handle;
use tonic::transport::Channel;

pub trait KvStub: Send + Sync {
    fn create_if_absent(
        &self,
        options: &CallOptions,
        request: CreateTableInfo,
        observer: BoxObserver<CreateTableInfo>,
    ) -> Result<(), CallError>;

    fn put(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError>;

    fn put_if_absent(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError>;

    fn put_all(
        &self,
        options: &CallOptions,
        observer: BoxObserver<Empty>,
    ) -> Result<BoxRequestStream<Operand>, CallError>;

    fn delete(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError>;

    fn get(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError>;

    fn iterate(
        &self,
        options: &CallOptions,
        request: Range,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError>;

    fn destroy(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError>;

    fn destroy_all(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError>;

    fn count(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Count>,
    ) -> Result<(), CallError>;
}

/// tonic-backed stub: every call clones the channel-borne client and spawns
/// the RPC onto the shared runtime handle.
pub struct GrpcKvStub {
    handle: Handle,
    kv: KvServiceClient<Channel>,
    channel_capacity: usize,
}

impl GrpcKvStub {
    pub fn new(handle: Handle, kv: KvServiceClient<Channel>, channel_capacity: usize) -> Self {
        Self {
            handle,
            kv,
            channel_capacity,
        }
    }
}

impl KvStub for GrpcKvStub {
    fn create_if_absent(
        &self,
        options: &CallOptions,
        request: CreateTableInfo,
        observer: BoxObserver<CreateTableInfo>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.create_if_absent(req).await
        });
        invoke(options, request, observer)
    }

    fn put(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.put(req).await
        });
        invoke(options, request, observer)
    }

    fn put_if_absent(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.put_if_absent(req).await
        });
        invoke(options, request, observer)
    }

    fn put_all(
        &self,
        options: &CallOptions,
        observer: BoxObserver<Empty>,
    ) -> Result<BoxRequestStream<Operand>, CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::client_streaming_invoker(
            self.handle.clone(),
            self.channel_capacity,
            move |req| async move { kv.put_all(req).await },
        );
        invoke(options, observer)
    }

    fn delete(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.delete(req).await
        });
        invoke(options, request, observer)
    }

    fn get(
        &self,
        options: &CallOptions,
        request: Operand,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.get(req).await
        });
        invoke(options, request, observer)
    }

    fn iterate(
        &self,
        options: &CallOptions,
        request: Range,
        observer: BoxObserver<Operand>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::server_streaming_invoker(self.handle.clone(), move |req| async move {
            kv.iterate(req).await
        });
        invoke(options, request, observer)
    }

    fn destroy(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.destroy(req).await
        });
        invoke(options, request, observer)
    }

    fn destroy_all(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Empty>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.destroy_all(req).await
        });
        invoke(options, request, observer)
    }

    fn count(
        &self,
        options: &CallOptions,
        request: Empty,
        observer: BoxObserver<Count>,
    ) -> Result<(), CallError> {
        let mut kv = self.kv.clone();
        let invoke = grpc::unary_invoker(self.handle.clone(), move |req| async move {
            kv.count(req).await
        });
        invoke(options, request, observer)
    }
}
