//! RelayKV protocol definitions
//!
//! Message types and gRPC client stubs for the `relaykv.KvService` remote
//! store interface. The Rust sources are vendored from the protobuf
//! definition in `proto/kv.proto` so downstream builds do not require
//! `protoc`.

pub mod kv;

pub use kv::kv_service_client::KvServiceClient;
pub use kv::{Count, CreateTableInfo, Empty, Operand, Range, StoreLocator};
