//! RelayKV client library
//!
//! Blocking client for a RelayKV store node. Each operation is a
//! single configured call driven through `relay_bridge`'s streaming call
//! template; responses arrive through sinks that resolve slots or feed
//! bounded brokers.
//!
//! # Example
//!
//! ```no_run
//! use relay_bridge::Endpoint;
//! use relay_client::{ClientConfig, KvStoreClient, StoreInfo};
//! use relay_proto::Operand;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KvStoreClient::connect(ClientConfig::new(Endpoint::new("127.0.0.1", 7070)))?;
//! let store = StoreInfo::new("lmdb", "demo", "users");
//!
//! client.put(
//!     Operand {
//!         key: b"alice".to_vec(),
//!         value: b"1".to_vec(),
//!     },
//!     &store,
//! )?;
//!
//! let found = client.get(
//!     Operand {
//!         key: b"alice".to_vec(),
//!         value: Vec::new(),
//!     },
//!     &store,
//! )?;
//! assert_eq!(found.value, b"1");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod store;
pub mod stub;

pub use client::KvStoreClient;
pub use config::{ClientConfig, DEFAULT_FINISH_TIMEOUT};
pub use error::{ClientError, Result};
pub use store::StoreInfo;
pub use stub::{GrpcKvStub, KvStub};
