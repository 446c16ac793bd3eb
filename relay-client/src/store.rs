//! Store descriptors and their transport metadata form
//!
//! A `StoreInfo` names one logical store held by the remote cluster. It is
//! propagated to the server as ASCII gRPC metadata headers so every
//! operation carries the store it targets.

use crate::error::ClientError;
use relay_proto::StoreLocator;
use tonic::metadata::{MetadataMap, MetadataValue};

pub const STORE_TYPE_HEADER: &str = "store-type";
pub const STORE_NAMESPACE_HEADER: &str = "store-namespace";
pub const STORE_NAME_HEADER: &str = "store-name";
pub const STORE_FRAGMENT_HEADER: &str = "store-fragment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub store_type: String,
    pub namespace: String,
    pub name: String,
    pub fragment: i32,
}

impl StoreInfo {
    pub fn new(
        store_type: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store_type: store_type.into(),
            namespace: namespace.into(),
            name: name.into(),
            fragment: 0,
        }
    }

    pub fn with_fragment(mut self, fragment: i32) -> Self {
        self.fragment = fragment;
        self
    }

    /// Builds the transport headers for this store. Values must be valid
    /// ASCII metadata; anything else fails before a call is issued.
    pub fn to_metadata(&self) -> Result<MetadataMap, ClientError> {
        let mut metadata = MetadataMap::new();
        metadata.insert(STORE_TYPE_HEADER, ascii_value(&self.store_type)?);
        metadata.insert(STORE_NAMESPACE_HEADER, ascii_value(&self.namespace)?);
        metadata.insert(STORE_NAME_HEADER, ascii_value(&self.name)?);
        metadata.insert(STORE_FRAGMENT_HEADER, ascii_value(&self.fragment.to_string())?);
        Ok(metadata)
    }

    pub fn to_locator(&self) -> StoreLocator {
        StoreLocator {
            store_type: self.store_type.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            fragment: self.fragment,
        }
    }
}

fn ascii_value(value: &str) -> Result<MetadataValue<tonic::metadata::Ascii>, ClientError> {
    // Ascii metadata values admit any visible byte, so non-ASCII text has
    // to be rejected explicitly.
    if !value.is_ascii() {
        return Err(ClientError::InvalidStore(format!(
            "non-ascii header value: {}",
            value
        )));
    }
    MetadataValue::try_from(value)
        .map_err(|e| ClientError::InvalidStore(format!("{}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_store_info() {
        let store = StoreInfo::new("lmdb", "ns1", "table1").with_fragment(3);
        let metadata = store.to_metadata().unwrap();

        assert_eq!(metadata.get(STORE_TYPE_HEADER).unwrap(), "lmdb");
        assert_eq!(metadata.get(STORE_NAMESPACE_HEADER).unwrap(), "ns1");
        assert_eq!(metadata.get(STORE_NAME_HEADER).unwrap(), "table1");
        assert_eq!(metadata.get(STORE_FRAGMENT_HEADER).unwrap(), "3");
    }

    #[test]
    fn test_non_ascii_store_name_rejected() {
        let store = StoreInfo::new("lmdb", "ns1", "tåble");
        assert!(matches!(
            store.to_metadata(),
            Err(ClientError::InvalidStore(_))
        ));
    }

    #[test]
    fn test_locator_round_trip() {
        let store = StoreInfo::new("lmdb", "ns1", "table1").with_fragment(1);
        let locator = store.to_locator();
        assert_eq!(locator.namespace, "ns1");
        assert_eq!(locator.name, "table1");
        assert_eq!(locator.fragment, 1);
    }
}
