//! Error types for the RelayKV client
use relay_bridge::CallError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid store descriptor: {0}")]
    InvalidStore(String),

    #[error(transparent)]
    Call(#[from] CallError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
