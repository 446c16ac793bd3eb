use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CallError {
    #[error("incomplete call context: missing {0}")]
    IncompleteContext(&'static str),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote call failed: {0}")]
    RemoteCallFailed(#[source] tonic::Status),

    #[error("expected at most one response message but received more")]
    UnexpectedMultipleResults,

    #[error("broker is closed")]
    BrokerClosed,
}

impl From<tonic::Status> for CallError {
    fn from(status: tonic::Status) -> Self {
        CallError::RemoteCallFailed(status)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
