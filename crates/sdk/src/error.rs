//! SDK error types.

use silo_connection::ConnectionError;
use silo_node_rpc::RpcError;
use silo_transfer::TransferError;

/// Errors returned by [`Sdk`](crate::Sdk) operations.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A segment transfer failed. The source carries the segment index and
    /// the unmodified cause.
    #[error("transfer failed: {0}")]
    Transfer(#[source] TransferError),

    #[error("data integrity error: {0}")]
    DataIntegrity(#[source] TransferError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("node error: {0}")]
    Rpc(#[source] RpcError),

    #[error("cancelled")]
    Cancelled,

    #[error("sdk is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SdkError {
    /// Segment a transfer or integrity error refers to.
    pub fn segment_index(&self) -> Option<u64> {
        match self {
            SdkError::Transfer(e) | SdkError::DataIntegrity(e) => e.segment_index(),
            _ => None,
        }
    }
}

impl From<TransferError> for SdkError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Config(msg) => SdkError::Configuration(msg),
            TransferError::Cancelled => SdkError::Cancelled,
            TransferError::Io(io) => SdkError::Io(io),
            e if e.is_integrity() => SdkError::DataIntegrity(e),
            e => SdkError::Transfer(e),
        }
    }
}

impl From<RpcError> for SdkError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::NotFound(msg) => SdkError::NotFound(msg),
            RpcError::AlreadyExists(msg) => SdkError::AlreadyExists(msg),
            RpcError::InvalidArgument(msg) => SdkError::Validation(msg),
            e => SdkError::Rpc(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_are_classified() {
        let err: SdkError = TransferError::segment(2, RpcError::Timeout).into();
        assert!(matches!(err, SdkError::Transfer(_)));
        assert_eq!(err.segment_index(), Some(2));

        let err: SdkError = TransferError::LengthMismatch {
            index: 1,
            expected: 4,
            actual: 3,
        }
        .into();
        assert!(matches!(err, SdkError::DataIntegrity(_)));

        let err: SdkError = TransferError::Cancelled.into();
        assert!(matches!(err, SdkError::Cancelled));

        let err: SdkError = TransferError::Config("chunk".into()).into();
        assert!(matches!(err, SdkError::Configuration(_)));
    }

    #[test]
    fn rpc_errors_are_classified() {
        let err: SdkError = RpcError::NotFound("b/o".into()).into();
        assert!(matches!(err, SdkError::NotFound(_)));

        let err: SdkError = RpcError::AlreadyExists("b".into()).into();
        assert!(matches!(err, SdkError::AlreadyExists(_)));

        let err: SdkError = RpcError::Closed.into();
        assert!(matches!(err, SdkError::Rpc(RpcError::Closed)));
    }
}
