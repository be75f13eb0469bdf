//! Error types for node RPC.

use silo_protocol::ErrorBody;
use silo_protocol::constants::{CODE_ALREADY_EXISTS, CODE_INVALID, CODE_NOT_FOUND};

/// Errors produced by a node RPC call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("call timed out")]
    Timeout,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("node error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("connection closed")]
    Closed,
}

impl RpcError {
    /// Maps an error reply from a node to a typed error.
    pub fn from_body(body: ErrorBody) -> Self {
        match body.code {
            CODE_NOT_FOUND => RpcError::NotFound(body.message),
            CODE_ALREADY_EXISTS => RpcError::AlreadyExists(body.message),
            CODE_INVALID => RpcError::InvalidArgument(body.message),
            code => RpcError::Remote {
                code,
                message: body.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_codes() {
        let err = RpcError::from_body(ErrorBody {
            code: 404,
            message: "no such object".into(),
        });
        assert!(matches!(err, RpcError::NotFound(ref m) if m == "no such object"));

        let err = RpcError::from_body(ErrorBody {
            code: 409,
            message: "bucket exists".into(),
        });
        assert!(matches!(err, RpcError::AlreadyExists(_)));

        let err = RpcError::from_body(ErrorBody {
            code: 500,
            message: "disk full".into(),
        });
        assert!(matches!(err, RpcError::Remote { code: 500, .. }));
    }
}
