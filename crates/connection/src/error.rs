//! Error types for connection providers.

/// Errors produced while acquiring a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },

    #[error("connection provider is closed")]
    Closed,

    #[error("invalid pool capacity: {0}")]
    InvalidCapacity(usize),
}

impl ConnectionError {
    /// Wraps a connector failure for `addr`.
    pub fn connect(
        addr: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Connect {
            addr: addr.into(),
            source: source.into(),
        }
    }
}
