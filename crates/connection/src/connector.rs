//! Traits for opening connections to storage nodes.

use futures_util::future::BoxFuture;

use crate::ConnectionError;

/// An open connection to a storage node.
///
/// Closing is dropping: implementations release their socket in `Drop`.
pub trait Connection: Send + 'static {
    /// Returns `true` if the connection must not be reused.
    ///
    /// A connection whose last call was interrupted or failed at the
    /// transport level reports itself broken.
    fn is_broken(&self) -> bool;
}

/// Opens new connections. Implemented per transport.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    /// Opens a connection to `addr`.
    fn connect<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Self::Conn, ConnectionError>>;
}
